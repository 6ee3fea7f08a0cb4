use crate::container::Lifecycle;
use crate::core::label_of;
use crate::error::{BoxError, Error, Result};
use crate::provider::{Creator, Dependencies, OverrideSlot, Provider};
use futures_util::future::BoxFuture;
use std::future::Future;

/// Builds a fresh value on every resolution.
///
/// # Examples
///
/// ```
/// use fibre_depends::{Factory, Object, Provider};
/// use std::sync::Arc;
///
/// let greeting = Arc::new(Object::new(String::from("hello")));
/// let shout = Factory::new((greeting,), |(g,)| g.to_uppercase());
///
/// assert_eq!(shout.resolve_sync().unwrap(), "HELLO");
/// ```
pub struct Factory<D: Dependencies, T> {
  dependencies: D,
  creator: Creator<D::Output, T>,
  overridden: OverrideSlot<T>,
}

impl<D, T> Factory<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  fn with_creator(dependencies: D, creator: Creator<D::Output, T>) -> Self {
    Self {
      dependencies,
      creator,
      overridden: OverrideSlot::new(),
    }
  }

  pub fn new<F>(dependencies: D, factory: F) -> Self
  where
    F: Fn(D::Output) -> T + Send + Sync + 'static,
  {
    Self::with_creator(dependencies, Creator::from_fn(factory))
  }

  /// Like [`Factory::new`], for factories that can fail.
  pub fn try_new<F>(dependencies: D, factory: F) -> Self
  where
    F: Fn(D::Output) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    Self::with_creator(dependencies, Creator::from_try_fn(factory))
  }

  /// A factory over an async function. It can only be resolved asynchronously.
  pub fn new_async<F, Fut>(dependencies: D, factory: F) -> Self
  where
    F: Fn(D::Output) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
  {
    Self::with_creator(dependencies, Creator::from_async_fn(factory))
  }

  pub fn try_new_async<F, Fut>(dependencies: D, factory: F) -> Self
  where
    F: Fn(D::Output) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
  {
    Self::with_creator(dependencies, Creator::from_try_async_fn(factory))
  }

  pub fn is_async(&self) -> bool {
    self.creator.is_async()
  }
}

impl<D, T> Provider for Factory<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  type Output = T;

  fn resolve_sync(&self) -> Result<T> {
    if let Some(value) = self.overridden.get() {
      return Ok(value);
    }
    if self.requires_async() {
      return Err(Error::SynchronousResolution {
        provider: label_of::<T>(),
      });
    }
    let args = self.dependencies.resolve_sync()?;
    self.creator.create_sync(args, label_of::<T>())
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<T>> {
    Box::pin(async move {
      if let Some(value) = self.overridden.get() {
        return Ok(value);
      }
      let args = self.dependencies.resolve_async().await?;
      self.creator.create(args, label_of::<T>()).await
    })
  }

  fn requires_async(&self) -> bool {
    !self.overridden.is_set() && (self.creator.is_async() || self.dependencies.requires_async())
  }

  fn override_with(&self, value: T) {
    self.overridden.set(value);
  }

  fn reset_override(&self) {
    self.overridden.clear();
  }
}

impl<D, T> Lifecycle for Factory<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
}
