use crate::container::Lifecycle;
use crate::core::label_of;
use crate::error::{BoxError, Error, Result};
use crate::provider::{Creator, Dependencies, OverrideSlot, Provider};
use crate::record::{ErasedRecord, ScopeRecord};
use futures_util::future::BoxFuture;
use std::future::Future;

/// Constructs its value once and keeps it for the life of the process, or
/// until [`Singleton::tear_down`].
///
/// Concurrent first resolutions, from threads or tasks, run the factory
/// exactly once and all observe the same instance.
///
/// # Examples
///
/// ```
/// use fibre_depends::{Object, Provider, Singleton};
/// use std::sync::Arc;
///
/// let x = Arc::new(Object::new(1));
/// let y = Arc::new(Object::new(2));
/// let sum = Singleton::new((x, y), |(x, y)| x + y);
///
/// assert_eq!(sum.resolve_sync().unwrap(), 3);
/// ```
pub struct Singleton<D: Dependencies, T> {
  dependencies: D,
  creator: Creator<D::Output, T>,
  record: ScopeRecord<T>,
  overridden: OverrideSlot<T>,
}

impl<D, T> Singleton<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  fn with_creator(dependencies: D, creator: Creator<D::Output, T>) -> Self {
    Self {
      dependencies,
      creator,
      record: ScopeRecord::new(label_of::<T>(), true),
      overridden: OverrideSlot::new(),
    }
  }

  pub fn new<F>(dependencies: D, factory: F) -> Self
  where
    F: Fn(D::Output) -> T + Send + Sync + 'static,
  {
    Self::with_creator(dependencies, Creator::from_fn(factory))
  }

  pub fn try_new<F>(dependencies: D, factory: F) -> Self
  where
    F: Fn(D::Output) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    Self::with_creator(dependencies, Creator::from_try_fn(factory))
  }

  /// A singleton over an async function. It can only be resolved asynchronously.
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

  /// The cached instance, if one has been constructed.
  pub fn instance(&self) -> Option<T> {
    self.record.instance()
  }

  /// Drops the cached instance so the next resolution constructs a new one.
  pub async fn tear_down(&self) -> Result<()> {
    self.record.tear_down().await
  }

  pub fn tear_down_sync(&self) -> Result<()> {
    self.record.tear_down_sync()
  }
}

impl<D, T> Provider for Singleton<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  type Output = T;

  fn resolve_sync(&self) -> Result<T> {
    if let Some(value) = self.overridden.get() {
      return Ok(value);
    }
    let label = label_of::<T>();
    if self.creator.is_async() {
      return Err(Error::SynchronousResolution { provider: label });
    }
    if let Some(instance) = self.record.instance() {
      return Ok(instance);
    }
    if self.dependencies.requires_async() {
      return Err(Error::SynchronousResolution { provider: label });
    }
    let (instance, _) = self.record.materialize_sync(|| {
      let args = self.dependencies.resolve_sync()?;
      Ok((self.creator.create_sync(args, label)?, None))
    })?;
    Ok(instance)
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<T>> {
    Box::pin(async move {
      if let Some(value) = self.overridden.get() {
        return Ok(value);
      }
      let label = label_of::<T>();
      let (instance, _) = self
        .record
        .materialize(|| async move {
          let args = self.dependencies.resolve_async().await?;
          Ok((self.creator.create(args, label).await?, None))
        })
        .await?;
      Ok(instance)
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

impl<D, T> Lifecycle for Singleton<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  fn tear_down(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(Singleton::tear_down(self))
  }

  fn tear_down_sync(&self) -> Result<()> {
    Singleton::tear_down_sync(self)
  }
}
