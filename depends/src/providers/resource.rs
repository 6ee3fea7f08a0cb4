use crate::container::Lifecycle;
use crate::core::label_of;
use crate::error::{BoxError, Error, Result};
use crate::provider::{Creator, Dependencies, OverrideSlot, Provider};
use crate::record::{CleanupAction, ErasedRecord, ScopeRecord};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

enum Release<T> {
  Sync(Arc<dyn Fn(T) -> Result<(), BoxError> + Send + Sync>),
  Async(Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>),
}

impl<T: Send + Sync + 'static> Release<T> {
  fn from_fn<F>(f: F) -> Self
  where
    F: Fn(T) -> Result<(), BoxError> + Send + Sync + 'static,
  {
    Release::Sync(Arc::new(f))
  }

  fn from_async_fn<F, Fut>(f: F) -> Self
  where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
  {
    Release::Async(Arc::new(
      move |instance: T| -> BoxFuture<'static, Result<(), BoxError>> { Box::pin(f(instance)) },
    ))
  }

  fn is_async(&self) -> bool {
    matches!(self, Release::Async(_))
  }

  /// Binds the release step to a constructed instance.
  fn bind(&self, instance: T) -> CleanupAction {
    match self {
      Release::Sync(release) => {
        let release = release.clone();
        CleanupAction::Sync(Box::new(move || release(instance)))
      }
      Release::Async(release) => {
        let release = release.clone();
        CleanupAction::Async(Box::new(move || release(instance)))
      }
    }
  }
}

/// A paired acquire and release step.
///
/// Both steps are synchronous or both are asynchronous. The release step
/// receives the acquired instance exactly once, when the owning scope or
/// provider is torn down.
pub struct Initializer<D: Dependencies, T> {
  dependencies: D,
  acquire: Creator<D::Output, T>,
  release: Release<T>,
}

impl<D, T> Initializer<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  pub fn new<A, R>(dependencies: D, acquire: A, release: R) -> Self
  where
    A: Fn(D::Output) -> Result<T, BoxError> + Send + Sync + 'static,
    R: Fn(T) -> Result<(), BoxError> + Send + Sync + 'static,
  {
    Self {
      dependencies,
      acquire: Creator::from_try_fn(acquire),
      release: Release::from_fn(release),
    }
  }

  pub fn new_async<A, AFut, R, RFut>(dependencies: D, acquire: A, release: R) -> Self
  where
    A: Fn(D::Output) -> AFut + Send + Sync + 'static,
    AFut: Future<Output = Result<T, BoxError>> + Send + 'static,
    R: Fn(T) -> RFut + Send + Sync + 'static,
    RFut: Future<Output = Result<(), BoxError>> + Send + 'static,
  {
    Self {
      dependencies,
      acquire: Creator::from_try_async_fn(acquire),
      release: Release::from_async_fn(release),
    }
  }

  /// Starts an initializer whose steps are supplied one at a time.
  pub fn builder(dependencies: D) -> InitializerBuilder<D, T> {
    InitializerBuilder {
      dependencies,
      acquire: None,
      release: None,
    }
  }

  pub fn is_async(&self) -> bool {
    self.acquire.is_async()
  }

  /// Whether acquisition may suspend, counting the dependencies.
  pub(crate) fn requires_async(&self) -> bool {
    self.is_async() || self.dependencies.requires_async()
  }

  pub(crate) fn acquire_sync(&self, label: &'static str) -> Result<(T, Option<CleanupAction>)> {
    if self.requires_async() {
      return Err(Error::SynchronousResolution { provider: label });
    }
    let args = self.dependencies.resolve_sync()?;
    let instance = self.acquire.create_sync(args, label)?;
    let cleanup = self.release.bind(instance.clone());
    Ok((instance, Some(cleanup)))
  }

  pub(crate) async fn acquire(&self, label: &'static str) -> Result<(T, Option<CleanupAction>)> {
    let args = self.dependencies.resolve_async().await?;
    let instance = self.acquire.create(args, label).await?;
    let cleanup = self.release.bind(instance.clone());
    Ok((instance, Some(cleanup)))
  }
}

/// Assembles an [`Initializer`] step by step.
///
/// # Examples
///
/// ```
/// use fibre_depends::Initializer;
///
/// let init = Initializer::builder(())
///   .acquire(|()| Ok(vec![1u8, 2, 3]))
///   .release(|_buffer| Ok(()))
///   .build()
///   .unwrap();
/// assert!(!init.is_async());
///
/// // An acquire step without a release step is rejected.
/// let incomplete = Initializer::builder(()).acquire(|()| Ok(0u8)).build();
/// assert!(incomplete.is_err());
/// ```
pub struct InitializerBuilder<D: Dependencies, T> {
  dependencies: D,
  acquire: Option<Creator<D::Output, T>>,
  release: Option<Release<T>>,
}

impl<D, T> InitializerBuilder<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  pub fn acquire<F>(mut self, acquire: F) -> Self
  where
    F: Fn(D::Output) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    self.acquire = Some(Creator::from_try_fn(acquire));
    self
  }

  pub fn acquire_async<F, Fut>(mut self, acquire: F) -> Self
  where
    F: Fn(D::Output) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
  {
    self.acquire = Some(Creator::from_try_async_fn(acquire));
    self
  }

  pub fn release<F>(mut self, release: F) -> Self
  where
    F: Fn(T) -> Result<(), BoxError> + Send + Sync + 'static,
  {
    self.release = Some(Release::from_fn(release));
    self
  }

  pub fn release_async<F, Fut>(mut self, release: F) -> Self
  where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
  {
    self.release = Some(Release::from_async_fn(release));
    self
  }

  /// Fails with [`Error::InvalidInitializer`] if a step is missing or the
  /// two steps disagree on being asynchronous.
  pub fn build(self) -> Result<Initializer<D, T>> {
    let provider = label_of::<T>();
    let acquire = self.acquire.ok_or(Error::InvalidInitializer {
      provider,
      reason: "no acquire step was supplied",
    })?;
    let release = self.release.ok_or(Error::InvalidInitializer {
      provider,
      reason: "no release step was supplied",
    })?;
    if acquire.is_async() != release.is_async() {
      return Err(Error::InvalidInitializer {
        provider,
        reason: "acquire and release must both be synchronous or both asynchronous",
      });
    }
    Ok(Initializer {
      dependencies: self.dependencies,
      acquire,
      release,
    })
  }
}

/// A process-wide resource: acquired once, released on teardown.
///
/// Unlike a [`Singleton`](crate::Singleton), teardown runs the initializer's
/// release step. After teardown the next resolution acquires again.
pub struct Resource<D: Dependencies, T> {
  initializer: Initializer<D, T>,
  record: ScopeRecord<T>,
  overridden: OverrideSlot<T>,
}

impl<D, T> Resource<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  pub fn new(initializer: Initializer<D, T>) -> Self {
    Self {
      initializer,
      record: ScopeRecord::new(label_of::<T>(), true),
      overridden: OverrideSlot::new(),
    }
  }

  pub fn is_async(&self) -> bool {
    self.initializer.is_async()
  }

  /// The acquired instance, if there is one.
  pub fn instance(&self) -> Option<T> {
    self.record.instance()
  }

  pub async fn tear_down(&self) -> Result<()> {
    self.record.tear_down().await
  }

  /// Fails with [`Error::AsyncInSyncContext`] when the release step is
  /// asynchronous; the instance is kept in that case.
  pub fn tear_down_sync(&self) -> Result<()> {
    self.record.tear_down_sync()
  }
}

impl<D, T> Provider for Resource<D, T>
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
    if self.initializer.is_async() {
      return Err(Error::SynchronousResolution { provider: label });
    }
    if let Some(instance) = self.record.instance() {
      return Ok(instance);
    }
    if self.initializer.requires_async() {
      return Err(Error::SynchronousResolution { provider: label });
    }
    let (instance, _) = self
      .record
      .materialize_sync(|| self.initializer.acquire_sync(label))?;
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
        .materialize(|| self.initializer.acquire(label))
        .await?;
      Ok(instance)
    })
  }

  fn requires_async(&self) -> bool {
    !self.overridden.is_set() && self.initializer.requires_async()
  }

  fn override_with(&self, value: T) {
    self.overridden.set(value);
  }

  fn reset_override(&self) {
    self.overridden.clear();
  }
}

impl<D, T> Lifecycle for Resource<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  fn init(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move { self.resolve_async().await.map(drop) })
  }

  fn tear_down(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(Resource::tear_down(self))
  }

  fn tear_down_sync(&self) -> Result<()> {
    Resource::tear_down_sync(self)
  }
}
