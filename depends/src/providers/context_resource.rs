use super::resource::Initializer;
use crate::container::Lifecycle;
use crate::context::{current_scope, ScopeState};
use crate::core::{label_of, ProviderId};
use crate::error::{Error, Result};
use crate::provider::{Dependencies, OverrideSlot, Provider};
use crate::record::ScopeRecord;
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// A resource bound to the innermost active [`ContainerContext`](crate::ContainerContext).
///
/// Each context gets its own instance, acquired on first resolution inside
/// that context and released when the context exits. Resolving with no
/// active context fails with [`Error::ScopeNotSet`].
///
/// An asynchronous initializer needs an asynchronous context; resolving it
/// inside a context entered with `enter` fails with
/// [`Error::AsyncInSyncContext`]. A resolution whose context exits before
/// acquisition completes releases the instance again and fails with
/// [`Error::ScopeNotActive`].
pub struct ContextResource<D: Dependencies, T> {
  id: ProviderId,
  initializer: Initializer<D, T>,
  overridden: OverrideSlot<T>,
}

impl<D, T> ContextResource<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
  pub fn new(initializer: Initializer<D, T>) -> Self {
    Self {
      id: ProviderId::next(),
      initializer,
      overridden: OverrideSlot::new(),
    }
  }

  pub fn id(&self) -> ProviderId {
    self.id
  }

  pub fn is_async(&self) -> bool {
    self.initializer.is_async()
  }

  fn locate(&self) -> Result<(Arc<ScopeState>, Arc<ScopeRecord<T>>)> {
    let scope = current_scope()?;
    let record = scope.record_for::<T>(self.id, label_of::<T>())?;
    Ok((scope, record))
  }
}

impl<D, T> Provider for ContextResource<D, T>
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

    let (scope, record) = self.locate()?;
    if let Some(instance) = record.instance() {
      return Ok(instance);
    }
    if self.initializer.requires_async() {
      return Err(Error::SynchronousResolution { provider: label });
    }
    let (instance, created) = record.materialize_sync(|| self.initializer.acquire_sync(label))?;
    if created {
      scope.adopt_sync(record)?;
    }
    Ok(instance)
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<T>> {
    Box::pin(async move {
      if let Some(value) = self.overridden.get() {
        return Ok(value);
      }
      let label = label_of::<T>();

      let (scope, record) = self.locate()?;
      if let Some(instance) = record.instance() {
        return Ok(instance);
      }
      if self.initializer.is_async() && !record.is_async() {
        return Err(Error::AsyncInSyncContext { provider: label });
      }

      let (instance, created) = record
        .materialize(|| self.initializer.acquire(label))
        .await?;
      if created {
        scope.adopt(record).await?;
      }
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

impl<D, T> Lifecycle for ContextResource<D, T>
where
  D: Dependencies,
  T: Clone + Send + Sync + 'static,
{
}
