//! Scope records: the memoization and cleanup state of one provider in one scope.

use crate::error::{BoxError, Error, FirstFailure, Result};
use crate::lock::CreationLock;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;

/// A release step registered alongside a constructed instance.
pub(crate) enum CleanupAction {
  Sync(Box<dyn FnOnce() -> Result<(), BoxError> + Send + Sync>),
  Async(Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>),
}

impl CleanupAction {
  fn is_async(&self) -> bool {
    matches!(self, CleanupAction::Async(_))
  }
}

/// An instance together with its cleanup stack. Stored as one value so the
/// instance is never observable without its release actions.
struct Materialized<T> {
  instance: T,
  cleanup_stack: Vec<CleanupAction>,
}

impl<T> Materialized<T> {
  fn is_async(&self) -> bool {
    self.cleanup_stack.iter().any(CleanupAction::is_async)
  }
}

/// The outcome of one construction within one scope.
pub(crate) struct ScopeRecord<T> {
  label: &'static str,
  is_async: bool,
  slot: RwLock<Option<Materialized<T>>>,
  creation_lock: CreationLock,
}

impl<T: Clone + Send + Sync + 'static> ScopeRecord<T> {
  pub(crate) fn new(label: &'static str, is_async: bool) -> Self {
    Self {
      label,
      is_async,
      slot: RwLock::new(None),
      creation_lock: CreationLock::new(),
    }
  }

  /// Whether the owning scope permits asynchronous initializers.
  pub(crate) fn is_async(&self) -> bool {
    self.is_async
  }

  pub(crate) fn instance(&self) -> Option<T> {
    self.slot.read().as_ref().map(|m| m.instance.clone())
  }

  fn store(&self, instance: T, cleanup: Option<CleanupAction>) {
    let cleanup_stack = cleanup.into_iter().collect();
    *self.slot.write() = Some(Materialized {
      instance,
      cleanup_stack,
    });
    tracing::debug!(provider = self.label, "instance constructed");
  }

  /// Returns the memoized instance, constructing it first if needed.
  ///
  /// The flag is `true` when this call performed the construction. Fails with
  /// [`Error::SynchronousResolution`] instead of blocking while an
  /// asynchronous construction of the same record is in flight.
  pub(crate) fn materialize_sync<F>(&self, construct: F) -> Result<(T, bool)>
  where
    F: FnOnce() -> Result<(T, Option<CleanupAction>)>,
  {
    if let Some(instance) = self.instance() {
      return Ok((instance, false));
    }

    let Some(_guard) = self.creation_lock.lock_sync() else {
      tracing::debug!(provider = self.label, "async construction in flight, refusing to block");
      return Err(Error::SynchronousResolution {
        provider: self.label,
      });
    };
    if let Some(instance) = self.instance() {
      return Ok((instance, false));
    }

    let (instance, cleanup) = construct()?;
    self.store(instance.clone(), cleanup);
    Ok((instance, true))
  }

  /// Async counterpart of [`ScopeRecord::materialize_sync`].
  pub(crate) async fn materialize<F, Fut>(&self, construct: F) -> Result<(T, bool)>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(T, Option<CleanupAction>)>>,
  {
    if let Some(instance) = self.instance() {
      return Ok((instance, false));
    }

    let _guard = self.creation_lock.lock().await;
    if let Some(instance) = self.instance() {
      return Ok((instance, false));
    }

    let (instance, cleanup) = construct().await?;
    self.store(instance.clone(), cleanup);
    Ok((instance, true))
  }
}

/// Type-erased view of a `ScopeRecord`, as held by container contexts.
pub(crate) trait ErasedRecord: Send + Sync {
  fn label(&self) -> &'static str;

  /// Releases the instance without suspending. Fails with
  /// [`Error::AsyncInSyncContext`] and keeps the instance when any release
  /// step is asynchronous or an asynchronous construction is in flight.
  fn tear_down_sync(&self) -> Result<()>;

  fn tear_down(&self) -> BoxFuture<'_, Result<()>>;

  fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Clone + Send + Sync + 'static> ErasedRecord for ScopeRecord<T> {
  fn label(&self) -> &'static str {
    self.label
  }

  fn tear_down_sync(&self) -> Result<()> {
    let Some(_guard) = self.creation_lock.lock_sync() else {
      return Err(Error::AsyncInSyncContext {
        provider: self.label,
      });
    };
    let materialized = {
      let mut slot = self.slot.write();
      if slot.as_ref().is_some_and(Materialized::is_async) {
        return Err(Error::AsyncInSyncContext {
          provider: self.label,
        });
      }
      slot.take()
    };
    let Some(materialized) = materialized else {
      return Ok(());
    };

    let mut failures = FirstFailure::default();
    for action in materialized.cleanup_stack.into_iter().rev() {
      if let CleanupAction::Sync(release) = action {
        failures.absorb(release().map_err(|source| Error::Release {
          provider: self.label,
          source,
        }));
      }
    }
    tracing::debug!(provider = self.label, "instance released");
    failures.into_result()
  }

  fn tear_down(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
      let _guard = self.creation_lock.lock().await;
      let materialized = self.slot.write().take();
      let Some(materialized) = materialized else {
        return Ok(());
      };

      let mut failures = FirstFailure::default();
      for action in materialized.cleanup_stack.into_iter().rev() {
        let released = match action {
          CleanupAction::Sync(release) => release(),
          CleanupAction::Async(release) => release().await,
        };
        failures.absorb(released.map_err(|source| Error::Release {
          provider: self.label,
          source,
        }));
      }
      tracing::debug!(provider = self.label, "instance released");
      failures.into_result()
    })
  }

  fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
    self
  }
}
