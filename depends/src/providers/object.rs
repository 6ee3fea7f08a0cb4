use crate::container::Lifecycle;
use crate::error::Result;
use crate::provider::{OverrideSlot, Provider};
use futures_util::future::BoxFuture;

/// Provides a value that already exists.
pub struct Object<T> {
  value: T,
  overridden: OverrideSlot<T>,
}

impl<T: Clone + Send + Sync + 'static> Object<T> {
  pub fn new(value: T) -> Self {
    Self {
      value,
      overridden: OverrideSlot::new(),
    }
  }

  fn current(&self) -> T {
    self.overridden.get().unwrap_or_else(|| self.value.clone())
  }
}

impl<T: Clone + Send + Sync + 'static> Provider for Object<T> {
  type Output = T;

  fn resolve_sync(&self) -> Result<T> {
    Ok(self.current())
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<T>> {
    Box::pin(async move { Ok(self.current()) })
  }

  fn requires_async(&self) -> bool {
    false
  }

  fn override_with(&self, value: T) {
    self.overridden.set(value);
  }

  fn reset_override(&self) {
    self.overridden.clear();
  }
}

impl<T: Clone + Send + Sync + 'static> Lifecycle for Object<T> {}
