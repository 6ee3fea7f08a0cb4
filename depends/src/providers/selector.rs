use crate::container::Lifecycle;
use crate::error::{Error, Result};
use crate::provider::{OverrideSlot, Provider};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

type Alternative<T> = Arc<dyn Provider<Output = T>>;

/// Delegates to one of several providers, picked by a key computed at
/// resolution time.
///
/// # Examples
///
/// ```
/// use fibre_depends::{Object, Provider, Selector};
/// use std::sync::Arc;
///
/// let storage = Selector::new(|| String::from("memory"))
///   .with("memory", Arc::new(Object::new("in-memory store")))
///   .with("disk", Arc::new(Object::new("on-disk store")));
///
/// assert_eq!(storage.resolve_sync().unwrap(), "in-memory store");
/// ```
pub struct Selector<T> {
  selector: Arc<dyn Fn() -> String + Send + Sync>,
  alternatives: HashMap<String, Alternative<T>>,
  overridden: OverrideSlot<T>,
}

impl<T: Clone + Send + Sync + 'static> Selector<T> {
  pub fn new<F>(selector: F) -> Self
  where
    F: Fn() -> String + Send + Sync + 'static,
  {
    Self {
      selector: Arc::new(selector),
      alternatives: HashMap::new(),
      overridden: OverrideSlot::new(),
    }
  }

  /// Adds an alternative, replacing any earlier one under the same key.
  pub fn with<P>(mut self, key: impl Into<String>, provider: Arc<P>) -> Self
  where
    P: Provider<Output = T> + 'static,
  {
    self.alternatives.insert(key.into(), provider);
    self
  }

  fn select(&self) -> Result<&Alternative<T>> {
    let key = (self.selector)();
    self.alternatives.get(&key).ok_or_else(|| Error::NoMatch(key.clone()))
  }
}

impl<T: Clone + Send + Sync + 'static> Provider for Selector<T> {
  type Output = T;

  fn resolve_sync(&self) -> Result<T> {
    if let Some(value) = self.overridden.get() {
      return Ok(value);
    }
    self.select()?.resolve_sync()
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<T>> {
    Box::pin(async move {
      if let Some(value) = self.overridden.get() {
        return Ok(value);
      }
      self.select()?.resolve_async().await
    })
  }

  fn requires_async(&self) -> bool {
    // An unmatched key fails the same way in either mode.
    !self.overridden.is_set() && self.select().is_ok_and(|alternative| alternative.requires_async())
  }

  fn override_with(&self, value: T) {
    self.overridden.set(value);
  }

  fn reset_override(&self) {
    self.overridden.clear();
  }
}

impl<T: Clone + Send + Sync + 'static> Lifecycle for Selector<T> {}
