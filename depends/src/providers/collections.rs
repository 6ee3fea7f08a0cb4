use crate::container::Lifecycle;
use crate::error::Result;
use crate::provider::{OverrideSlot, Provider};
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;

type Member<T> = Arc<dyn Provider<Output = T>>;

/// Resolves every member, in insertion order, into a `Vec`.
pub struct List<T> {
  members: Vec<Member<T>>,
  overridden: OverrideSlot<Vec<T>>,
}

impl<T: Clone + Send + Sync + 'static> List<T> {
  pub fn new() -> Self {
    Self {
      members: Vec::new(),
      overridden: OverrideSlot::new(),
    }
  }

  pub fn with<P>(mut self, provider: Arc<P>) -> Self
  where
    P: Provider<Output = T> + 'static,
  {
    self.members.push(provider);
    self
  }

  pub fn len(&self) -> usize {
    self.members.len()
  }

  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }
}

impl<T: Clone + Send + Sync + 'static> Default for List<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone + Send + Sync + 'static> Provider for List<T> {
  type Output = Vec<T>;

  fn resolve_sync(&self) -> Result<Vec<T>> {
    if let Some(values) = self.overridden.get() {
      return Ok(values);
    }
    self.members.iter().map(|member| member.resolve_sync()).collect()
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<Vec<T>>> {
    Box::pin(async move {
      if let Some(values) = self.overridden.get() {
        return Ok(values);
      }
      let mut values = Vec::with_capacity(self.members.len());
      for member in &self.members {
        values.push(member.resolve_async().await?);
      }
      Ok(values)
    })
  }

  fn requires_async(&self) -> bool {
    !self.overridden.is_set() && self.members.iter().any(|member| member.requires_async())
  }

  fn override_with(&self, values: Vec<T>) {
    self.overridden.set(values);
  }

  fn reset_override(&self) {
    self.overridden.clear();
  }
}

impl<T: Clone + Send + Sync + 'static> Lifecycle for List<T> {}

/// Resolves every member into a map keyed by the name it was added under.
pub struct Dict<T> {
  members: BTreeMap<String, Member<T>>,
  overridden: OverrideSlot<BTreeMap<String, T>>,
}

impl<T: Clone + Send + Sync + 'static> Dict<T> {
  pub fn new() -> Self {
    Self {
      members: BTreeMap::new(),
      overridden: OverrideSlot::new(),
    }
  }

  pub fn with<P>(mut self, key: impl Into<String>, provider: Arc<P>) -> Self
  where
    P: Provider<Output = T> + 'static,
  {
    self.members.insert(key.into(), provider);
    self
  }

  pub fn len(&self) -> usize {
    self.members.len()
  }

  pub fn is_empty(&self) -> bool {
    self.members.is_empty()
  }
}

impl<T: Clone + Send + Sync + 'static> Default for Dict<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Clone + Send + Sync + 'static> Provider for Dict<T> {
  type Output = BTreeMap<String, T>;

  fn resolve_sync(&self) -> Result<BTreeMap<String, T>> {
    if let Some(values) = self.overridden.get() {
      return Ok(values);
    }
    self
      .members
      .iter()
      .map(|(key, member)| Ok((key.clone(), member.resolve_sync()?)))
      .collect()
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<BTreeMap<String, T>>> {
    Box::pin(async move {
      if let Some(values) = self.overridden.get() {
        return Ok(values);
      }
      let mut values = BTreeMap::new();
      for (key, member) in &self.members {
        values.insert(key.clone(), member.resolve_async().await?);
      }
      Ok(values)
    })
  }

  fn requires_async(&self) -> bool {
    !self.overridden.is_set() && self.members.values().any(|member| member.requires_async())
  }

  fn override_with(&self, values: BTreeMap<String, T>) {
    self.overridden.set(values);
  }

  fn reset_override(&self) {
    self.overridden.clear();
  }
}

impl<T: Clone + Send + Sync + 'static> Lifecycle for Dict<T> {}
