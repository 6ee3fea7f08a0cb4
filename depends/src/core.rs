//! Core, non-public identity types shared by providers, contexts and the container.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one provider instance.
///
/// Container contexts key their scope records by this identity, so two
/// providers over the same output type never share a record.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderId(u64);

impl ProviderId {
  pub(crate) fn next() -> Self {
    Self(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Debug for ProviderId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ProviderId({})", self.0)
  }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct InjectionKey {
  pub(crate) type_id: TypeId,
  pub(crate) type_name: &'static str,
  pub(crate) name: Option<String>,
}

impl InjectionKey {
  pub(crate) fn new<T: ?Sized + Any>(name: Option<&str>) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      name: name.map(str::to_owned),
    }
  }
}

impl fmt::Debug for InjectionKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "Key({}, Name({}))", self.type_name, name),
      None => write!(f, "Key({})", self.type_name),
    }
  }
}

/// Human-readable label used in errors and logs.
pub(crate) fn label_of<T: ?Sized>() -> &'static str {
  std::any::type_name::<T>()
}
