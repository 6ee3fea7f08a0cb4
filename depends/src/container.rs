//! The `Container` registry and the lifecycle hooks it drives.

use crate::core::InjectionKey;
use crate::error::{FirstFailure, Result};
use crate::provider::Provider;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Process-level lifecycle hooks of a provider.
///
/// Every provider implements this. Resources acquire in `init`; singletons
/// and resources drop their cached instance on teardown. The rest keep the
/// no-op defaults.
pub trait Lifecycle: Send + Sync {
  /// Eagerly constructs whatever the provider would otherwise build lazily.
  fn init(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(async { Ok(()) })
  }

  fn tear_down(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(async { Ok(()) })
  }

  fn tear_down_sync(&self) -> Result<()> {
    Ok(())
  }
}

struct Registration {
  // Holds an `Arc<dyn Provider<Output = T>>` for the key's type.
  provider: Box<dyn Any + Send + Sync>,
  lifecycle: Arc<dyn Lifecycle>,
  reset: Box<dyn Fn() + Send + Sync>,
}

/// A registry of providers, keyed by output type and an optional name.
///
/// The container does not construct anything itself. It hands out the
/// registered providers, and drives eager initialization and teardown of
/// every registered provider in registration order (teardown in reverse).
///
/// # Examples
///
/// ```
/// use fibre_depends::{Container, Object, Provider, Singleton};
/// use std::sync::Arc;
///
/// let container = Container::new();
/// let name = Arc::new(Object::new(String::from("fibre")));
/// container.add(name.clone());
/// container.add_with_name("greeting", Arc::new(Singleton::new((name,), |(n,)| format!("hello {n}"))));
///
/// let greeting = container.get::<String>(Some("greeting")).unwrap();
/// assert_eq!(greeting.resolve_sync().unwrap(), "hello fibre");
/// assert!(container.get::<u32>(None).is_none());
/// ```
#[derive(Default)]
pub struct Container {
  providers: DashMap<InjectionKey, Registration>,
  order: Mutex<Vec<InjectionKey>>,
}

impl Container {
  pub fn new() -> Self {
    Self::default()
  }

  fn add_internal<P>(&self, name: Option<&str>, provider: Arc<P>)
  where
    P: Provider + Lifecycle + 'static,
  {
    let key = InjectionKey::new::<P::Output>(name);
    let erased: Arc<dyn Provider<Output = P::Output>> = provider.clone();
    let registration = Registration {
      provider: Box::new(erased),
      lifecycle: provider.clone(),
      reset: Box::new(move || provider.reset_override()),
    };

    let mut order = self.order.lock();
    if self.providers.insert(key.clone(), registration).is_some() {
      tracing::debug!(key = ?key, "replacing registered provider");
      order.retain(|existing| existing != &key);
    }
    order.push(key);
  }

  /// Registers `provider` under its output type, replacing any earlier one.
  pub fn add<P>(&self, provider: Arc<P>)
  where
    P: Provider + Lifecycle + 'static,
  {
    self.add_internal(None, provider);
  }

  pub fn add_with_name<P>(&self, name: &str, provider: Arc<P>)
  where
    P: Provider + Lifecycle + 'static,
  {
    self.add_internal(Some(name), provider);
  }

  /// Looks up the provider registered for `T` under `name`.
  pub fn get<T>(&self, name: Option<&str>) -> Option<Arc<dyn Provider<Output = T>>>
  where
    T: Clone + Send + Sync + 'static,
  {
    let key = InjectionKey::new::<T>(name);
    let registration = self.providers.get(&key)?;
    registration
      .provider
      .downcast_ref::<Arc<dyn Provider<Output = T>>>()
      .cloned()
  }

  pub fn contains<T: 'static>(&self, name: Option<&str>) -> bool {
    self.providers.contains_key(&InjectionKey::new::<T>(name))
  }

  pub fn len(&self) -> usize {
    self.providers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.providers.is_empty()
  }

  fn lifecycles(&self) -> Vec<Arc<dyn Lifecycle>> {
    let order = self.order.lock();
    order
      .iter()
      .filter_map(|key| {
        self
          .providers
          .get(key)
          .map(|registration| registration.lifecycle.clone())
      })
      .collect()
  }

  /// Runs [`Lifecycle::init`] for every registered provider in registration
  /// order, which acquires each [`Resource`](crate::Resource) eagerly.
  /// Stops at the first failure.
  pub async fn init_resources(&self) -> Result<()> {
    let lifecycles = self.lifecycles();
    tracing::debug!(providers = lifecycles.len(), "initializing resources");
    for lifecycle in lifecycles {
      lifecycle.init().await?;
    }
    Ok(())
  }

  /// Tears down every registered provider in reverse registration order.
  ///
  /// Every provider is visited even if an earlier one fails; the first
  /// failure is returned.
  pub async fn tear_down(&self) -> Result<()> {
    let lifecycles = self.lifecycles();
    tracing::debug!(providers = lifecycles.len(), "tearing down container");
    let mut failures = FirstFailure::default();
    for lifecycle in lifecycles.iter().rev() {
      failures.absorb(lifecycle.tear_down().await);
    }
    failures.into_result()
  }

  pub fn tear_down_sync(&self) -> Result<()> {
    let lifecycles = self.lifecycles();
    tracing::debug!(providers = lifecycles.len(), "tearing down container");
    let mut failures = FirstFailure::default();
    for lifecycle in lifecycles.iter().rev() {
      failures.absorb(lifecycle.tear_down_sync());
    }
    failures.into_result()
  }

  /// Clears the override of every registered provider.
  pub fn reset_override(&self) {
    for registration in self.providers.iter() {
      (registration.reset)();
    }
  }
}
