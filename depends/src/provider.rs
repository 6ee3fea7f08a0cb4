//! The provider contract and the building blocks shared by every provider.

use crate::error::{BoxError, Error, Result};
use crate::providers::FieldAccess;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;

/// An object that produces a value on demand.
///
/// Every provider resolves synchronously or asynchronously and can have its
/// result substituted by an override. The trait is object safe, so
/// `Arc<dyn Provider<Output = T>>` is the common currency between providers.
pub trait Provider: Send + Sync {
  type Output: Clone + Send + Sync + 'static;

  /// Resolves without suspending.
  ///
  /// Fails with [`Error::SynchronousResolution`] if construction needs an
  /// asynchronous factory or initializer.
  fn resolve_sync(&self) -> Result<Self::Output>;

  /// Resolves, awaiting asynchronous dependencies and initializers as needed.
  fn resolve_async(&self) -> BoxFuture<'_, Result<Self::Output>>;

  /// Whether constructing the value may suspend: this provider, or any
  /// provider it depends on, has an asynchronous factory or initializer.
  ///
  /// An overridden provider never requires it. `resolve_sync` checks this
  /// before taking any lock and fails with [`Error::SynchronousResolution`].
  fn requires_async(&self) -> bool;

  /// Makes every later resolution return `value` until [`Provider::reset_override`].
  fn override_with(&self, value: Self::Output);

  /// Clears the override. Memoized state is untouched by overriding, so the
  /// next resolution behaves as if no override had ever been set.
  fn reset_override(&self);
}

impl<P: Provider + ?Sized> Provider for Arc<P> {
  type Output = P::Output;

  fn resolve_sync(&self) -> Result<Self::Output> {
    (**self).resolve_sync()
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<Self::Output>> {
    (**self).resolve_async()
  }

  fn requires_async(&self) -> bool {
    (**self).requires_async()
  }

  fn override_with(&self, value: Self::Output) {
    (**self).override_with(value)
  }

  fn reset_override(&self) {
    (**self).reset_override()
  }
}

/// Conveniences available on every provider.
pub trait ProviderExt: Provider {
  /// Overrides the provider until the returned guard is dropped.
  fn override_scoped(&self, value: Self::Output) -> OverrideGuard<'_, Self> {
    self.override_with(value);
    OverrideGuard { provider: self }
  }

  /// Defers reading a field of the resolved value until resolution time.
  fn field<U, F>(self: Arc<Self>, accessor: F) -> FieldAccess<Self, U>
  where
    U: Clone + Send + Sync + 'static,
    F: Fn(&Self::Output) -> U + Send + Sync + 'static,
  {
    FieldAccess::new(self, accessor)
  }
}

impl<P: Provider + ?Sized> ProviderExt for P {}

/// Resets a provider's override when dropped.
#[must_use = "the override is reset as soon as the guard is dropped"]
pub struct OverrideGuard<'a, P: Provider + ?Sized> {
  provider: &'a P,
}

impl<P: Provider + ?Sized> Drop for OverrideGuard<'_, P> {
  fn drop(&mut self) {
    self.provider.reset_override();
  }
}

/// Storage for an override value.
pub(crate) struct OverrideSlot<T> {
  value: RwLock<Option<T>>,
}

impl<T: Clone> OverrideSlot<T> {
  pub(crate) fn new() -> Self {
    Self {
      value: RwLock::new(None),
    }
  }

  pub(crate) fn get(&self) -> Option<T> {
    self.value.read().clone()
  }

  pub(crate) fn is_set(&self) -> bool {
    self.value.read().is_some()
  }

  pub(crate) fn set(&self, value: T) {
    *self.value.write() = Some(value);
  }

  pub(crate) fn clear(&self) {
    *self.value.write() = None;
  }
}

/// The provider arguments of a factory or initializer.
///
/// Implemented for `()` and for tuples of providers. Each member is resolved
/// exactly once per construction, left to right, in the caller's mode.
pub trait Dependencies: Send + Sync + 'static {
  type Output: Send + 'static;

  fn resolve_sync(&self) -> Result<Self::Output>;

  fn resolve_async(&self) -> BoxFuture<'_, Result<Self::Output>>;

  /// Whether any member requires asynchronous resolution.
  fn requires_async(&self) -> bool;
}

impl Dependencies for () {
  type Output = ();

  fn resolve_sync(&self) -> Result<()> {
    Ok(())
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<()>> {
    Box::pin(async { Ok(()) })
  }

  fn requires_async(&self) -> bool {
    false
  }
}

macro_rules! impl_dependencies {
  ($($ty:ident $var:ident),+) => {
    impl<$($ty: Provider + 'static),+> Dependencies for ($($ty,)+) {
      type Output = ($($ty::Output,)+);

      fn resolve_sync(&self) -> Result<Self::Output> {
        let ($($var,)+) = self;
        Ok(($($var.resolve_sync()?,)+))
      }

      fn resolve_async(&self) -> BoxFuture<'_, Result<Self::Output>> {
        Box::pin(async move {
          let ($($var,)+) = self;
          Ok(($($var.resolve_async().await?,)+))
        })
      }

      fn requires_async(&self) -> bool {
        let ($($var,)+) = self;
        false $(|| $var.requires_async())+
      }
    }
  };
}

impl_dependencies!(A a);
impl_dependencies!(A a, B b);
impl_dependencies!(A a, B b, C c);
impl_dependencies!(A a, B b, C c, D d);
impl_dependencies!(A a, B b, C c, D d, E e);
impl_dependencies!(A a, B b, C c, D d, E e, F f);
impl_dependencies!(A a, B b, C c, D d, E e, F f, G g);
impl_dependencies!(A a, B b, C c, D d, E e, F f, G g, H h);

/// A factory function, either synchronous or asynchronous.
pub(crate) enum Creator<A, T> {
  Sync(Arc<dyn Fn(A) -> Result<T, BoxError> + Send + Sync>),
  Async(Arc<dyn Fn(A) -> BoxFuture<'static, Result<T, BoxError>> + Send + Sync>),
}

impl<A, T> Clone for Creator<A, T> {
  fn clone(&self) -> Self {
    match self {
      Creator::Sync(f) => Creator::Sync(f.clone()),
      Creator::Async(f) => Creator::Async(f.clone()),
    }
  }
}

impl<A: 'static, T: 'static> Creator<A, T> {
  pub(crate) fn from_fn<F>(f: F) -> Self
  where
    F: Fn(A) -> T + Send + Sync + 'static,
  {
    Creator::Sync(Arc::new(move |args: A| -> Result<T, BoxError> { Ok(f(args)) }))
  }

  pub(crate) fn from_try_fn<F>(f: F) -> Self
  where
    F: Fn(A) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    Creator::Sync(Arc::new(f))
  }

  pub(crate) fn from_async_fn<F, Fut>(f: F) -> Self
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
  {
    Creator::Async(Arc::new(move |args: A| -> BoxFuture<'static, Result<T, BoxError>> {
      let fut = f(args);
      Box::pin(async move { Ok(fut.await) })
    }))
  }

  pub(crate) fn from_try_async_fn<F, Fut>(f: F) -> Self
  where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
  {
    Creator::Async(Arc::new(
      move |args: A| -> BoxFuture<'static, Result<T, BoxError>> { Box::pin(f(args)) },
    ))
  }

  pub(crate) fn is_async(&self) -> bool {
    matches!(self, Creator::Async(_))
  }

  pub(crate) fn create_sync(&self, args: A, provider: &'static str) -> Result<T> {
    match self {
      Creator::Sync(f) => f(args).map_err(|source| Error::Construction { provider, source }),
      Creator::Async(_) => Err(Error::SynchronousResolution { provider }),
    }
  }

  pub(crate) async fn create(&self, args: A, provider: &'static str) -> Result<T> {
    let created = match self {
      Creator::Sync(f) => f(args),
      Creator::Async(f) => f(args).await,
    };
    created.map_err(|source| Error::Construction { provider, source })
  }
}
