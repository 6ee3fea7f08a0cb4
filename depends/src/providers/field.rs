use crate::container::Lifecycle;
use crate::error::Result;
use crate::provider::{OverrideSlot, Provider};
use futures_util::future::BoxFuture;
use std::sync::Arc;

/// Resolves another provider and projects a value out of its result.
///
/// Usually built with [`ProviderExt::field`](crate::ProviderExt::field).
///
/// # Examples
///
/// ```
/// use fibre_depends::{Object, Provider, ProviderExt};
/// use std::sync::Arc;
///
/// #[derive(Clone)]
/// struct Settings {
///   port: u16,
/// }
///
/// let settings = Arc::new(Object::new(Settings { port: 8080 }));
/// let port = settings.field(|s: &Settings| s.port);
///
/// assert_eq!(port.resolve_sync().unwrap(), 8080);
/// ```
pub struct FieldAccess<P: Provider + ?Sized, U> {
  provider: Arc<P>,
  accessor: Arc<dyn Fn(&P::Output) -> U + Send + Sync>,
  overridden: OverrideSlot<U>,
}

impl<P, U> FieldAccess<P, U>
where
  P: Provider + ?Sized,
  U: Clone + Send + Sync + 'static,
{
  pub fn new<F>(provider: Arc<P>, accessor: F) -> Self
  where
    F: Fn(&P::Output) -> U + Send + Sync + 'static,
  {
    Self {
      provider,
      accessor: Arc::new(accessor),
      overridden: OverrideSlot::new(),
    }
  }
}

impl<P, U> Provider for FieldAccess<P, U>
where
  P: Provider + ?Sized,
  U: Clone + Send + Sync + 'static,
{
  type Output = U;

  fn resolve_sync(&self) -> Result<U> {
    if let Some(value) = self.overridden.get() {
      return Ok(value);
    }
    let resolved = self.provider.resolve_sync()?;
    Ok((self.accessor)(&resolved))
  }

  fn resolve_async(&self) -> BoxFuture<'_, Result<U>> {
    Box::pin(async move {
      if let Some(value) = self.overridden.get() {
        return Ok(value);
      }
      let resolved = self.provider.resolve_async().await?;
      Ok((self.accessor)(&resolved))
    })
  }

  fn requires_async(&self) -> bool {
    !self.overridden.is_set() && self.provider.requires_async()
  }

  fn override_with(&self, value: U) {
    self.overridden.set(value);
  }

  fn reset_override(&self) {
    self.overridden.clear();
  }
}

impl<P, U> Lifecycle for FieldAccess<P, U>
where
  P: Provider + ?Sized,
  U: Clone + Send + Sync + 'static,
{
}
