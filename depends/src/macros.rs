//! Lookups in the global container.

/// Fetches the provider registered for a type in the global container.
///
/// # Panics
///
/// Panics if no provider is registered for the type (and name). For a
/// non-panicking lookup, use `global().get(...)` directly.
///
/// # Examples
///
/// ```
/// use fibre_depends::{global, provider, Object, Provider};
/// use std::sync::Arc;
///
/// global().add_with_name("motd", Arc::new(Object::new(String::from("hello"))));
///
/// let motd = provider!(String, "motd");
/// assert_eq!(motd.resolve_sync().unwrap(), "hello");
/// ```
#[macro_export]
macro_rules! provider {
  ($type:ty) => {
    $crate::global().get::<$type>(None).unwrap_or_else(|| {
      panic!(
        "Failed to find a provider for: {}",
        std::any::type_name::<$type>()
      )
    })
  };

  ($type:ty, $name:expr) => {
    $crate::global()
      .get::<$type>(Some($name))
      .unwrap_or_else(|| {
        panic!(
          "Failed to find a provider with name '{}' for: {}",
          $name,
          std::any::type_name::<$type>()
        )
      })
  };
}

/// Resolves a type synchronously through the global container.
///
/// Expands to the `Result` of [`Provider::resolve_sync`](crate::Provider::resolve_sync)
/// on the registered provider.
///
/// # Panics
///
/// Panics if no provider is registered for the type (and name).
///
/// # Examples
///
/// ```
/// use fibre_depends::{global, resolve, Factory};
/// use std::sync::Arc;
///
/// global().add(Arc::new(Factory::new((), |()| 7u64)));
///
/// let value = resolve!(u64).unwrap();
/// assert_eq!(value, 7);
/// ```
#[macro_export]
macro_rules! resolve {
  ($type:ty) => {
    $crate::Provider::resolve_sync(&$crate::provider!($type))
  };

  ($type:ty, $name:expr) => {
    $crate::Provider::resolve_sync(&$crate::provider!($type, $name))
  };
}
