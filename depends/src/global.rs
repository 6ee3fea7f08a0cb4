//! The process-wide container.

use crate::container::Container;
use once_cell::sync::Lazy;

// Created on first access.
static GLOBAL_CONTAINER: Lazy<Container> = Lazy::new(Container::default);

/// Returns the process-wide container used by [`provider!`](crate::provider)
/// and [`resolve!`](crate::resolve).
///
/// # Examples
///
/// ```
/// use fibre_depends::{global, Object};
/// use std::sync::Arc;
///
/// global().add_with_name("banner", Arc::new(Object::new(String::from("Hello from global!"))));
/// assert!(global().contains::<String>(Some("banner")));
/// ```
pub fn global() -> &'static Container {
  &GLOBAL_CONTAINER
}
