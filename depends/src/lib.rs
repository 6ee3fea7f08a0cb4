//! # Fibre Depends
//!
//! Lazy, memoizing dependency providers with scoped resource lifecycles, for
//! synchronous and asynchronous Rust alike.
//!
//! A provider produces a value on demand. Providers take other providers as
//! dependencies, so an application's object graph is a tree of providers
//! resolved from the leaves up, either blocking (`resolve_sync`) or
//! suspending (`resolve_async`).
//!
//! ## Core Concepts
//!
//! - **Factory**: builds a fresh value on every resolution.
//! - **Singleton**: builds once for the whole process; concurrent first
//!   resolutions from threads and tasks construct exactly once.
//! - **Resource**: a process-wide singleton with a release step.
//! - **ContextResource**: one instance per [`ContainerContext`], released
//!   in reverse construction order when the context exits.
//! - **ContainerContext**: an ambient, nestable scope. It follows the logical
//!   call chain, so two concurrent requests never see each other's instances.
//! - **Overrides**: any provider can be forced to return a fixed value, for
//!   tests and configuration.
//! - **Container**: a registry of providers, with a process-wide instance
//!   reachable through [`global()`] and the `provider!` / `resolve!` macros.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_depends::{ContainerContext, ContextResource, Initializer, Object, Provider, Singleton};
//! use std::sync::Arc;
//!
//! // Process-wide configuration and a shared client built from it.
//! let url = Arc::new(Object::new(String::from("postgres://localhost")));
//! let pool = Arc::new(Singleton::new((url,), |(url,)| Arc::new(format!("pool for {url}"))));
//!
//! // A per-request session that is released when the request ends.
//! let session = ContextResource::new(Initializer::new(
//!   (pool,),
//!   |(pool,)| Ok(format!("session on {pool}")),
//!   |_session| Ok(()),
//! ));
//!
//! let described = ContainerContext::new()
//!   .run(|| session.resolve_sync())
//!   .unwrap()
//!   .unwrap();
//! assert_eq!(described, "session on pool for postgres://localhost");
//!
//! // Outside of a context there is no session to hand out.
//! assert!(session.resolve_sync().is_err());
//! ```

mod container;
mod context;
mod core;
mod error;
mod global;
mod lock;
mod macros;
mod provider;
mod providers;
mod record;

pub use container::{Container, Lifecycle};
pub use context::{fetch_context_item, ContainerContext, ContextFuture, InContainerContext};
pub use crate::core::ProviderId;
pub use error::{BoxError, Error, Result};
pub use global::global;
pub use provider::{Dependencies, OverrideGuard, Provider, ProviderExt};
pub use providers::{
  ContextResource, Dict, Factory, FieldAccess, Initializer, InitializerBuilder, List, Object, Resource, Selector,
  Singleton,
};
