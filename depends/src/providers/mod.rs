//! The concrete providers.

mod collections;
mod context_resource;
mod factory;
mod field;
mod object;
mod resource;
mod selector;
mod singleton;

pub use collections::{Dict, List};
pub use context_resource::ContextResource;
pub use factory::Factory;
pub use field::FieldAccess;
pub use object::Object;
pub use resource::{Initializer, InitializerBuilder, Resource};
pub use selector::Selector;
pub use singleton::Singleton;
