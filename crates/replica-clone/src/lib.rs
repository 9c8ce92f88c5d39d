//! # Replica Clone
//!
//! Deep object-graph cloning over the `replica-heap` object model.
//!
//! ## Design
//!
//! - **Type models**: per-class field lists and classifications, built once
//!   and cached in a concurrent insert-once map
//! - **Backends**: a portable backend over reflective accessors and a fast
//!   backend over raw storage, selected once per cloner
//! - **Strategy**: strict priority list per object, identity map for shared
//!   references and cycles
//! - **Facades**: [`Cloner`] with a full policy, [`QuickCloner`] for plain data
//!
//! ```
//! use replica_clone::Cloner;
//! use replica_heap::{Allocator, ClassDef, ClassRegistry, FieldDef, Value};
//!
//! let registry = ClassRegistry::new();
//! let node = registry
//!     .define(ClassDef::new("Node").field(FieldDef::object("next")))
//!     .unwrap();
//! let alloc = Allocator::new(registry.clone());
//! let a = alloc.allocate(node).unwrap();
//! registry.set_field(&a, "next", Value::Ref(a.clone())).unwrap();
//!
//! let cloner = Cloner::with_registry(registry.clone());
//! let copy = cloner.clone_ref(&a).unwrap().unwrap();
//! assert!(!copy.ptr_eq(&a));
//! assert_eq!(registry.get_field(&copy, "next").unwrap(), Value::Ref(copy.clone()));
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod backend;
pub mod cloner;
pub mod config;
mod containers;
pub mod error;
pub mod identity;
pub mod implementor;
pub mod policy;
pub mod strategy;
pub mod type_model;

pub use backend::{
    BackendKind, CopyBackend, FastBackend, PortableBackend, fast_access_available, select_backend,
};
pub use cloner::{Cloner, QuickCloner};
pub use config::{BackendChoice, CloneConfig};
pub use error::{BoxError, CloneError, CloneResult};
pub use identity::IdentityMap;
pub use implementor::{
    CONTAINER_IMPLEMENTOR, CloneContext, CloneImplementor, ContainerImplementor,
    ImplementorFactory, register_implementor, resolve_implementor,
};
pub use policy::Policy;
pub use strategy::{CloneStrategy, StrategyMode};
pub use type_model::{
    Classification, FieldDescriptor, FlagDetector, ImmutabilityDetector, TypeModel,
    TypeModelCache,
};
