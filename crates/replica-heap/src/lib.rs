//! # Replica Heap
//!
//! Managed object model cloned by the Replica engine.
//!
//! ## Design
//!
//! - **Classes**: append-only registry of class definitions, the
//!   type-introspection provider for the clone engine
//! - **Layouts**: primitive fields packed into a byte block, references in
//!   slots, one layout per class
//! - **Objects**: `Arc`-backed handles compared by identity, body behind a
//!   `parking_lot` lock so graphs can be shared across threads
//! - **Allocator**: bare instances without construction logic

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod allocator;
pub mod class;
pub mod error;
pub mod layout;
pub mod object;
pub mod value;

pub use allocator::{AllocStats, Allocator};
pub use class::{
    ArrayComponent, Builtins, ClassDef, ClassFlags, ClassId, ClassKind, ClassRegistry, FieldDef,
    FieldModifiers, FieldType, SelfCopyFn,
};
pub use error::{HeapError, HeapResult};
pub use layout::{Category, FieldAccessor, FieldHandle, FieldInfo, InstanceLayout};
pub use object::{
    Container, ContainerKind, HashKey, InstanceData, ObjRef, ObjectBody, ObjectHeader, PrimArray,
};
pub use value::{EnumConstant, Primitive, PrimitiveKind, Value};
