//! Low-level copy backends.
//!
//! A backend allocates bare instances and moves field values between a
//! source object and its freshly allocated clone. Two implementations share
//! the [`CopyBackend`] contract and are observably identical:
//!
//! - [`PortableBackend`]: every access goes through the registry's reflective
//!   [`FieldAccessor`](replica_heap::FieldAccessor)s
//! - [`FastBackend`]: raw offset/slot access into instance storage, with the
//!   whole primitive block moved at once where policy allows
//!
//! One backend is selected when a cloner is built and used for the whole
//! graph.

mod fast;
mod portable;

pub use fast::{FastBackend, fast_access_available};
pub use portable::PortableBackend;

use crate::config::BackendChoice;
use crate::error::{CloneError, CloneResult};
use crate::type_model::{FieldDescriptor, TypeModel};
use replica_heap::{Category, ClassId, ClassRegistry, ObjRef, Value};
use std::sync::Arc;

/// Backend implementation tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Raw storage access
    Fast,
    /// Reflective accessor access
    Portable,
}

/// Field-level copy primitives used by the clone strategy
pub trait CopyBackend: Send + Sync {
    /// Which implementation this is
    fn kind(&self) -> BackendKind;

    /// Zero/default-valued instance of exactly `model`'s class, constructed
    /// without running any initialization logic
    fn allocate(&self, model: &TypeModel) -> CloneResult<ObjRef>;

    /// Copy a primitive field's bytes from `source` into `target`
    fn copy_primitive(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        field: &FieldDescriptor,
    ) -> CloneResult<()>;

    /// Copy the whole primitive block at once. Returns `false` when the
    /// backend has no bulk path and fields must be copied one by one.
    fn copy_primitive_block(&self, _source: &ObjRef, _target: &ObjRef) -> CloneResult<bool> {
        Ok(false)
    }

    /// Read a reference field
    fn read_field(&self, source: &ObjRef, field: &FieldDescriptor) -> CloneResult<Value>;

    /// Write a reference field
    fn write_reference(
        &self,
        target: &ObjRef,
        field: &FieldDescriptor,
        value: Value,
    ) -> CloneResult<()>;

    /// Write the field's default value
    fn reset_field(&self, target: &ObjRef, field: &FieldDescriptor) -> CloneResult<()>;

    /// Byte-for-byte duplicate of a primitive array
    fn duplicate_prim_array(&self, source: &ObjRef) -> CloneResult<ObjRef>;

    /// Null-filled reference array of `class`
    fn allocate_ref_array(&self, class: ClassId, len: usize) -> CloneResult<ObjRef>;

    /// Write element `index` of a reference array
    fn write_element(&self, target: &ObjRef, index: usize, value: Value) -> CloneResult<()>;

    /// Copy one field into `target`: primitives from `source`, references
    /// from `clone_of_value` (the already-cloned source value).
    fn copy_field(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        field: &FieldDescriptor,
        clone_of_value: Option<Value>,
    ) -> CloneResult<()> {
        match (field.category, clone_of_value) {
            (Category::Primitive, _) => self.copy_primitive(source, target, field),
            (_, Some(value)) => self.write_reference(target, field, value),
            (_, None) => {
                let value = self.read_field(source, field)?;
                self.write_reference(target, field, value)
            }
        }
    }
}

/// Pick a backend for `choice`.
///
/// `Auto` prefers the fast backend and falls back to the portable one,
/// logging the downgrade. `Fast` fails when raw access is unavailable.
pub fn select_backend(
    choice: BackendChoice,
    registry: &Arc<ClassRegistry>,
) -> CloneResult<Arc<dyn CopyBackend>> {
    match choice {
        BackendChoice::Fast => match FastBackend::detect() {
            Some(fast) => Ok(Arc::new(fast)),
            None => Err(CloneError::config(
                "fast backend requested but raw field access is unavailable",
            )),
        },
        BackendChoice::Portable => Ok(Arc::new(PortableBackend::new(registry.clone()))),
        BackendChoice::Auto => Ok(auto_backend(registry)),
    }
}

/// Fast backend when available, otherwise portable. The choice is logged.
pub fn auto_backend(registry: &Arc<ClassRegistry>) -> Arc<dyn CopyBackend> {
    match FastBackend::detect() {
        Some(fast) => {
            tracing::info!(backend = "fast", "selected copy backend");
            Arc::new(fast)
        }
        None => {
            tracing::info!(
                backend = "portable",
                "raw field access unavailable, selected portable copy backend"
            );
            Arc::new(PortableBackend::new(registry.clone()))
        }
    }
}
