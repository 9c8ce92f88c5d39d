//! Portable backend: reflective field access through the registry.

use super::{BackendKind, CopyBackend};
use crate::error::{CloneError, CloneResult};
use crate::type_model::{FieldDescriptor, TypeModel};
use replica_heap::{AllocStats, Allocator, ClassId, ClassRegistry, HeapError, ObjRef, ObjectBody, Value};
use std::sync::Arc;

/// Every read and write goes through the field's [`FieldAccessor`], which
/// decodes and re-encodes typed primitives.
///
/// [`FieldAccessor`]: replica_heap::FieldAccessor
pub struct PortableBackend {
    allocator: Allocator,
}

impl PortableBackend {
    /// Backend allocating through `registry`
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            allocator: Allocator::new(registry),
        }
    }

    /// Allocation counters of this backend
    pub fn stats(&self) -> AllocStats {
        self.allocator.stats()
    }

    fn registry(&self) -> &ClassRegistry {
        self.allocator.registry()
    }
}

impl std::fmt::Debug for PortableBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortableBackend")
            .field("stats", &self.allocator.stats())
            .finish()
    }
}

fn field_error(field: &FieldDescriptor, obj: &ObjRef) -> impl FnOnce(HeapError) -> CloneError {
    let class = field.owner.clone();
    let name = field.name.clone();
    let addr = obj.addr();
    move |source| CloneError::access(class.as_ref(), name.as_ref(), addr, source)
}

impl CopyBackend for PortableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Portable
    }

    fn allocate(&self, model: &TypeModel) -> CloneResult<ObjRef> {
        self.allocator
            .allocate(model.class())
            .map_err(|source| CloneError::Allocation {
                class: model.name().to_string(),
                source,
            })
    }

    fn copy_primitive(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        field: &FieldDescriptor,
    ) -> CloneResult<()> {
        let value = field
            .accessor
            .get(source)
            .map_err(field_error(field, source))?;
        field
            .accessor
            .set(target, value)
            .map_err(field_error(field, target))
    }

    fn read_field(&self, source: &ObjRef, field: &FieldDescriptor) -> CloneResult<Value> {
        field
            .accessor
            .get(source)
            .map_err(field_error(field, source))
    }

    fn write_reference(
        &self,
        target: &ObjRef,
        field: &FieldDescriptor,
        value: Value,
    ) -> CloneResult<()> {
        field
            .accessor
            .set(target, value)
            .map_err(field_error(field, target))
    }

    fn reset_field(&self, target: &ObjRef, field: &FieldDescriptor) -> CloneResult<()> {
        field
            .accessor
            .reset(target)
            .map_err(field_error(field, target))
    }

    fn duplicate_prim_array(&self, source: &ObjRef) -> CloneResult<ObjRef> {
        let class = source.class();
        let bytes = match &*source.body() {
            ObjectBody::PrimArray(array) => array.bytes().to_vec(),
            _ => {
                return Err(CloneError::access(
                    self.registry().class_name(class),
                    "[]",
                    source.addr(),
                    HeapError::WrongBody {
                        class: self.registry().class_name(class),
                        expected: "primitive array",
                    },
                ));
            }
        };
        let len = source.array_len().unwrap_or_default();
        let copy = self
            .allocator
            .allocate_array(class, len)
            .map_err(|source| CloneError::Allocation {
                class: self.registry().class_name(class),
                source,
            })?;
        if let ObjectBody::PrimArray(array) = &mut *copy.body_mut() {
            array.bytes_mut().copy_from_slice(&bytes);
        }
        Ok(copy)
    }

    fn allocate_ref_array(&self, class: ClassId, len: usize) -> CloneResult<ObjRef> {
        self.allocator
            .allocate_array(class, len)
            .map_err(|source| CloneError::Allocation {
                class: self.registry().class_name(class),
                source,
            })
    }

    fn write_element(&self, target: &ObjRef, index: usize, value: Value) -> CloneResult<()> {
        target.array_set(index, value).map_err(|source| {
            CloneError::access(
                self.registry().class_name(target.class()),
                index.to_string(),
                target.addr(),
                source,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_model::TypeModelCache;
    use replica_heap::{ArrayComponent, ClassDef, FieldDef, PrimitiveKind};

    #[test]
    fn test_portable_round_trips_fields() {
        let registry = ClassRegistry::new();
        let pair = registry
            .define(
                ClassDef::new("Pair")
                    .field(FieldDef::primitive("left", PrimitiveKind::I16))
                    .field(FieldDef::primitive("ratio", PrimitiveKind::F64))
                    .field(FieldDef::object("tag")),
            )
            .unwrap();
        let model = TypeModelCache::new(registry.clone()).get(pair).unwrap();
        let backend = PortableBackend::new(registry.clone());

        let source = backend.allocate(&model).unwrap();
        registry.set_field(&source, "left", Value::Int(-7)).unwrap();
        registry.set_field(&source, "ratio", Value::Float(0.25)).unwrap();
        registry.set_field(&source, "tag", Value::string("t")).unwrap();

        let target = backend.allocate(&model).unwrap();
        assert!(!backend.copy_primitive_block(&source, &target).unwrap());
        for field in model.fields() {
            backend.copy_field(&source, &target, field, None).unwrap();
        }
        assert_eq!(registry.get_field(&target, "left").unwrap(), Value::Int(-7));
        assert_eq!(registry.get_field(&target, "ratio").unwrap(), Value::Float(0.25));
        assert_eq!(registry.get_field(&target, "tag").unwrap(), Value::string("t"));
        assert_eq!(backend.stats().instances, 2);
    }

    #[test]
    fn test_portable_duplicates_prim_arrays() {
        let registry = ClassRegistry::new();
        let alloc = Allocator::new(registry.clone());
        let source = alloc
            .new_array(
                ArrayComponent::Primitive(PrimitiveKind::I32),
                vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            )
            .unwrap();
        let backend = PortableBackend::new(registry);
        let copy = backend.duplicate_prim_array(&source).unwrap();
        assert!(!copy.ptr_eq(&source));
        assert_eq!(copy.array_get(2).unwrap(), Value::Int(3));
        source.array_set(2, Value::Int(9)).unwrap();
        assert_eq!(copy.array_get(2).unwrap(), Value::Int(3));
    }
}
