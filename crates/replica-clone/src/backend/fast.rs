//! Fast backend: raw offset/slot access into instance storage.

use super::{BackendKind, CopyBackend};
use crate::error::{CloneError, CloneResult};
use crate::type_model::{FieldDescriptor, TypeModel};
use replica_heap::{
    ClassId, ClassKind, Container, FieldHandle, HeapError, InstanceData, ObjRef, ObjectBody,
    Value,
};
use std::sync::OnceLock;

/// Environment switch that disables raw access even when compiled in
const FAST_ACCESS_ENV: &str = "REPLICA_FAST_ACCESS";

static FAST_ACCESS: OnceLock<bool> = OnceLock::new();

/// Is raw field access usable in this process. Probed once.
pub fn fast_access_available() -> bool {
    *FAST_ACCESS.get_or_init(|| {
        let compiled = cfg!(feature = "fast-access") && cfg!(target_endian = "little");
        let vetoed = std::env::var(FAST_ACCESS_ENV)
            .map(|v| {
                matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "0" | "false" | "off" | "no"
                )
            })
            .unwrap_or(false);
        if compiled && vetoed {
            tracing::debug!(env = FAST_ACCESS_ENV, "raw field access disabled by environment");
        }
        compiled && !vetoed
    })
}

/// Copies primitive bytes at their layout offsets and moves reference slots
/// directly, bypassing the reflective accessors.
#[derive(Debug, Clone, Copy)]
pub struct FastBackend {
    _probed: (),
}

impl FastBackend {
    /// The fast backend, if raw access is available
    pub fn detect() -> Option<Self> {
        fast_access_available().then_some(Self { _probed: () })
    }
}

fn not_instance(field: &FieldDescriptor, obj: &ObjRef) -> CloneError {
    CloneError::access(
        field.owner.as_ref(),
        field.name.as_ref(),
        obj.addr(),
        HeapError::WrongBody {
            class: field.owner.to_string(),
            expected: "instance",
        },
    )
}

fn out_of_bounds(field: &FieldDescriptor, obj: &ObjRef, index: usize, len: usize) -> CloneError {
    CloneError::access(
        field.owner.as_ref(),
        field.name.as_ref(),
        obj.addr(),
        HeapError::OutOfBounds { index, len },
    )
}

fn not_reference(field: &FieldDescriptor, obj: &ObjRef) -> CloneError {
    CloneError::access(
        field.owner.as_ref(),
        field.name.as_ref(),
        obj.addr(),
        HeapError::TypeMismatch {
            class: field.owner.to_string(),
            field: field.name.to_string(),
            expected: "reference".to_string(),
            found: "primitive",
        },
    )
}

fn element_error(obj: &ObjRef, index: usize, source: HeapError) -> CloneError {
    CloneError::access(format!("{:?}", obj.class()), index.to_string(), obj.addr(), source)
}

impl CopyBackend for FastBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fast
    }

    fn allocate(&self, model: &TypeModel) -> CloneResult<ObjRef> {
        let body = match model.kind() {
            ClassKind::Concrete => {
                ObjectBody::Instance(InstanceData::zeroed(model.prim_size(), model.ref_count()))
            }
            ClassKind::Container(kind) => ObjectBody::Container(Container::empty(kind)),
            ClassKind::Array(_) => ObjectBody::RefArray(Vec::new()),
            ClassKind::Abstract | ClassKind::Interface | ClassKind::Enum => {
                return Err(CloneError::Allocation {
                    class: model.name().to_string(),
                    source: HeapError::NotInstantiable {
                        class: model.name().to_string(),
                        reason: "no instances of this kind",
                    },
                });
            }
        };
        Ok(ObjRef::new(model.class(), body))
    }

    fn copy_primitive(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        field: &FieldDescriptor,
    ) -> CloneResult<()> {
        let FieldHandle::Prim { offset, kind } = field.handle else {
            return self.write_reference(target, field, self.read_field(source, field)?);
        };
        let range = offset as usize..offset as usize + kind.width();
        let mut buf = [0u8; 8];
        let width = kind.width();
        match &*source.body() {
            ObjectBody::Instance(data) => {
                let bytes = data
                    .prims
                    .get(range.clone())
                    .ok_or_else(|| out_of_bounds(field, source, range.start, data.prims.len()))?;
                buf[..width].copy_from_slice(bytes);
            }
            _ => return Err(not_instance(field, source)),
        }
        match &mut *target.body_mut() {
            ObjectBody::Instance(data) => {
                let len = data.prims.len();
                let slot = data
                    .prims
                    .get_mut(range.clone())
                    .ok_or_else(|| out_of_bounds(field, target, range.start, len))?;
                slot.copy_from_slice(&buf[..width]);
                Ok(())
            }
            _ => Err(not_instance(field, target)),
        }
    }

    fn copy_primitive_block(&self, source: &ObjRef, target: &ObjRef) -> CloneResult<bool> {
        if source.ptr_eq(target) {
            return Ok(true);
        }
        let prims = match &*source.body() {
            ObjectBody::Instance(data) => data.prims.clone(),
            _ => return Ok(false),
        };
        match &mut *target.body_mut() {
            ObjectBody::Instance(data) if data.prims.len() == prims.len() => {
                data.prims.copy_from_slice(&prims);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn read_field(&self, source: &ObjRef, field: &FieldDescriptor) -> CloneResult<Value> {
        let FieldHandle::Ref { slot } = field.handle else {
            return Err(not_reference(field, source));
        };
        match &*source.body() {
            ObjectBody::Instance(data) => data
                .refs
                .get(slot as usize)
                .cloned()
                .ok_or_else(|| out_of_bounds(field, source, slot as usize, data.refs.len())),
            _ => Err(not_instance(field, source)),
        }
    }

    fn write_reference(
        &self,
        target: &ObjRef,
        field: &FieldDescriptor,
        value: Value,
    ) -> CloneResult<()> {
        let FieldHandle::Ref { slot } = field.handle else {
            return Err(not_reference(field, target));
        };
        match &mut *target.body_mut() {
            ObjectBody::Instance(data) => {
                let len = data.refs.len();
                let dst = data
                    .refs
                    .get_mut(slot as usize)
                    .ok_or_else(|| out_of_bounds(field, target, slot as usize, len))?;
                *dst = value;
                Ok(())
            }
            _ => Err(not_instance(field, target)),
        }
    }

    fn reset_field(&self, target: &ObjRef, field: &FieldDescriptor) -> CloneResult<()> {
        match field.handle {
            FieldHandle::Prim { offset, kind } => {
                let range = offset as usize..offset as usize + kind.width();
                match &mut *target.body_mut() {
                    ObjectBody::Instance(data) => {
                        let len = data.prims.len();
                        data.prims
                            .get_mut(range.clone())
                            .ok_or_else(|| out_of_bounds(field, target, range.start, len))?
                            .fill(0);
                        Ok(())
                    }
                    _ => Err(not_instance(field, target)),
                }
            }
            FieldHandle::Ref { .. } => self.write_reference(target, field, Value::Null),
        }
    }

    fn duplicate_prim_array(&self, source: &ObjRef) -> CloneResult<ObjRef> {
        let array = match &*source.body() {
            ObjectBody::PrimArray(array) => array.clone(),
            _ => {
                return Err(element_error(
                    source,
                    0,
                    HeapError::WrongBody {
                        class: format!("{:?}", source.class()),
                        expected: "primitive array",
                    },
                ));
            }
        };
        Ok(ObjRef::new(source.class(), ObjectBody::PrimArray(array)))
    }

    fn allocate_ref_array(&self, class: ClassId, len: usize) -> CloneResult<ObjRef> {
        Ok(ObjRef::new(class, ObjectBody::RefArray(vec![Value::Null; len])))
    }

    fn write_element(&self, target: &ObjRef, index: usize, value: Value) -> CloneResult<()> {
        match &mut *target.body_mut() {
            ObjectBody::RefArray(items) => {
                let len = items.len();
                let slot = items
                    .get_mut(index)
                    .ok_or_else(|| element_error(target, index, HeapError::OutOfBounds { index, len }))?;
                *slot = value;
                Ok(())
            }
            _ => Err(element_error(
                target,
                index,
                HeapError::WrongBody {
                    class: format!("{:?}", target.class()),
                    expected: "reference array",
                },
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_model::TypeModelCache;
    use replica_heap::{ClassDef, ClassRegistry, FieldDef, PrimitiveKind};

    #[test]
    fn test_fast_copies_primitives_and_resets() {
        let registry = ClassRegistry::new();
        let sample = registry
            .define(
                ClassDef::new("Sample")
                    .field(FieldDef::primitive("flag", PrimitiveKind::Bool))
                    .field(FieldDef::primitive("count", PrimitiveKind::I32))
                    .field(FieldDef::object("label")),
            )
            .unwrap();
        let cache = TypeModelCache::new(registry.clone());
        let model = cache.get(sample).unwrap();
        let backend = FastBackend { _probed: () };

        let source = backend.allocate(&model).unwrap();
        registry.set_field(&source, "flag", Value::Bool(true)).unwrap();
        registry.set_field(&source, "count", Value::Int(42)).unwrap();
        registry.set_field(&source, "label", Value::string("hi")).unwrap();

        let target = backend.allocate(&model).unwrap();
        assert!(backend.copy_primitive_block(&source, &target).unwrap());
        for field in model.fields() {
            backend.copy_field(&source, &target, field, None).unwrap();
        }
        assert_eq!(registry.get_field(&target, "count").unwrap(), Value::Int(42));
        assert_eq!(registry.get_field(&target, "label").unwrap(), Value::string("hi"));

        let count = &model.fields()[1];
        backend.reset_field(&target, count).unwrap();
        assert_eq!(registry.get_field(&target, "count").unwrap(), Value::Int(0));
        assert_eq!(registry.get_field(&target, "flag").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_fast_refuses_abstract() {
        let registry = ClassRegistry::new();
        let shape = registry.define(ClassDef::abstract_class("Shape")).unwrap();
        let model = TypeModelCache::new(registry).get(shape).unwrap();
        let backend = FastBackend { _probed: () };
        assert!(matches!(
            backend.allocate(&model),
            Err(CloneError::Allocation { .. })
        ));
    }
}
