//! Instance layouts and field access handles.
//!
//! Every concrete class gets one layout: primitive fields are packed into a
//! byte block at naturally aligned offsets, reference fields get a slot in the
//! reference block. A [`FieldHandle`] names one of those locations; a
//! [`FieldAccessor`] reads and writes it with type checking.

use crate::class::{ClassId, ClassKind, ClassRegistry, FieldModifiers, FieldType};
use crate::error::{HeapError, HeapResult};
use crate::object::{ObjRef, ObjectBody};
use crate::value::{Primitive, PrimitiveKind, Value};
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Location of a field inside an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldHandle {
    /// Byte offset into the primitive block
    Prim {
        /// Offset in bytes
        offset: u32,
        /// Stored kind
        kind: PrimitiveKind,
    },
    /// Index into the reference block
    Ref {
        /// Slot index
        slot: u32,
    },
}

/// Field category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Primitive, copied by value
    Primitive,
    /// Array reference
    Array,
    /// Object reference
    Object,
}

/// Reflective read/write access to one field
pub trait FieldAccessor: Send + Sync {
    /// Read the field, boxing primitives
    fn get(&self, obj: &ObjRef) -> HeapResult<Value>;

    /// Write the field, unboxing primitives
    fn set(&self, obj: &ObjRef, value: Value) -> HeapResult<()>;

    /// Write the field's default value
    fn reset(&self, obj: &ObjRef) -> HeapResult<()>;
}

/// Everything known about one instance field
#[derive(Clone)]
pub struct FieldInfo {
    declaring_class: ClassId,
    name: Arc<str>,
    field_type: FieldType,
    handle: FieldHandle,
    modifiers: FieldModifiers,
    accessor: Arc<dyn FieldAccessor>,
}

impl FieldInfo {
    /// Class that declares the field
    pub fn declaring_class(&self) -> ClassId {
        self.declaring_class
    }

    /// Field name
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Static type
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Category derived from the static type
    pub fn category(&self) -> Category {
        match self.field_type {
            FieldType::Primitive(_) => Category::Primitive,
            FieldType::Array(_) => Category::Array,
            FieldType::Object(_) => Category::Object,
        }
    }

    /// Storage location
    pub fn handle(&self) -> FieldHandle {
        self.handle
    }

    /// Modifiers
    pub fn modifiers(&self) -> FieldModifiers {
        self.modifiers
    }

    /// Reflective accessor
    pub fn accessor(&self) -> &Arc<dyn FieldAccessor> {
        &self.accessor
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldInfo")
            .field("declaring_class", &self.declaring_class)
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Layout of instances of one class
#[derive(Debug)]
pub struct InstanceLayout {
    class: ClassId,
    prim_size: usize,
    ref_count: usize,
    fields: Vec<FieldInfo>,
    by_name: FxHashMap<Arc<str>, usize>,
}

impl InstanceLayout {
    /// Compute the layout of `class`: ancestors' fields first, static fields skipped.
    pub fn build(registry: &ClassRegistry, class: ClassId) -> HeapResult<Self> {
        let def = registry.class(class)?;
        let mut layout = Self {
            class,
            prim_size: 0,
            ref_count: 0,
            fields: Vec::new(),
            by_name: FxHashMap::default(),
        };
        if matches!(def.kind(), ClassKind::Array(_) | ClassKind::Container(_)) {
            return Ok(layout);
        }

        let mut chain = registry.ancestors(class)?;
        chain.reverse();
        for declaring in chain {
            let declaring_def = registry.class(declaring)?;
            for field in declaring_def.declared_fields() {
                if field.modifiers().contains(FieldModifiers::STATIC) {
                    continue;
                }
                let handle = match field.ty() {
                    FieldType::Primitive(kind) => {
                        let width = kind.width();
                        let offset = layout.prim_size.next_multiple_of(width);
                        layout.prim_size = offset + width;
                        FieldHandle::Prim {
                            offset: offset as u32,
                            kind,
                        }
                    }
                    FieldType::Object(_) | FieldType::Array(_) => {
                        let slot = layout.ref_count;
                        layout.ref_count += 1;
                        FieldHandle::Ref { slot: slot as u32 }
                    }
                };
                let accessor: Arc<dyn FieldAccessor> = match handle {
                    FieldHandle::Prim { offset, kind } => Arc::new(PrimitiveAccessor {
                        class: declaring_def.name().clone(),
                        field: field.name().clone(),
                        offset: offset as usize,
                        kind,
                    }),
                    FieldHandle::Ref { slot } => Arc::new(ReferenceAccessor {
                        class: declaring_def.name().clone(),
                        field: field.name().clone(),
                        slot: slot as usize,
                        array: matches!(field.ty(), FieldType::Array(_)),
                    }),
                };
                // Subclass fields shadow same-named ancestor fields for lookup.
                layout
                    .by_name
                    .insert(field.name().clone(), layout.fields.len());
                layout.fields.push(FieldInfo {
                    declaring_class: declaring,
                    name: field.name().clone(),
                    field_type: field.ty(),
                    handle,
                    modifiers: field.modifiers(),
                    accessor,
                });
            }
        }
        Ok(layout)
    }

    /// Class described
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Primitive block size in bytes
    pub fn prim_size(&self) -> usize {
        self.prim_size
    }

    /// Reference slot count
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// Fields in layout order
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Field by name
    pub fn field(&self, name: &str) -> HeapResult<&FieldInfo> {
        self.by_name
            .get(name)
            .map(|index| &self.fields[*index])
            .ok_or_else(|| HeapError::no_such_field(format!("{:?}", self.class), name))
    }
}

struct PrimitiveAccessor {
    class: Arc<str>,
    field: Arc<str>,
    offset: usize,
    kind: PrimitiveKind,
}

impl PrimitiveAccessor {
    fn bounds(&self, len: usize) -> HeapResult<std::ops::Range<usize>> {
        let end = self.offset + self.kind.width();
        if end > len {
            return Err(HeapError::OutOfBounds {
                index: self.offset,
                len,
            });
        }
        Ok(self.offset..end)
    }

    fn wrong_body(&self) -> HeapError {
        HeapError::WrongBody {
            class: self.class.to_string(),
            expected: "instance",
        }
    }
}

impl FieldAccessor for PrimitiveAccessor {
    fn get(&self, obj: &ObjRef) -> HeapResult<Value> {
        match &*obj.body() {
            ObjectBody::Instance(data) => {
                let range = self.bounds(data.prims.len())?;
                Ok(Primitive::decode(self.kind, &data.prims[range]).to_value())
            }
            _ => Err(self.wrong_body()),
        }
    }

    fn set(&self, obj: &ObjRef, value: Value) -> HeapResult<()> {
        let prim = Primitive::from_value(self.kind, &value).ok_or_else(|| {
            HeapError::TypeMismatch {
                class: self.class.to_string(),
                field: self.field.to_string(),
                expected: self.kind.name().to_string(),
                found: value.type_name(),
            }
        })?;
        match &mut *obj.body_mut() {
            ObjectBody::Instance(data) => {
                let range = self.bounds(data.prims.len())?;
                prim.encode(&mut data.prims[range]);
                Ok(())
            }
            _ => Err(self.wrong_body()),
        }
    }

    fn reset(&self, obj: &ObjRef) -> HeapResult<()> {
        match &mut *obj.body_mut() {
            ObjectBody::Instance(data) => {
                let range = self.bounds(data.prims.len())?;
                data.prims[range].fill(0);
                Ok(())
            }
            _ => Err(self.wrong_body()),
        }
    }
}

struct ReferenceAccessor {
    class: Arc<str>,
    field: Arc<str>,
    slot: usize,
    array: bool,
}

impl ReferenceAccessor {
    fn wrong_body(&self) -> HeapError {
        HeapError::WrongBody {
            class: self.class.to_string(),
            expected: "instance",
        }
    }
}

impl FieldAccessor for ReferenceAccessor {
    fn get(&self, obj: &ObjRef) -> HeapResult<Value> {
        match &*obj.body() {
            ObjectBody::Instance(data) => {
                data.refs
                    .get(self.slot)
                    .cloned()
                    .ok_or(HeapError::OutOfBounds {
                        index: self.slot,
                        len: data.refs.len(),
                    })
            }
            _ => Err(self.wrong_body()),
        }
    }

    fn set(&self, obj: &ObjRef, value: Value) -> HeapResult<()> {
        let fits = match &value {
            Value::Null => true,
            Value::Ref(target) => !self.array || target.is_array(),
            _ => !self.array,
        };
        if !fits {
            return Err(HeapError::TypeMismatch {
                class: self.class.to_string(),
                field: self.field.to_string(),
                expected: "array".to_string(),
                found: value.type_name(),
            });
        }
        match &mut *obj.body_mut() {
            ObjectBody::Instance(data) => {
                let len = data.refs.len();
                let slot = data.refs.get_mut(self.slot).ok_or(HeapError::OutOfBounds {
                    index: self.slot,
                    len,
                })?;
                *slot = value;
                Ok(())
            }
            _ => Err(self.wrong_body()),
        }
    }

    fn reset(&self, obj: &ObjRef) -> HeapResult<()> {
        self.set(obj, Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, FieldDef};

    #[test]
    fn test_layout_alignment_and_inheritance() {
        let registry = ClassRegistry::new();
        let base = registry
            .define(
                ClassDef::abstract_class("Base")
                    .field(FieldDef::primitive("flag", PrimitiveKind::Bool))
                    .field(FieldDef::object("name"))
                    .field(FieldDef::primitive("counter", PrimitiveKind::I64).static_field()),
            )
            .unwrap();
        let leaf = registry
            .define(
                ClassDef::new("Leaf")
                    .extends(base)
                    .field(FieldDef::primitive("size", PrimitiveKind::I32))
                    .field(FieldDef::object("next")),
            )
            .unwrap();

        let layout = registry.layout(leaf).unwrap();
        let names: Vec<_> = layout.fields().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(names, ["flag", "name", "size", "next"]);
        assert_eq!(
            layout.field("size").unwrap().handle(),
            FieldHandle::Prim {
                offset: 4,
                kind: PrimitiveKind::I32
            }
        );
        assert_eq!(layout.prim_size(), 8);
        assert_eq!(layout.ref_count(), 2);
        assert_eq!(layout.field("flag").unwrap().declaring_class(), base);
        assert!(layout.field("counter").is_err());
    }
}
