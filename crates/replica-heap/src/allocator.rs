//! Bare-instance allocator.
//!
//! Produces zero/default-valued instances of an exact class without running
//! any construction logic. Abstract classes, interfaces and enums fail
//! explicitly.

use crate::class::{ArrayComponent, ClassId, ClassKind, ClassRegistry};
use crate::error::{HeapError, HeapResult};
use crate::object::{
    Container, ContainerKind, HashKey, InstanceData, ObjRef, ObjectBody, PrimArray,
};
use crate::value::Value;
use chrono::{DateTime, FixedOffset};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Allocation statistics
#[derive(Debug, Default, Clone)]
pub struct AllocStats {
    /// Instances and containers allocated
    pub instances: u64,
    /// Arrays allocated
    pub arrays: u64,
    /// Bytes of field and element storage allocated
    pub bytes: usize,
}

/// Allocator bound to a class registry
pub struct Allocator {
    registry: Arc<ClassRegistry>,
    instances: AtomicU64,
    arrays: AtomicU64,
    bytes: AtomicUsize,
}

impl Allocator {
    /// Create an allocator for a registry
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self {
            registry,
            instances: AtomicU64::new(0),
            arrays: AtomicU64::new(0),
            bytes: AtomicUsize::new(0),
        }
    }

    /// Registry this allocator serves
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// Allocate a bare instance. Array classes get length zero.
    pub fn allocate(&self, class: ClassId) -> HeapResult<ObjRef> {
        let def = self.registry.class(class)?;
        let body = match def.kind() {
            ClassKind::Concrete => {
                let layout = self.registry.layout(class)?;
                self.bytes.fetch_add(
                    layout.prim_size() + layout.ref_count() * size_of::<Value>(),
                    Ordering::Relaxed,
                );
                ObjectBody::Instance(InstanceData::zeroed(layout.prim_size(), layout.ref_count()))
            }
            ClassKind::Container(kind) => ObjectBody::Container(Container::empty(kind)),
            ClassKind::Array(_) => return self.allocate_array(class, 0),
            ClassKind::Abstract => return Err(not_instantiable(&def, "abstract class")),
            ClassKind::Interface => return Err(not_instantiable(&def, "interface")),
            ClassKind::Enum => return Err(not_instantiable(&def, "enum constants are fixed")),
        };
        self.instances.fetch_add(1, Ordering::Relaxed);

        #[cfg(feature = "heap_logging")]
        tracing::trace!(class = %def.name(), "allocated bare instance");

        Ok(ObjRef::new(class, body))
    }

    /// Allocate a zero- or null-filled array of an array class
    pub fn allocate_array(&self, class: ClassId, len: usize) -> HeapResult<ObjRef> {
        let def = self.registry.class(class)?;
        let body = match def.kind() {
            ClassKind::Array(ArrayComponent::Primitive(kind)) => {
                self.bytes.fetch_add(len * kind.width(), Ordering::Relaxed);
                ObjectBody::PrimArray(PrimArray::zeroed(kind, len))
            }
            ClassKind::Array(ArrayComponent::Reference(_)) => {
                self.bytes
                    .fetch_add(len * size_of::<Value>(), Ordering::Relaxed);
                ObjectBody::RefArray(vec![Value::Null; len])
            }
            _ => return Err(not_instantiable(&def, "not an array class")),
        };
        self.arrays.fetch_add(1, Ordering::Relaxed);
        Ok(ObjRef::new(class, body))
    }

    /// Allocate and populate named fields
    pub fn instantiate(&self, class: ClassId, fields: &[(&str, Value)]) -> HeapResult<ObjRef> {
        let obj = self.allocate(class)?;
        for (name, value) in fields {
            self.registry.set_field(&obj, name, value.clone())?;
        }
        Ok(obj)
    }

    /// Array of `component` holding `items`
    pub fn new_array(&self, component: ArrayComponent, items: Vec<Value>) -> HeapResult<ObjRef> {
        let class = self.registry.array_of(component)?;
        let array = self.allocate_array(class, items.len())?;
        for (index, item) in items.into_iter().enumerate() {
            array.array_set(index, item)?;
        }
        Ok(array)
    }

    /// `ArrayList` of `items`
    pub fn new_list(&self, items: Vec<Value>) -> HeapResult<ObjRef> {
        self.container(ContainerKind::ArrayList, Container::List(items))
    }

    /// `LinkedList` of `items`
    pub fn new_linked_list(&self, items: Vec<Value>) -> HeapResult<ObjRef> {
        self.container(ContainerKind::LinkedList, Container::Linked(items.into()))
    }

    /// `HashSet` of `items`
    pub fn new_hash_set(&self, items: Vec<Value>) -> HeapResult<ObjRef> {
        let set = items.into_iter().map(HashKey::from_value).collect();
        self.container(ContainerKind::HashSet, Container::HashSet(set))
    }

    /// `HashMap` of `entries`
    pub fn new_hash_map(&self, entries: Vec<(Value, Value)>) -> HeapResult<ObjRef> {
        let map = entries
            .into_iter()
            .map(|(k, v)| (HashKey::from_value(k), v))
            .collect();
        self.container(ContainerKind::HashMap, Container::HashMap(map))
    }

    /// `TreeMap` of `entries`
    pub fn new_tree_map(&self, entries: Vec<(Value, Value)>) -> HeapResult<ObjRef> {
        let map = entries
            .into_iter()
            .map(|(k, v)| (HashKey::from_value(k), v))
            .collect();
        self.container(ContainerKind::TreeMap, Container::TreeMap(map))
    }

    /// `Calendar` set to `at`
    pub fn new_calendar(&self, at: DateTime<FixedOffset>) -> HeapResult<ObjRef> {
        self.container(ContainerKind::Calendar, Container::Calendar(at))
    }

    fn container(&self, kind: ContainerKind, body: Container) -> HeapResult<ObjRef> {
        let class = self.registry.builtins().container(kind);
        self.instances.fetch_add(1, Ordering::Relaxed);
        Ok(ObjRef::new(class, ObjectBody::Container(body)))
    }

    /// Snapshot of allocation counters
    pub fn stats(&self) -> AllocStats {
        AllocStats {
            instances: self.instances.load(Ordering::Relaxed),
            arrays: self.arrays.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

fn not_instantiable(def: &crate::class::ClassDef, reason: &'static str) -> HeapError {
    HeapError::NotInstantiable {
        class: def.name().to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, FieldDef};
    use crate::value::PrimitiveKind;

    #[test]
    fn test_allocate_zeroed_instance() {
        let registry = ClassRegistry::new();
        let point = registry
            .define(
                ClassDef::new("Point")
                    .field(FieldDef::primitive("x", PrimitiveKind::I32))
                    .field(FieldDef::object("label")),
            )
            .unwrap();
        let alloc = Allocator::new(registry.clone());
        let obj = alloc.allocate(point).unwrap();
        assert_eq!(registry.get_field(&obj, "x").unwrap(), Value::Int(0));
        assert!(registry.get_field(&obj, "label").unwrap().is_null());
        assert_eq!(alloc.stats().instances, 1);
    }

    #[test]
    fn test_allocate_rejects_uninstantiable() {
        let registry = ClassRegistry::new();
        let shape = registry.define(ClassDef::abstract_class("Shape")).unwrap();
        let named = registry.define(ClassDef::interface("Named")).unwrap();
        let alloc = Allocator::new(registry);
        assert!(matches!(
            alloc.allocate(shape),
            Err(HeapError::NotInstantiable { .. })
        ));
        assert!(matches!(
            alloc.allocate(named),
            Err(HeapError::NotInstantiable { .. })
        ));
    }

    #[test]
    fn test_new_array_and_containers() {
        let registry = ClassRegistry::new();
        let alloc = Allocator::new(registry);
        let arr = alloc
            .new_array(
                ArrayComponent::Primitive(PrimitiveKind::I64),
                vec![Value::Int(1), Value::Int(2)],
            )
            .unwrap();
        assert_eq!(arr.array_len(), Some(2));
        assert_eq!(arr.array_get(1).unwrap(), Value::Int(2));

        let map = alloc
            .new_hash_map(vec![(Value::string("k"), Value::Int(9))])
            .unwrap();
        assert_eq!(map.container().map(|c| c.len()), Some(1));
    }
}
