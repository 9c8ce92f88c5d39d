//! Heap object layout

use crate::class::ClassId;
use crate::error::{HeapError, HeapResult};
use crate::value::{EnumConstant, Primitive, PrimitiveKind, Value};
use chrono::{DateTime, FixedOffset, Utc};
use indexmap::{IndexMap, IndexSet};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::FxBuildHasher;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Object body tags
pub mod tags {
    /// Field-bearing instance
    pub const INSTANCE: u8 = 1;
    /// Primitive array
    pub const PRIM_ARRAY: u8 = 2;
    /// Reference array
    pub const REF_ARRAY: u8 = 3;
    /// Built-in container
    pub const CONTAINER: u8 = 4;
}

/// Object header
#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    class: ClassId,
    tag: u8,
}

impl ObjectHeader {
    /// Runtime class
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Body tag
    pub fn tag(&self) -> u8 {
        self.tag
    }
}

/// A heap object: header plus lock-protected body
pub struct HeapObject {
    header: ObjectHeader,
    body: RwLock<ObjectBody>,
}

/// Field storage of an instance: a primitive block addressed by byte offset
/// and a reference block addressed by slot index.
#[derive(Clone, Debug, Default)]
pub struct InstanceData {
    /// Little-endian primitive field bytes
    pub prims: Box<[u8]>,
    /// Reference field slots
    pub refs: Box<[Value]>,
}

impl InstanceData {
    /// Zeroed storage
    pub fn zeroed(prim_size: usize, ref_count: usize) -> Self {
        Self {
            prims: vec![0u8; prim_size].into_boxed_slice(),
            refs: vec![Value::Null; ref_count].into_boxed_slice(),
        }
    }
}

/// Flat primitive array storage
#[derive(Clone, Debug)]
pub struct PrimArray {
    kind: PrimitiveKind,
    bytes: Vec<u8>,
}

impl PrimArray {
    /// Zero-filled array
    pub fn zeroed(kind: PrimitiveKind, len: usize) -> Self {
        Self {
            kind,
            bytes: vec![0u8; len * kind.width()],
        }
    }

    /// Build from raw little-endian bytes
    pub fn from_bytes(kind: PrimitiveKind, bytes: Vec<u8>) -> HeapResult<Self> {
        if bytes.len() % kind.width() != 0 {
            return Err(HeapError::OutOfBounds {
                index: bytes.len(),
                len: bytes.len() - bytes.len() % kind.width(),
            });
        }
        Ok(Self { kind, bytes })
    }

    /// Element kind
    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }

    /// Element count
    pub fn len(&self) -> usize {
        self.bytes.len() / self.kind.width()
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Raw bytes, mutable
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Read element `index`
    pub fn get(&self, index: usize) -> HeapResult<Primitive> {
        let width = self.kind.width();
        let start = index * width;
        let slice = self.bytes.get(start..start + width).ok_or(HeapError::OutOfBounds {
            index,
            len: self.len(),
        })?;
        Ok(Primitive::decode(self.kind, slice))
    }

    /// Write element `index`; the primitive must match the element kind
    pub fn set(&mut self, index: usize, value: Primitive) -> HeapResult<()> {
        if value.kind() != self.kind {
            return Err(HeapError::TypeMismatch {
                class: format!("{}[]", self.kind.name()),
                field: index.to_string(),
                expected: self.kind.name().to_string(),
                found: value.kind().name(),
            });
        }
        let len = self.len();
        let width = self.kind.width();
        let start = index * width;
        let slot = self
            .bytes
            .get_mut(start..start + width)
            .ok_or(HeapError::OutOfBounds { index, len })?;
        value.encode(slot);
        Ok(())
    }
}

/// Built-in container kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Growable array list
    ArrayList,
    /// Doubly-ended linked list
    LinkedList,
    /// Hash set
    HashSet,
    /// Hash map
    HashMap,
    /// Ordered map
    TreeMap,
    /// Mutable calendar instant
    Calendar,
}

impl ContainerKind {
    /// All kinds, in bootstrap order
    pub const ALL: [ContainerKind; 6] = [
        Self::ArrayList,
        Self::LinkedList,
        Self::HashSet,
        Self::HashMap,
        Self::TreeMap,
        Self::Calendar,
    ];

    /// Built-in class name
    pub const fn class_name(self) -> &'static str {
        match self {
            Self::ArrayList => "ArrayList",
            Self::LinkedList => "LinkedList",
            Self::HashSet => "HashSet",
            Self::HashMap => "HashMap",
            Self::TreeMap => "TreeMap",
            Self::Calendar => "Calendar",
        }
    }
}

/// Key of a hashed or ordered container. Immediates hash by value, heap
/// objects by identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HashKey {
    /// `null` key
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float, by bit pattern
    FloatBits(u64),
    /// Character
    Char(char),
    /// String
    Str(Arc<str>),
    /// Enum constant
    Enum(EnumConstant),
    /// Heap object, by identity
    Ref(ObjRef),
}

impl HashKey {
    /// Convert a value into a key
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(v) => Self::Int(v),
            Value::Float(v) => Self::FloatBits(v.to_bits()),
            Value::Char(c) => Self::Char(c),
            Value::Str(s) => Self::Str(s),
            Value::Enum(e) => Self::Enum(e),
            Value::Ref(obj) => Self::Ref(obj),
        }
    }

    /// Convert back into a value
    pub fn to_value(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(v) => Value::Int(*v),
            Self::FloatBits(bits) => Value::Float(f64::from_bits(*bits)),
            Self::Char(c) => Value::Char(*c),
            Self::Str(s) => Value::Str(s.clone()),
            Self::Enum(e) => Value::Enum(e.clone()),
            Self::Ref(obj) => Value::Ref(obj.clone()),
        }
    }
}

/// Insertion-ordered hash set
pub type ObjectSet = IndexSet<HashKey, FxBuildHasher>;
/// Insertion-ordered hash map
pub type ObjectMap = IndexMap<HashKey, Value, FxBuildHasher>;

/// Container body
#[derive(Clone, Debug)]
pub enum Container {
    /// `ArrayList`
    List(Vec<Value>),
    /// `LinkedList`
    Linked(VecDeque<Value>),
    /// `HashSet`
    HashSet(ObjectSet),
    /// `HashMap`
    HashMap(ObjectMap),
    /// `TreeMap`
    TreeMap(BTreeMap<HashKey, Value>),
    /// `Calendar`
    Calendar(DateTime<FixedOffset>),
}

impl Container {
    /// Empty container of a kind. Calendars start at the Unix epoch in UTC.
    pub fn empty(kind: ContainerKind) -> Self {
        match kind {
            ContainerKind::ArrayList => Self::List(Vec::new()),
            ContainerKind::LinkedList => Self::Linked(VecDeque::new()),
            ContainerKind::HashSet => Self::HashSet(ObjectSet::default()),
            ContainerKind::HashMap => Self::HashMap(ObjectMap::default()),
            ContainerKind::TreeMap => Self::TreeMap(BTreeMap::new()),
            ContainerKind::Calendar => Self::Calendar(DateTime::<Utc>::UNIX_EPOCH.fixed_offset()),
        }
    }

    /// Kind of this container
    pub fn kind(&self) -> ContainerKind {
        match self {
            Self::List(_) => ContainerKind::ArrayList,
            Self::Linked(_) => ContainerKind::LinkedList,
            Self::HashSet(_) => ContainerKind::HashSet,
            Self::HashMap(_) => ContainerKind::HashMap,
            Self::TreeMap(_) => ContainerKind::TreeMap,
            Self::Calendar(_) => ContainerKind::Calendar,
        }
    }

    /// Number of logical entries (calendars count as one)
    pub fn len(&self) -> usize {
        match self {
            Self::List(items) => items.len(),
            Self::Linked(items) => items.len(),
            Self::HashSet(items) => items.len(),
            Self::HashMap(entries) => entries.len(),
            Self::TreeMap(entries) => entries.len(),
            Self::Calendar(_) => 1,
        }
    }

    /// Is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Object body
#[derive(Debug)]
pub enum ObjectBody {
    /// Field-bearing instance
    Instance(InstanceData),
    /// Primitive array
    PrimArray(PrimArray),
    /// Reference array
    RefArray(Vec<Value>),
    /// Built-in container
    Container(Container),
}

impl ObjectBody {
    /// Body tag
    pub fn tag(&self) -> u8 {
        match self {
            Self::Instance(_) => tags::INSTANCE,
            Self::PrimArray(_) => tags::PRIM_ARRAY,
            Self::RefArray(_) => tags::REF_ARRAY,
            Self::Container(_) => tags::CONTAINER,
        }
    }
}

/// Shared handle to a heap object. Equality, ordering and hashing use the
/// object's address, never its contents.
#[derive(Clone)]
pub struct ObjRef(Arc<HeapObject>);

impl ObjRef {
    /// Wrap a body into a new object
    pub fn new(class: ClassId, body: ObjectBody) -> Self {
        let header = ObjectHeader {
            class,
            tag: body.tag(),
        };
        Self(Arc::new(HeapObject {
            header,
            body: RwLock::new(body),
        }))
    }

    /// Object header
    pub fn header(&self) -> ObjectHeader {
        self.0.header
    }

    /// Runtime class
    pub fn class(&self) -> ClassId {
        self.0.header.class
    }

    /// Object address, the identity key
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Reference identity
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Shared borrow of the body
    pub fn body(&self) -> RwLockReadGuard<'_, ObjectBody> {
        self.0.body.read()
    }

    /// Exclusive borrow of the body
    pub fn body_mut(&self) -> RwLockWriteGuard<'_, ObjectBody> {
        self.0.body.write()
    }

    /// Is this an array
    pub fn is_array(&self) -> bool {
        matches!(self.header().tag(), tags::PRIM_ARRAY | tags::REF_ARRAY)
    }

    /// Array length
    pub fn array_len(&self) -> Option<usize> {
        match &*self.body() {
            ObjectBody::PrimArray(arr) => Some(arr.len()),
            ObjectBody::RefArray(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Read an array element, boxing primitives
    pub fn array_get(&self, index: usize) -> HeapResult<Value> {
        match &*self.body() {
            ObjectBody::PrimArray(arr) => arr.get(index).map(Primitive::to_value),
            ObjectBody::RefArray(items) => {
                items.get(index).cloned().ok_or(HeapError::OutOfBounds {
                    index,
                    len: items.len(),
                })
            }
            _ => Err(self.wrong_body("array")),
        }
    }

    /// Write an array element, unboxing for primitive arrays
    pub fn array_set(&self, index: usize, value: Value) -> HeapResult<()> {
        let class = self.class();
        match &mut *self.body_mut() {
            ObjectBody::PrimArray(arr) => {
                let kind = arr.kind();
                let prim = Primitive::from_value(kind, &value).ok_or_else(|| {
                    HeapError::TypeMismatch {
                        class: format!("{class:?}"),
                        field: index.to_string(),
                        expected: kind.name().to_string(),
                        found: value.type_name(),
                    }
                })?;
                arr.set(index, prim)
            }
            ObjectBody::RefArray(items) => {
                let len = items.len();
                let slot = items.get_mut(index).ok_or(HeapError::OutOfBounds { index, len })?;
                *slot = value;
                Ok(())
            }
            _ => Err(HeapError::WrongBody {
                class: format!("{class:?}"),
                expected: "array",
            }),
        }
    }

    /// Snapshot of a container body
    pub fn container(&self) -> Option<Container> {
        match &*self.body() {
            ObjectBody::Container(c) => Some(c.clone()),
            _ => None,
        }
    }

    /// Mutate a container body in place
    pub fn with_container<R>(&self, f: impl FnOnce(&mut Container) -> R) -> HeapResult<R> {
        match &mut *self.body_mut() {
            ObjectBody::Container(c) => Ok(f(c)),
            _ => Err(self.wrong_body("container")),
        }
    }

    fn wrong_body(&self, expected: &'static str) -> HeapError {
        HeapError::WrongBody {
            class: format!("{:?}", self.class()),
            expected,
        }
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjRef {}

impl Hash for ObjRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl PartialOrd for ObjRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:?} @ {:#x})", self.class(), self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_semantics() {
        let a = ObjRef::new(ClassId::OBJECT, ObjectBody::Instance(InstanceData::default()));
        let b = ObjRef::new(ClassId::OBJECT, ObjectBody::Instance(InstanceData::default()));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.header().tag(), tags::INSTANCE);
    }

    #[test]
    fn test_prim_array_access() {
        let arr = ObjRef::new(
            ClassId::OBJECT,
            ObjectBody::PrimArray(PrimArray::zeroed(PrimitiveKind::I16, 3)),
        );
        arr.array_set(1, Value::Int(300)).unwrap();
        assert_eq!(arr.array_get(1).unwrap(), Value::Int(300));
        assert_eq!(arr.array_get(0).unwrap(), Value::Int(0));
        assert!(arr.array_set(1, Value::Int(70_000)).is_err());
        assert!(matches!(
            arr.array_get(3),
            Err(HeapError::OutOfBounds { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_hash_key_roundtrip_identity() {
        let obj = ObjRef::new(ClassId::OBJECT, ObjectBody::Instance(InstanceData::default()));
        let key = HashKey::from_value(Value::Ref(obj.clone()));
        assert_eq!(key.to_value(), Value::Ref(obj));
        assert_eq!(HashKey::from_value(Value::Float(2.5)).to_value(), Value::Float(2.5));
    }
}
