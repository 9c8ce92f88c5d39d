//! Identity map: source object identity to its clone, scoped to one clone
//! operation.

use replica_heap::{ObjRef, Value};
use rustc_hash::FxHashMap;

/// Map from source object identity to the clone produced for it.
///
/// Keys are object addresses. Each entry also pins the source handle so its
/// address cannot be reused by another object while the operation runs.
#[derive(Default)]
pub struct IdentityMap {
    entries: FxHashMap<usize, (ObjRef, Value)>,
}

impl IdentityMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone already produced for `source`
    pub fn get(&self, source: &ObjRef) -> Option<Value> {
        self.entries
            .get(&source.addr())
            .map(|(_, clone)| clone.clone())
    }

    /// Has `source` been visited
    pub fn contains(&self, source: &ObjRef) -> bool {
        self.entries.contains_key(&source.addr())
    }

    /// Record the clone of `source`, replacing any earlier entry
    pub fn insert(&mut self, source: &ObjRef, clone: Value) {
        self.entries.insert(source.addr(), (source.clone(), clone));
    }

    /// Number of visited objects
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Nothing visited yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for IdentityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityMap")
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_heap::{ClassId, InstanceData, ObjectBody};

    fn object() -> ObjRef {
        ObjRef::new(ClassId::OBJECT, ObjectBody::Instance(InstanceData::default()))
    }

    #[test]
    fn test_lookup_is_by_identity() {
        let a = object();
        let b = object();
        let a_clone = object();
        let mut map = IdentityMap::new();
        map.insert(&a, Value::Ref(a_clone.clone()));

        assert_eq!(map.get(&a), Some(Value::Ref(a_clone)));
        assert!(map.get(&b).is_none());
        assert!(map.contains(&a.clone()));
        assert_eq!(map.len(), 1);
    }
}
