//! Policy context: what gets shared, nulled, overridden or reset.
//!
//! A [`Policy`] is configured through `&mut self` setters before cloning and
//! only read while a clone runs, so it is shared by reference across the
//! whole traversal (and across threads).

use crate::implementor::{CloneImplementor, ContainerImplementor};
use dashmap::DashMap;
use replica_heap::{ClassId, ClassRegistry, ContainerKind, ObjRef};
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

/// Clone policy
pub struct Policy {
    known_immutables: FxHashSet<ClassId>,
    immutable_classes: FxHashSet<ClassId>,
    non_cloneable_classes: FxHashSet<ClassId>,
    non_cloneable_hierarchies: Vec<ClassId>,
    null_instead: FxHashSet<ClassId>,
    immutable_instances: FxHashMap<usize, ObjRef>,
    overrides: FxHashMap<ClassId, Arc<dyn CloneImplementor>>,
    /// Instance-of answers for `non_cloneable_hierarchies`, per runtime class
    hierarchy_hits: DashMap<ClassId, bool>,
    clone_transient_fields: bool,
    clone_transient_annotated_fields: bool,
    clone_immutable_flagged: bool,
    clone_synthetic_fields: bool,
    use_native_clone_method: bool,
    use_overrides: bool,
}

impl Policy {
    /// Default policy for graphs of `registry`: built-in immutable value
    /// classes shared, built-in containers rebuilt by [`ContainerImplementor`].
    pub fn new(registry: &ClassRegistry) -> Self {
        let builtins = registry.builtins();
        let mut policy = Self::minimal();
        policy.known_immutables = builtins.immutable_values().into_iter().collect();
        policy.use_overrides = true;
        policy.clone_immutable_flagged = false;
        let containers: Arc<dyn CloneImplementor> = Arc::new(ContainerImplementor);
        for kind in ContainerKind::ALL {
            policy
                .overrides
                .insert(builtins.container(kind), containers.clone());
        }
        policy
    }

    /// Policy that clones everything mutable and consults nothing
    pub fn minimal() -> Self {
        Self {
            known_immutables: FxHashSet::default(),
            immutable_classes: FxHashSet::default(),
            non_cloneable_classes: FxHashSet::default(),
            non_cloneable_hierarchies: Vec::new(),
            null_instead: FxHashSet::default(),
            immutable_instances: FxHashMap::default(),
            overrides: FxHashMap::default(),
            hierarchy_hits: DashMap::new(),
            clone_transient_fields: true,
            clone_transient_annotated_fields: true,
            clone_immutable_flagged: true,
            clone_synthetic_fields: false,
            use_native_clone_method: false,
            use_overrides: false,
        }
    }

    /// Share instances of `class` as an immutable wrapper type
    pub fn register_known_immutable(&mut self, class: ClassId) {
        self.known_immutables.insert(class);
    }

    /// Share instances of `class` (exact class)
    pub fn register_immutable(&mut self, class: ClassId) {
        self.immutable_classes.insert(class);
    }

    /// Never clone instances of `class` (exact class)
    pub fn register_non_cloneable(&mut self, class: ClassId) {
        self.non_cloneable_classes.insert(class);
    }

    /// Never clone instances of `class` or any of its subclasses
    pub fn register_non_cloneable_hierarchy(&mut self, class: ClassId) {
        if !self.non_cloneable_hierarchies.contains(&class) {
            self.non_cloneable_hierarchies.push(class);
            self.hierarchy_hits.clear();
        }
    }

    /// Replace instances of `class` with `Null` in clones
    pub fn register_null_instead(&mut self, class: ClassId) {
        self.null_instead.insert(class);
    }

    /// Share this specific object
    pub fn register_immutable_instance(&mut self, obj: &ObjRef) {
        self.immutable_instances.insert(obj.addr(), obj.clone());
    }

    /// Clone instances of exactly `class` with `implementor`
    pub fn register_override(&mut self, class: ClassId, implementor: Arc<dyn CloneImplementor>) {
        tracing::debug!(class = ?class, "registered clone override");
        self.overrides.insert(class, implementor);
    }

    /// Drop the override of `class`, returning it
    pub fn remove_override(&mut self, class: ClassId) -> Option<Arc<dyn CloneImplementor>> {
        self.overrides.remove(&class)
    }

    /// Set whether language-level transient fields are cloned
    pub fn set_clone_transient_fields(&mut self, enabled: bool) {
        self.clone_transient_fields = enabled;
    }

    /// Set whether annotation-transient fields are cloned
    pub fn set_clone_transient_annotated_fields(&mut self, enabled: bool) {
        self.clone_transient_annotated_fields = enabled;
    }

    /// Set whether detector-immutable types are cloned anyway
    pub fn set_clone_immutable_flagged(&mut self, enabled: bool) {
        self.clone_immutable_flagged = enabled;
    }

    /// Set whether synthetic fields are deep-cloned rather than left at
    /// their default value
    pub fn set_clone_synthetic_fields(&mut self, enabled: bool) {
        self.clone_synthetic_fields = enabled;
    }

    /// Set whether self-copy methods are used
    pub fn set_use_native_clone_method(&mut self, enabled: bool) {
        self.use_native_clone_method = enabled;
    }

    /// Set whether overrides are consulted
    pub fn set_use_overrides(&mut self, enabled: bool) {
        self.use_overrides = enabled;
    }

    /// Language-level transient fields are cloned
    pub fn clone_transient_fields(&self) -> bool {
        self.clone_transient_fields
    }

    /// Annotation-transient fields are cloned
    pub fn clone_transient_annotated_fields(&self) -> bool {
        self.clone_transient_annotated_fields
    }

    /// Detector-immutable types are cloned anyway
    pub fn clone_immutable_flagged(&self) -> bool {
        self.clone_immutable_flagged
    }

    /// Synthetic fields are deep-cloned
    pub fn clone_synthetic_fields(&self) -> bool {
        self.clone_synthetic_fields
    }

    /// Self-copy methods are used
    pub fn use_native_clone_method(&self) -> bool {
        self.use_native_clone_method
    }

    /// Overrides are consulted
    pub fn use_overrides(&self) -> bool {
        self.use_overrides
    }

    /// Instances of `class` are returned unchanged
    pub fn shares_class(&self, registry: &ClassRegistry, class: ClassId) -> bool {
        self.known_immutables.contains(&class)
            || self.immutable_classes.contains(&class)
            || self.non_cloneable_classes.contains(&class)
            || self.in_non_cloneable_hierarchy(registry, class)
    }

    /// Instances of `class` clone to `Null`
    pub fn nulls_class(&self, class: ClassId) -> bool {
        self.null_instead.contains(&class)
    }

    /// `obj` is a registered immutable instance
    pub fn is_immutable_instance(&self, obj: &ObjRef) -> bool {
        self.immutable_instances.contains_key(&obj.addr())
    }

    /// Override registered for exactly `class`
    pub fn override_for(&self, class: ClassId) -> Option<&Arc<dyn CloneImplementor>> {
        self.overrides.get(&class)
    }

    fn in_non_cloneable_hierarchy(&self, registry: &ClassRegistry, class: ClassId) -> bool {
        if self.non_cloneable_hierarchies.is_empty() {
            return false;
        }
        if let Some(hit) = self.hierarchy_hits.get(&class) {
            return *hit;
        }
        let hit = self
            .non_cloneable_hierarchies
            .iter()
            .any(|root| registry.is_subclass_of(class, *root));
        self.hierarchy_hits.insert(class, hit);
        hit
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("immutable_classes", &self.immutable_classes.len())
            .field("non_cloneable_classes", &self.non_cloneable_classes.len())
            .field("overrides", &self.overrides.len())
            .field("clone_transient_fields", &self.clone_transient_fields)
            .field(
                "clone_transient_annotated_fields",
                &self.clone_transient_annotated_fields,
            )
            .field("clone_immutable_flagged", &self.clone_immutable_flagged)
            .field("clone_synthetic_fields", &self.clone_synthetic_fields)
            .field("use_native_clone_method", &self.use_native_clone_method)
            .field("use_overrides", &self.use_overrides)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_heap::ClassDef;

    #[test]
    fn test_defaults() {
        let registry = ClassRegistry::new();
        let policy = Policy::new(&registry);
        let builtins = registry.builtins();
        assert!(policy.clone_transient_fields());
        assert!(policy.clone_transient_annotated_fields());
        assert!(!policy.clone_synthetic_fields());
        assert!(!policy.clone_immutable_flagged());
        assert!(!policy.use_native_clone_method());
        assert!(policy.use_overrides());
        assert!(policy.shares_class(&registry, builtins.decimal));
        assert!(
            policy
                .override_for(builtins.container(ContainerKind::HashMap))
                .is_some()
        );
    }

    #[test]
    fn test_hierarchy_covers_subclasses() {
        let registry = ClassRegistry::new();
        let handle = registry.define(ClassDef::abstract_class("Handle")).unwrap();
        let file = registry.define(ClassDef::new("FileHandle").extends(handle)).unwrap();
        let other = registry.define(ClassDef::new("Other")).unwrap();
        let mut policy = Policy::new(&registry);
        policy.register_non_cloneable_hierarchy(handle);
        assert!(policy.shares_class(&registry, file));
        assert!(!policy.shares_class(&registry, other));
        // Cached answers stay correct.
        assert!(policy.shares_class(&registry, file));
    }
}
