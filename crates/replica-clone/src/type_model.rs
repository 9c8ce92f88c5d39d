//! Type models: per-class clone metadata, built once and cached.
//!
//! A [`TypeModel`] is the ordered list of fields to copy plus the class-level
//! decisions the strategy needs (immutability classification, annotation
//! implementor, self-copy method). Models are a pure function of the class,
//! so concurrent builds of the same class are harmless: the first insert wins
//! and later builds are dropped.

use crate::error::{CloneError, CloneResult};
use dashmap::DashMap;
use replica_heap::{
    Category, ClassDef, ClassFlags, ClassId, ClassKind, ClassRegistry, FieldAccessor,
    FieldHandle, FieldModifiers, FieldType, SelfCopyFn,
};
use std::sync::{Arc, OnceLock};

/// Type-level clone classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Clone field by field
    Mutable,
    /// Detected or declared immutable; shared unless the policy says otherwise
    Immutable,
    /// Always shared
    NonCloneable,
}

/// Contributes type-level classifications to the cache
pub trait ImmutabilityDetector: Send + Sync {
    /// Classify `class`, whose definition is `def`
    fn classify(&self, registry: &ClassRegistry, class: ClassId, def: &ClassDef)
    -> Classification;
}

/// Default detector: reads class markers, honouring markers that extend to
/// subclasses.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlagDetector;

impl ImmutabilityDetector for FlagDetector {
    fn classify(
        &self,
        registry: &ClassRegistry,
        class: ClassId,
        def: &ClassDef,
    ) -> Classification {
        let flags = def.class_flags();
        if flags.contains(ClassFlags::NON_CLONEABLE) {
            return Classification::NonCloneable;
        }
        if flags.contains(ClassFlags::IMMUTABLE) {
            return Classification::Immutable;
        }
        let inherited = registry
            .ancestors(class)
            .unwrap_or_default()
            .into_iter()
            .skip(1)
            .filter_map(|ancestor| registry.class(ancestor).ok())
            .any(|ancestor| {
                ancestor
                    .class_flags()
                    .contains(ClassFlags::IMMUTABLE | ClassFlags::IMMUTABLE_SUBCLASSES)
            });
        if inherited {
            Classification::Immutable
        } else {
            Classification::Mutable
        }
    }
}

/// One field the engine copies
#[derive(Clone)]
pub struct FieldDescriptor {
    /// Name of the class the model describes (for diagnostics)
    pub owner: Arc<str>,
    /// Declaring class
    pub declaring_class: ClassId,
    /// Field name
    pub name: Arc<str>,
    /// Static type
    pub field_type: FieldType,
    /// Category
    pub category: Category,
    /// Raw storage location
    pub handle: FieldHandle,
    /// Reflective accessor
    pub accessor: Arc<dyn FieldAccessor>,
    /// Language-level transient
    pub is_transient: bool,
    /// Transient by annotation
    pub is_transient_annotated: bool,
    /// Compiler-generated; left at its default unless the policy clones
    /// synthetic fields
    pub is_synthetic: bool,
}

impl std::fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Cached clone metadata of one class
#[derive(Debug)]
pub struct TypeModel {
    class: ClassId,
    name: Arc<str>,
    kind: ClassKind,
    fields: Vec<FieldDescriptor>,
    classification: Classification,
    clone_with: Option<Arc<str>>,
    self_copy: Option<SelfCopyFn>,
    prim_size: usize,
    ref_count: usize,
}

impl TypeModel {
    /// Class described
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Class name
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Class kind
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Instance fields, ancestors first
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    /// Type-level classification
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Named annotation implementor
    pub fn clone_with(&self) -> Option<&Arc<str>> {
        self.clone_with.as_ref()
    }

    /// Cached self-copy method
    pub fn self_copy(&self) -> Option<SelfCopyFn> {
        self.self_copy
    }

    /// Primitive block size of instances
    pub fn prim_size(&self) -> usize {
        self.prim_size
    }

    /// Reference slot count of instances
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }
}

/// Concurrent insert-once cache of type models
pub struct TypeModelCache {
    registry: Arc<ClassRegistry>,
    models: DashMap<ClassId, Arc<TypeModel>>,
    detector: Arc<dyn ImmutabilityDetector>,
}

static GLOBAL: OnceLock<Arc<TypeModelCache>> = OnceLock::new();

impl TypeModelCache {
    /// Cache over `registry` with the flag detector
    pub fn new(registry: Arc<ClassRegistry>) -> Self {
        Self::with_detector(registry, Arc::new(FlagDetector))
    }

    /// Cache with a custom detector
    pub fn with_detector(
        registry: Arc<ClassRegistry>,
        detector: Arc<dyn ImmutabilityDetector>,
    ) -> Self {
        Self {
            registry,
            models: DashMap::new(),
            detector,
        }
    }

    /// Process-wide cache over the global registry
    pub fn global() -> &'static Arc<TypeModelCache> {
        GLOBAL.get_or_init(|| Arc::new(TypeModelCache::new(ClassRegistry::global().clone())))
    }

    /// Registry the models are built from
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// Number of cached models
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// No model built yet
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model of `class`, built on first request
    pub fn get(&self, class: ClassId) -> CloneResult<Arc<TypeModel>> {
        if let Some(model) = self.models.get(&class) {
            return Ok(model.clone());
        }
        let model = Arc::new(self.build(class)?);
        Ok(self.models.entry(class).or_insert(model).clone())
    }

    fn build(&self, class: ClassId) -> CloneResult<TypeModel> {
        let introspection = |source| CloneError::Introspection {
            class: self.registry.class_name(class),
            source,
        };
        let def = self.registry.class(class).map_err(introspection)?;
        let layout = self.registry.layout(class).map_err(introspection)?;

        let fields: Vec<FieldDescriptor> = layout
            .fields()
            .iter()
            .map(|f| FieldDescriptor {
                owner: def.name().clone(),
                declaring_class: f.declaring_class(),
                name: f.name().clone(),
                field_type: f.field_type(),
                category: f.category(),
                handle: f.handle(),
                accessor: f.accessor().clone(),
                is_transient: f.modifiers().contains(FieldModifiers::TRANSIENT),
                is_transient_annotated: f
                    .modifiers()
                    .contains(FieldModifiers::TRANSIENT_ANNOTATED),
                is_synthetic: f.modifiers().contains(FieldModifiers::SYNTHETIC),
            })
            .collect();
        let classification = self.detector.classify(&self.registry, class, &def);

        tracing::debug!(
            class = %def.name(),
            fields = fields.len(),
            ?classification,
            "built type model"
        );

        Ok(TypeModel {
            class,
            name: def.name().clone(),
            kind: def.kind(),
            fields,
            classification,
            clone_with: def.clone_implementor().cloned(),
            self_copy: def.self_copy_method(),
            prim_size: layout.prim_size(),
            ref_count: layout.ref_count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replica_heap::{ClassDef, FieldDef, PrimitiveKind};

    #[test]
    fn test_model_is_cached() {
        let registry = ClassRegistry::new();
        let node = registry
            .define(ClassDef::new("Node").field(FieldDef::object("next")))
            .unwrap();
        let cache = TypeModelCache::new(registry);
        let a = cache.get(node).unwrap();
        let b = cache.get(node).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_field_markers() {
        let registry = ClassRegistry::new();
        let inner = registry
            .define(
                ClassDef::new("Inner")
                    .field(FieldDef::object("outer").synthetic())
                    .field(FieldDef::primitive("n", PrimitiveKind::I32).transient())
                    .field(FieldDef::primitive("shared", PrimitiveKind::I64).static_field()),
            )
            .unwrap();
        let model = TypeModelCache::new(registry).get(inner).unwrap();
        let names: Vec<&str> = model.fields().iter().map(|f| f.name.as_ref()).collect();
        assert_eq!(names, ["outer", "n"]);
        assert!(model.fields()[0].is_synthetic);
        assert!(model.fields()[1].is_transient);
        assert_eq!(model.fields()[1].category, Category::Primitive);
    }

    #[test]
    fn test_flag_detector_inherits_subclass_immutability() {
        let registry = ClassRegistry::new();
        let frozen = registry
            .define(
                ClassDef::new("Frozen")
                    .flags(ClassFlags::IMMUTABLE | ClassFlags::IMMUTABLE_SUBCLASSES),
            )
            .unwrap();
        let child = registry.define(ClassDef::new("Child").extends(frozen)).unwrap();
        let plain = registry
            .define(ClassDef::new("Plain").flags(ClassFlags::NON_CLONEABLE))
            .unwrap();
        let cache = TypeModelCache::new(registry);
        assert_eq!(
            cache.get(child).unwrap().classification(),
            Classification::Immutable
        );
        assert_eq!(
            cache.get(plain).unwrap().classification(),
            Classification::NonCloneable
        );
    }

    #[test]
    fn test_unknown_class_is_an_introspection_error() {
        let registry = ClassRegistry::new();
        let stranger = ClassRegistry::new();
        let ghost = stranger.define(ClassDef::new("Ghost")).unwrap();
        // Ghost's id is past the end of `registry`.
        let cache = TypeModelCache::new(registry);
        assert!(matches!(
            cache.get(ghost),
            Err(CloneError::Introspection { .. })
        ));
    }
}
