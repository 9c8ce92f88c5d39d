//! Class definitions and the class registry.
//!
//! The registry is the type-introspection provider: given a class it reports
//! the instance fields declared anywhere in the ancestor chain together with
//! their category and access handle (see [`ClassRegistry::fields`]).

use crate::error::{HeapError, HeapResult};
use crate::layout::{FieldInfo, InstanceLayout};
use crate::object::{ContainerKind, ObjRef};
use crate::value::{EnumConstant, PrimitiveKind, Value};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::ops::BitOr;
use std::sync::{Arc, OnceLock};

/// Registry-assigned class identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    /// The root class every concrete class extends
    pub const OBJECT: ClassId = ClassId(0);

    /// Index into the registry
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Component of an array class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayComponent {
    /// Flat primitive elements
    Primitive(PrimitiveKind),
    /// Reference elements of a static element class
    Reference(ClassId),
}

/// What kind of class this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// Ordinary instantiable class
    Concrete,
    /// Abstract class (fields, no instances)
    Abstract,
    /// Interface (no fields, no instances)
    Interface,
    /// Enum; constants are [`Value::Enum`] values
    Enum,
    /// Array class
    Array(ArrayComponent),
    /// Built-in container class
    Container(ContainerKind),
}

/// Class-level markers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassFlags(u8);

impl ClassFlags {
    /// No markers
    pub const NONE: ClassFlags = ClassFlags(0);
    /// Instances are immutable and never need cloning
    pub const IMMUTABLE: ClassFlags = ClassFlags(1);
    /// Immutability extends to every subclass
    pub const IMMUTABLE_SUBCLASSES: ClassFlags = ClassFlags(1 << 1);
    /// Instances must be shared, never duplicated
    pub const NON_CLONEABLE: ClassFlags = ClassFlags(1 << 2);

    /// All bits of `other` are set
    pub fn contains(self, other: ClassFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ClassFlags {
    type Output = ClassFlags;

    fn bitor(self, rhs: ClassFlags) -> ClassFlags {
        ClassFlags(self.0 | rhs.0)
    }
}

/// Field modifiers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldModifiers(u8);

impl FieldModifiers {
    /// None
    pub const NONE: FieldModifiers = FieldModifiers(0);
    /// Class-level field, not part of instances
    pub const STATIC: FieldModifiers = FieldModifiers(1);
    /// Language-level transient field
    pub const TRANSIENT: FieldModifiers = FieldModifiers(1 << 1);
    /// Field carrying a transient annotation
    pub const TRANSIENT_ANNOTATED: FieldModifiers = FieldModifiers(1 << 2);
    /// Compiler-generated field (captured outer instance and the like)
    pub const SYNTHETIC: FieldModifiers = FieldModifiers(1 << 3);

    /// All bits of `other` are set
    pub fn contains(self, other: FieldModifiers) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FieldModifiers {
    type Output = FieldModifiers;

    fn bitor(self, rhs: FieldModifiers) -> FieldModifiers {
        FieldModifiers(self.0 | rhs.0)
    }
}

/// Static type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Primitive stored in the instance's primitive block
    Primitive(PrimitiveKind),
    /// Reference to an object of (a subclass of) the class
    Object(ClassId),
    /// Reference to an array of the given array class
    Array(ClassId),
}

/// A declared field
#[derive(Debug, Clone)]
pub struct FieldDef {
    name: Arc<str>,
    ty: FieldType,
    modifiers: FieldModifiers,
}

impl FieldDef {
    /// New field
    pub fn new(name: impl Into<Arc<str>>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            modifiers: FieldModifiers::NONE,
        }
    }

    /// Primitive field
    pub fn primitive(name: impl Into<Arc<str>>, kind: PrimitiveKind) -> Self {
        Self::new(name, FieldType::Primitive(kind))
    }

    /// Untyped object reference field
    pub fn object(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, FieldType::Object(ClassId::OBJECT))
    }

    /// Mark transient
    pub fn transient(mut self) -> Self {
        self.modifiers = self.modifiers | FieldModifiers::TRANSIENT;
        self
    }

    /// Mark with the transient annotation
    pub fn transient_annotated(mut self) -> Self {
        self.modifiers = self.modifiers | FieldModifiers::TRANSIENT_ANNOTATED;
        self
    }

    /// Mark synthetic
    pub fn synthetic(mut self) -> Self {
        self.modifiers = self.modifiers | FieldModifiers::SYNTHETIC;
        self
    }

    /// Mark static
    pub fn static_field(mut self) -> Self {
        self.modifiers = self.modifiers | FieldModifiers::STATIC;
        self
    }

    /// Field name
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Static type
    pub fn ty(&self) -> FieldType {
        self.ty
    }

    /// Modifiers
    pub fn modifiers(&self) -> FieldModifiers {
        self.modifiers
    }
}

/// Native self-copy method: returns a new instance of the receiver's class.
pub type SelfCopyFn =
    fn(&ObjRef) -> Result<ObjRef, Box<dyn std::error::Error + Send + Sync>>;

/// A class definition
#[derive(Debug, Clone)]
pub struct ClassDef {
    name: Arc<str>,
    superclass: Option<ClassId>,
    kind: ClassKind,
    fields: Vec<FieldDef>,
    flags: ClassFlags,
    clone_with: Option<Arc<str>>,
    self_copy: Option<SelfCopyFn>,
    constants: Vec<Arc<str>>,
}

impl ClassDef {
    fn with_kind(name: impl Into<Arc<str>>, kind: ClassKind) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            kind,
            fields: Vec::new(),
            flags: ClassFlags::NONE,
            clone_with: None,
            self_copy: None,
            constants: Vec::new(),
        }
    }

    /// Concrete class extending `Object` unless [`ClassDef::extends`] says otherwise
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self::with_kind(name, ClassKind::Concrete)
    }

    /// Abstract class
    pub fn abstract_class(name: impl Into<Arc<str>>) -> Self {
        Self::with_kind(name, ClassKind::Abstract)
    }

    /// Interface
    pub fn interface(name: impl Into<Arc<str>>) -> Self {
        Self::with_kind(name, ClassKind::Interface)
    }

    /// Enum with the given constants
    pub fn enumeration(name: impl Into<Arc<str>>, constants: &[&str]) -> Self {
        let mut def = Self::with_kind(name, ClassKind::Enum);
        def.constants = constants.iter().map(|c| Arc::from(*c)).collect();
        def
    }

    /// Set the superclass
    pub fn extends(mut self, superclass: ClassId) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Declare a field
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Add class markers
    pub fn flags(mut self, flags: ClassFlags) -> Self {
        self.flags = self.flags | flags;
        self
    }

    /// Name the clone implementor that handles this class
    pub fn clone_with(mut self, implementor: impl Into<Arc<str>>) -> Self {
        self.clone_with = Some(implementor.into());
        self
    }

    /// Attach a native self-copy method
    pub fn self_copy(mut self, method: SelfCopyFn) -> Self {
        self.self_copy = Some(method);
        self
    }

    /// Class name
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Superclass
    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass
    }

    /// Kind
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Declared fields (including static ones)
    pub fn declared_fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Markers
    pub fn class_flags(&self) -> ClassFlags {
        self.flags
    }

    /// Named clone implementor
    pub fn clone_implementor(&self) -> Option<&Arc<str>> {
        self.clone_with.as_ref()
    }

    /// Native self-copy method
    pub fn self_copy_method(&self) -> Option<SelfCopyFn> {
        self.self_copy
    }

    /// Enum constant names
    pub fn constants(&self) -> &[Arc<str>] {
        &self.constants
    }
}

/// Ids of the classes every registry starts with
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    /// `Object`
    pub object: ClassId,
    /// `Decimal`
    pub decimal: ClassId,
    /// `Uuid`
    pub uuid: ClassId,
    /// `Instant`
    pub instant: ClassId,
    /// `Duration`
    pub duration: ClassId,
    /// `Locale`
    pub locale: ClassId,
    containers: [ClassId; 6],
}

impl Builtins {
    /// Class of a container kind
    pub fn container(&self, kind: ContainerKind) -> ClassId {
        let index = ContainerKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default();
        self.containers[index]
    }

    /// Immutable value classes
    pub fn immutable_values(&self) -> [ClassId; 5] {
        [
            self.decimal,
            self.uuid,
            self.instant,
            self.duration,
            self.locale,
        ]
    }
}

/// Registry of all classes. Classes are append-only and never unloaded.
pub struct ClassRegistry {
    classes: RwLock<Vec<Arc<ClassDef>>>,
    by_name: DashMap<Arc<str>, ClassId>,
    layouts: DashMap<ClassId, Arc<InstanceLayout>>,
    builtins: Builtins,
}

fn insert_class(
    classes: &mut Vec<Arc<ClassDef>>,
    by_name: &DashMap<Arc<str>, ClassId>,
    def: ClassDef,
) -> ClassId {
    let id = ClassId(classes.len() as u32);
    by_name.insert(def.name.clone(), id);
    classes.push(Arc::new(def));
    id
}

fn bootstrap(classes: &mut Vec<Arc<ClassDef>>, by_name: &DashMap<Arc<str>, ClassId>) -> Builtins {
    use PrimitiveKind::*;

    let object = insert_class(classes, by_name, ClassDef::new("Object"));
    let mut value_class = |name: &str, fields: &[(&str, PrimitiveKind)]| {
        let def = fields
            .iter()
            .fold(ClassDef::new(name).extends(object), |def, (field, kind)| {
                def.field(FieldDef::primitive(*field, *kind))
            });
        insert_class(classes, by_name, def)
    };
    let decimal = value_class("Decimal", &[("unscaled", I64), ("scale", I32)]);
    let uuid = value_class("Uuid", &[("high", I64), ("low", I64)]);
    let instant = value_class("Instant", &[("seconds", I64), ("nanos", I32)]);
    let duration = value_class("Duration", &[("seconds", I64), ("nanos", I32)]);
    let locale = insert_class(
        classes,
        by_name,
        ClassDef::new("Locale")
            .extends(object)
            .field(FieldDef::object("tag")),
    );

    let mut containers = [object; 6];
    for (slot, kind) in containers.iter_mut().zip(ContainerKind::ALL) {
        let def =
            ClassDef::with_kind(kind.class_name(), ClassKind::Container(kind)).extends(object);
        *slot = insert_class(classes, by_name, def);
    }

    Builtins {
        object,
        decimal,
        uuid,
        instant,
        duration,
        locale,
        containers,
    }
}

static GLOBAL: OnceLock<Arc<ClassRegistry>> = OnceLock::new();

impl ClassRegistry {
    /// Create a registry holding only the built-in classes
    pub fn new() -> Arc<Self> {
        let mut classes = RwLock::new(Vec::new());
        let by_name = DashMap::new();
        let builtins = bootstrap(classes.get_mut(), &by_name);
        Arc::new(Self {
            classes,
            by_name,
            layouts: DashMap::new(),
            builtins,
        })
    }

    /// Process-wide registry
    pub fn global() -> &'static Arc<ClassRegistry> {
        GLOBAL.get_or_init(ClassRegistry::new)
    }

    /// Built-in class ids
    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    /// Register a user class
    pub fn define(&self, mut def: ClassDef) -> HeapResult<ClassId> {
        let mut classes = self.classes.write();
        if self.by_name.contains_key(&def.name) {
            return Err(HeapError::DuplicateClass(def.name.to_string()));
        }

        match def.kind {
            ClassKind::Array(_) | ClassKind::Container(_) => {
                return Err(HeapError::invalid(
                    def.name.as_ref(),
                    "array and container classes are built in",
                ));
            }
            ClassKind::Interface => {
                if def.fields.iter().any(|f| !f.modifiers.contains(FieldModifiers::STATIC)) {
                    return Err(HeapError::invalid(
                        def.name.as_ref(),
                        "interfaces cannot declare instance fields",
                    ));
                }
                def.superclass = None;
            }
            ClassKind::Concrete | ClassKind::Abstract | ClassKind::Enum => {
                let parent = def.superclass.unwrap_or(ClassId::OBJECT);
                let parent_def = classes
                    .get(parent.index())
                    .ok_or_else(|| HeapError::UnknownClass(format!("{parent:?}")))?;
                if !matches!(parent_def.kind, ClassKind::Concrete | ClassKind::Abstract) {
                    return Err(HeapError::invalid(
                        def.name.as_ref(),
                        format!("cannot extend {}", parent_def.name),
                    ));
                }
                def.superclass = Some(parent);
            }
        }

        for (i, field) in def.fields.iter().enumerate() {
            if def.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(HeapError::invalid(
                    def.name.as_ref(),
                    format!("duplicate field {}", field.name),
                ));
            }
            match field.ty {
                FieldType::Object(class) if class.index() >= classes.len() => {
                    return Err(HeapError::UnknownClass(format!("{class:?}")));
                }
                FieldType::Array(class) => match classes.get(class.index()) {
                    Some(array) if matches!(array.kind, ClassKind::Array(_)) => {}
                    _ => {
                        return Err(HeapError::invalid(
                            def.name.as_ref(),
                            format!("field {} is not typed by an array class", field.name),
                        ));
                    }
                },
                _ => {}
            }
        }

        let id = insert_class(&mut classes, &self.by_name, def);

        #[cfg(feature = "heap_logging")]
        tracing::debug!(class = ?id, "defined class");

        Ok(id)
    }

    /// Class of arrays with the given component, created on first use
    pub fn array_of(&self, component: ArrayComponent) -> HeapResult<ClassId> {
        let name = match component {
            ArrayComponent::Primitive(kind) => format!("{}[]", kind.name()),
            ArrayComponent::Reference(class) => format!("{}[]", self.class(class)?.name),
        };
        if let Some(id) = self.by_name.get(name.as_str()) {
            return Ok(*id);
        }
        let mut classes = self.classes.write();
        // Re-check under the write lock: another thread may have won.
        if let Some(id) = self.by_name.get(name.as_str()) {
            return Ok(*id);
        }
        let def = ClassDef::with_kind(name, ClassKind::Array(component)).extends(ClassId::OBJECT);
        Ok(insert_class(&mut classes, &self.by_name, def))
    }

    /// Look up a class definition
    pub fn class(&self, id: ClassId) -> HeapResult<Arc<ClassDef>> {
        self.classes
            .read()
            .get(id.index())
            .cloned()
            .ok_or_else(|| HeapError::UnknownClass(format!("{id:?}")))
    }

    /// Look up a class by name
    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).map(|id| *id)
    }

    /// Class name for diagnostics
    pub fn class_name(&self, id: ClassId) -> String {
        self.class(id)
            .map(|def| def.name.to_string())
            .unwrap_or_else(|_| format!("{id:?}"))
    }

    /// `id` followed by its superclasses up to `Object`
    pub fn ancestors(&self, id: ClassId) -> HeapResult<Vec<ClassId>> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(class) = current {
            chain.push(class);
            current = self.class(class)?.superclass;
        }
        Ok(chain)
    }

    /// Is `id` the same as or a subclass of `ancestor`
    pub fn is_subclass_of(&self, id: ClassId, ancestor: ClassId) -> bool {
        self.ancestors(id)
            .map(|chain| chain.contains(&ancestor))
            .unwrap_or(false)
    }

    /// Named constant of an enum class
    pub fn enum_constant(&self, class: ClassId, name: &str) -> HeapResult<Value> {
        let def = self.class(class)?;
        let ordinal = def
            .constants
            .iter()
            .position(|c| c.as_ref() == name)
            .ok_or_else(|| HeapError::no_such_field(def.name.as_ref(), name))?;
        Ok(Value::Enum(EnumConstant {
            class,
            ordinal: ordinal as u32,
            name: def.constants[ordinal].clone(),
        }))
    }

    /// Instance layout, computed once per class
    pub fn layout(&self, id: ClassId) -> HeapResult<Arc<InstanceLayout>> {
        if let Some(layout) = self.layouts.get(&id) {
            return Ok(layout.clone());
        }
        let layout = Arc::new(InstanceLayout::build(self, id)?);
        Ok(self.layouts.entry(id).or_insert(layout).clone())
    }

    /// Instance fields of `id` and all its ancestors, ancestors first.
    /// Static fields are excluded.
    pub fn fields(&self, id: ClassId) -> HeapResult<Vec<FieldInfo>> {
        Ok(self.layout(id)?.fields().to_vec())
    }

    /// Read an instance field by name
    pub fn get_field(&self, obj: &ObjRef, name: &str) -> HeapResult<Value> {
        let layout = self.layout(obj.class())?;
        layout.field(name)?.accessor().get(obj)
    }

    /// Write an instance field by name
    pub fn set_field(&self, obj: &ObjRef, name: &str, value: Value) -> HeapResult<()> {
        let layout = self.layout(obj.class())?;
        layout.field(name)?.accessor().set(obj, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_builtins() {
        let registry = ClassRegistry::new();
        let builtins = *registry.builtins();
        assert_eq!(builtins.object, ClassId::OBJECT);
        assert_eq!(registry.lookup("Decimal"), Some(builtins.decimal));
        assert_eq!(
            registry.lookup("HashMap"),
            Some(builtins.container(ContainerKind::HashMap))
        );
    }

    #[test]
    fn test_builtins_have_distinct_ids() {
        let registry = ClassRegistry::new();
        let builtins = *registry.builtins();
        let mut ids: Vec<ClassId> = builtins.immutable_values().to_vec();
        ids.extend(ContainerKind::ALL.iter().map(|kind| builtins.container(*kind)));
        ids.push(builtins.object);
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);

        for kind in ContainerKind::ALL {
            let class = builtins.container(kind);
            assert_eq!(registry.lookup(kind.class_name()), Some(class));
            assert_eq!(registry.class(class).unwrap().kind(), ClassKind::Container(kind));
        }

        let user = registry.define(ClassDef::new("User")).unwrap();
        assert_eq!(user.index(), count);
    }

    #[test]
    fn test_define_rejects_duplicates_and_bad_parents() {
        let registry = ClassRegistry::new();
        let iface = registry.define(ClassDef::interface("Shape")).unwrap();
        assert!(matches!(
            registry.define(ClassDef::new("Shape")),
            Err(HeapError::DuplicateClass(_))
        ));
        assert!(matches!(
            registry.define(ClassDef::new("Circle").extends(iface)),
            Err(HeapError::InvalidDefinition { .. })
        ));
        assert!(matches!(
            registry.define(
                ClassDef::new("Twice")
                    .field(FieldDef::object("a"))
                    .field(FieldDef::object("a"))
            ),
            Err(HeapError::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_ancestry() {
        let registry = ClassRegistry::new();
        let base = registry.define(ClassDef::abstract_class("Base")).unwrap();
        let leaf = registry.define(ClassDef::new("Leaf").extends(base)).unwrap();
        assert_eq!(
            registry.ancestors(leaf).unwrap(),
            vec![leaf, base, ClassId::OBJECT]
        );
        assert!(registry.is_subclass_of(leaf, base));
        assert!(!registry.is_subclass_of(base, leaf));
    }

    #[test]
    fn test_array_classes_are_interned() {
        let registry = ClassRegistry::new();
        let a = registry
            .array_of(ArrayComponent::Primitive(PrimitiveKind::I32))
            .unwrap();
        let b = registry
            .array_of(ArrayComponent::Primitive(PrimitiveKind::I32))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.class_name(a), "i32[]");
    }

    #[test]
    fn test_enum_constants() {
        let registry = ClassRegistry::new();
        let color = registry
            .define(ClassDef::enumeration("Color", &["Red", "Green"]))
            .unwrap();
        let green = registry.enum_constant(color, "Green").unwrap();
        assert!(matches!(green, Value::Enum(ref c) if c.ordinal == 1));
        assert!(registry.enum_constant(color, "Blue").is_err());
    }
}
