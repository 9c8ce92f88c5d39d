//! Clone implementors: per-class routines that replace field-by-field copying.
//!
//! An implementor receives the source object and a [`CloneContext`] through
//! which it clones nested values, allocates, and records its result in the
//! identity map. The strategy registers whatever an implementor returns, so
//! an implementor that forgets to register cannot break cycles.
//!
//! Implementors named on a class (`ClassDef::clone_with`) are resolved from a
//! process-wide catalog of factories, once per class.

use crate::backend::CopyBackend;
use crate::containers;
use crate::error::{CloneError, CloneResult};
use crate::identity::IdentityMap;
use crate::policy::Policy;
use crate::strategy::CloneStrategy;
use crate::type_model::TypeModel;
use dashmap::DashMap;
use replica_heap::object::tags;
use replica_heap::{ClassId, ClassRegistry, HeapError, ObjRef, Value};
use std::sync::{Arc, OnceLock};

/// Custom clone routine for one class
pub trait CloneImplementor: Send + Sync {
    /// Produce the clone of `source`. Nested values go through
    /// [`CloneContext::clone_value`]; new objects should be registered with
    /// [`CloneContext::register`] before their fields are cloned.
    fn clone_object(&self, source: &ObjRef, cx: &mut CloneContext<'_>) -> CloneResult<Value>;
}

impl<F> CloneImplementor for F
where
    F: Fn(&ObjRef, &mut CloneContext<'_>) -> CloneResult<Value> + Send + Sync,
{
    fn clone_object(&self, source: &ObjRef, cx: &mut CloneContext<'_>) -> CloneResult<Value> {
        self(source, cx)
    }
}

/// State of one clone operation, handed to implementors
pub struct CloneContext<'a> {
    strategy: &'a CloneStrategy,
    policy: &'a Policy,
    identity: IdentityMap,
}

impl<'a> CloneContext<'a> {
    pub(crate) fn new(strategy: &'a CloneStrategy, policy: &'a Policy) -> Self {
        Self {
            strategy,
            policy,
            identity: IdentityMap::new(),
        }
    }

    /// Clone a nested value with the full strategy
    pub fn clone_value(&mut self, value: &Value) -> CloneResult<Value> {
        let strategy = self.strategy;
        strategy.clone_value(value, self)
    }

    /// Deep-copy every field of `source` into `target` under the current
    /// policy. Both must be field-bearing instances of the same class;
    /// arrays and containers are rejected.
    pub fn clone_fields(&mut self, source: &ObjRef, target: &ObjRef) -> CloneResult<()> {
        let strategy = self.strategy;
        let model = strategy.models().get(source.class())?;
        for obj in [source, target] {
            if obj.header().tag() != tags::INSTANCE {
                return Err(CloneError::access(
                    model.name().as_ref(),
                    "<fields>",
                    obj.addr(),
                    HeapError::WrongBody {
                        class: self.registry().class_name(obj.class()),
                        expected: "instance",
                    },
                ));
            }
        }
        if source.class() != target.class() {
            return Err(CloneError::config(format!(
                "cannot clone fields of {} into {}",
                model.name(),
                self.registry().class_name(target.class())
            )));
        }
        strategy.copy_fields(source, target, &model, self)
    }

    /// Record `clone` as the clone of `source`
    pub fn register(&mut self, source: &ObjRef, clone: Value) {
        self.identity.insert(source, clone);
    }

    /// Clone already produced for `source`
    pub fn lookup(&self, source: &ObjRef) -> Option<Value> {
        self.identity.get(source)
    }

    /// Has `source` been cloned or registered
    pub fn is_registered(&self, source: &ObjRef) -> bool {
        self.identity.contains(source)
    }

    /// Bare instance of `class` from the active backend
    pub fn allocate(&self, class: ClassId) -> CloneResult<ObjRef> {
        let model = self.model(class)?;
        self.strategy.backend().allocate(&model)
    }

    /// Type model of `class`
    pub fn model(&self, class: ClassId) -> CloneResult<Arc<TypeModel>> {
        self.strategy.models().get(class)
    }

    /// Active backend
    pub fn backend(&self) -> &dyn CopyBackend {
        self.strategy.backend()
    }

    /// Registry the graph belongs to
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        self.strategy.models().registry()
    }

    /// Policy of this operation
    pub fn policy(&self) -> &'a Policy {
        self.policy
    }

    /// Objects visited so far
    pub fn visited(&self) -> usize {
        self.identity.len()
    }
}

/// Rebuilds a built-in container from its logical contents
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerImplementor;

impl CloneImplementor for ContainerImplementor {
    fn clone_object(&self, source: &ObjRef, cx: &mut CloneContext<'_>) -> CloneResult<Value> {
        containers::clone_container(source, cx)
    }
}

/// Factory producing an implementor instance
pub type ImplementorFactory = fn() -> Arc<dyn CloneImplementor>;

/// Catalog name of [`ContainerImplementor`]
pub const CONTAINER_IMPLEMENTOR: &str = "containers";

static CATALOG: OnceLock<DashMap<Arc<str>, ImplementorFactory>> = OnceLock::new();

fn catalog() -> &'static DashMap<Arc<str>, ImplementorFactory> {
    CATALOG.get_or_init(|| {
        let catalog: DashMap<Arc<str>, ImplementorFactory> = DashMap::new();
        catalog.insert(CONTAINER_IMPLEMENTOR.into(), || Arc::new(ContainerImplementor));
        catalog
    })
}

/// Make `factory` available under `name` for `ClassDef::clone_with`.
/// A later registration under the same name replaces the earlier one.
pub fn register_implementor(name: impl Into<Arc<str>>, factory: ImplementorFactory) {
    let name = name.into();
    tracing::debug!(implementor = %name, "registered clone implementor factory");
    catalog().insert(name, factory);
}

/// New implementor instance for `name`
pub fn resolve_implementor(name: &str) -> Option<Arc<dyn CloneImplementor>> {
    catalog().get(name).map(|factory| factory())
}
