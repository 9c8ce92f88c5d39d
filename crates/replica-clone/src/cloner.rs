//! Facade cloners.
//!
//! [`Cloner`] carries a full [`Policy`] and walks the whole decision list.
//! [`QuickCloner`] always runs on the fast backend and copies plain data:
//! no overrides, no self-copy, no immutability classification.

use crate::backend::{BackendKind, CopyBackend, FastBackend, auto_backend, select_backend};
use crate::config::CloneConfig;
use crate::error::{CloneError, CloneResult};
use crate::implementor::CloneImplementor;
use crate::policy::Policy;
use crate::strategy::{CloneStrategy, StrategyMode};
use crate::type_model::TypeModelCache;
use replica_heap::{ClassId, ClassRegistry, ObjRef, Value};
use std::sync::Arc;

/// Configurable deep cloner
#[derive(Debug)]
pub struct Cloner {
    strategy: CloneStrategy,
    policy: Policy,
}

impl Default for Cloner {
    fn default() -> Self {
        Self::new()
    }
}

impl Cloner {
    /// Cloner for the global registry with the best available backend
    pub fn new() -> Self {
        let models = TypeModelCache::global().clone();
        let backend = auto_backend(models.registry());
        Self::with_models(models, backend)
    }

    /// Cloner for `registry` with the best available backend
    pub fn with_registry(registry: Arc<ClassRegistry>) -> Self {
        let backend = auto_backend(&registry);
        Self::with_backend(registry, backend)
    }

    /// Cloner for `registry` on an injected backend
    pub fn with_backend(registry: Arc<ClassRegistry>, backend: Arc<dyn CopyBackend>) -> Self {
        Self::with_models(Arc::new(TypeModelCache::new(registry)), backend)
    }

    /// Cloner over an existing type model cache (e.g. one with a custom
    /// immutability detector)
    pub fn with_models(models: Arc<TypeModelCache>, backend: Arc<dyn CopyBackend>) -> Self {
        let policy = Policy::new(models.registry());
        Self {
            strategy: CloneStrategy::new(models, backend),
            policy,
        }
    }

    /// Cloner for `registry` set up from `config`
    pub fn from_config(registry: Arc<ClassRegistry>, config: &CloneConfig) -> CloneResult<Self> {
        let backend = select_backend(config.backend, &registry)?;
        let mut cloner = Self::with_backend(registry, backend);
        let policy = &mut cloner.policy;
        policy.set_clone_transient_fields(config.clone_transient_fields);
        policy.set_clone_transient_annotated_fields(config.clone_transient_annotated_fields);
        policy.set_clone_immutable_flagged(config.clone_immutable_flagged);
        policy.set_clone_synthetic_fields(config.clone_synthetic_fields);
        policy.set_use_native_clone_method(config.use_native_clone_method);
        policy.set_use_overrides(config.use_overrides);
        Ok(cloner)
    }

    /// Backend in use
    pub fn backend_kind(&self) -> BackendKind {
        self.strategy.backend().kind()
    }

    /// Registry the cloner serves
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        self.strategy.models().registry()
    }

    /// Current policy
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Policy, for configuration
    pub fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    /// Share instances of `class`
    pub fn register_immutable(&mut self, class: ClassId) -> &mut Self {
        self.policy.register_immutable(class);
        self
    }

    /// Share instances of `class` as a wrapper type
    pub fn register_known_immutable(&mut self, class: ClassId) -> &mut Self {
        self.policy.register_known_immutable(class);
        self
    }

    /// Never clone instances of `class`
    pub fn register_non_cloneable(&mut self, class: ClassId) -> &mut Self {
        self.policy.register_non_cloneable(class);
        self
    }

    /// Never clone instances of `class` or its subclasses
    pub fn register_non_cloneable_hierarchy(&mut self, class: ClassId) -> &mut Self {
        self.policy.register_non_cloneable_hierarchy(class);
        self
    }

    /// Clone instances of `class` to `Null`
    pub fn register_null_instead(&mut self, class: ClassId) -> &mut Self {
        self.policy.register_null_instead(class);
        self
    }

    /// Share this object
    pub fn register_immutable_instance(&mut self, obj: &ObjRef) -> &mut Self {
        self.policy.register_immutable_instance(obj);
        self
    }

    /// Clone instances of exactly `class` with `implementor`
    pub fn register_override(
        &mut self,
        class: ClassId,
        implementor: Arc<dyn CloneImplementor>,
    ) -> &mut Self {
        self.policy.register_override(class, implementor);
        self
    }

    /// Set whether both kinds of transient fields are cloned
    pub fn set_clone_transient(&mut self, enabled: bool) -> &mut Self {
        self.policy.set_clone_transient_fields(enabled);
        self.policy.set_clone_transient_annotated_fields(enabled);
        self
    }

    /// Set whether language-level transient fields are cloned
    pub fn set_clone_transient_fields(&mut self, enabled: bool) -> &mut Self {
        self.policy.set_clone_transient_fields(enabled);
        self
    }

    /// Set whether annotation-transient fields are cloned
    pub fn set_clone_transient_annotated_fields(&mut self, enabled: bool) -> &mut Self {
        self.policy.set_clone_transient_annotated_fields(enabled);
        self
    }

    /// Set whether detector-immutable types are cloned anyway
    pub fn set_clone_immutable_flagged(&mut self, enabled: bool) -> &mut Self {
        self.policy.set_clone_immutable_flagged(enabled);
        self
    }

    /// Set whether synthetic fields are deep-cloned rather than left at
    /// their default value
    pub fn set_clone_synthetic_fields(&mut self, enabled: bool) -> &mut Self {
        self.policy.set_clone_synthetic_fields(enabled);
        self
    }

    /// Set whether self-copy methods are used
    pub fn set_use_native_clone_method(&mut self, enabled: bool) -> &mut Self {
        self.policy.set_use_native_clone_method(enabled);
        self
    }

    /// Set whether overrides are consulted
    pub fn set_use_overrides(&mut self, enabled: bool) -> &mut Self {
        self.policy.set_use_overrides(enabled);
        self
    }

    /// Deep clone of `value`
    pub fn clone(&self, value: &Value) -> CloneResult<Value> {
        self.strategy.clone_root(value, &self.policy)
    }

    /// Deep clone of an object; `None` when policy turns it into `Null`
    pub fn clone_ref(&self, obj: &ObjRef) -> CloneResult<Option<ObjRef>> {
        Ok(self
            .clone(&Value::Ref(obj.clone()))?
            .as_object()
            .cloned())
    }

    /// New object of the same class holding `obj`'s values one level deep
    pub fn shallow_clone(&self, obj: &ObjRef) -> CloneResult<ObjRef> {
        self.strategy.shallow_clone(obj)
    }

    /// Deep-clone every field of `source` into `target`, an instance of the
    /// same class
    pub fn copy_into(&self, source: &ObjRef, target: &ObjRef) -> CloneResult<()> {
        self.strategy.copy_into(source, target, &self.policy)
    }
}

/// Zero-configuration deep cloner on the fast backend
#[derive(Debug)]
pub struct QuickCloner {
    strategy: CloneStrategy,
    policy: Policy,
}

impl QuickCloner {
    /// Quick cloner for the global registry. Fails when raw field access is
    /// unavailable.
    pub fn new() -> CloneResult<Self> {
        Self::with_models(TypeModelCache::global().clone())
    }

    /// Quick cloner for `registry`
    pub fn with_registry(registry: Arc<ClassRegistry>) -> CloneResult<Self> {
        Self::with_models(Arc::new(TypeModelCache::new(registry)))
    }

    fn with_models(models: Arc<TypeModelCache>) -> CloneResult<Self> {
        let fast = FastBackend::detect().ok_or_else(|| {
            CloneError::config("quick cloner needs raw field access, which is unavailable")
        })?;
        Ok(Self {
            strategy: CloneStrategy::with_mode(models, Arc::new(fast), StrategyMode::Minimal),
            policy: Policy::minimal(),
        })
    }

    /// Deep clone of `value`
    pub fn clone(&self, value: &Value) -> CloneResult<Value> {
        self.strategy.clone_root(value, &self.policy)
    }

    /// Deep clone of an object
    pub fn clone_ref(&self, obj: &ObjRef) -> CloneResult<ObjRef> {
        match self.clone(&Value::Ref(obj.clone()))? {
            Value::Ref(copy) => Ok(copy),
            other => Err(CloneError::config(format!(
                "quick clone produced {} for an object",
                other.type_name()
            ))),
        }
    }
}
