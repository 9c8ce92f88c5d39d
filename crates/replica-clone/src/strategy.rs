//! The clone strategy: the per-object decision list and recursive traversal.
//!
//! Decisions are taken in strict priority order:
//!
//! 1. `Null` clones to `Null`
//! 2. an object already in the identity map resolves to its clone
//! 3. boxed primitives, strings and enum constants are returned as-is
//! 4. policy-shared classes are returned as-is, null-instead classes become `Null`
//! 5. registered immutable instances are returned as-is
//! 6. a registered override for the exact class takes over
//! 7. detector-immutable and non-cloneable types are returned as-is
//! 8. a named implementor on the class takes over
//! 9. a self-copy method takes over when native cloning is enabled
//! 10. arrays are duplicated (primitive arrays in bulk)
//! 11. anything else is allocated bare, registered, then filled field by field
//!
//! Every path that produces a new object records it in the identity map
//! before returning, whether or not a delegate did so itself.

use crate::backend::CopyBackend;
use crate::containers;
use crate::error::{CloneError, CloneResult};
use crate::implementor::{CloneContext, CloneImplementor, resolve_implementor};
use crate::policy::Policy;
use crate::type_model::{Classification, TypeModel, TypeModelCache};
use dashmap::DashMap;
use replica_heap::object::tags;
use replica_heap::{Category, ClassId, HeapError, ObjRef, ObjectBody, Value};
use std::sync::Arc;

/// How much of the decision list is consulted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyMode {
    /// Every step
    Full,
    /// Identity, immediates, arrays and field copying only
    Minimal,
}

/// Recursive clone algorithm over one backend and one type model cache
pub struct CloneStrategy {
    backend: Arc<dyn CopyBackend>,
    models: Arc<TypeModelCache>,
    mode: StrategyMode,
    /// Named implementors, resolved once per class
    implementors: DashMap<ClassId, Arc<dyn CloneImplementor>>,
}

impl CloneStrategy {
    /// Strategy consulting the full decision list
    pub fn new(models: Arc<TypeModelCache>, backend: Arc<dyn CopyBackend>) -> Self {
        Self::with_mode(models, backend, StrategyMode::Full)
    }

    /// Strategy with an explicit mode
    pub fn with_mode(
        models: Arc<TypeModelCache>,
        backend: Arc<dyn CopyBackend>,
        mode: StrategyMode,
    ) -> Self {
        Self {
            backend,
            models,
            mode,
            implementors: DashMap::new(),
        }
    }

    /// Active backend
    pub fn backend(&self) -> &dyn CopyBackend {
        self.backend.as_ref()
    }

    /// Type model cache
    pub fn models(&self) -> &Arc<TypeModelCache> {
        &self.models
    }

    /// Mode
    pub fn mode(&self) -> StrategyMode {
        self.mode
    }

    /// Clone `value` under `policy` with a fresh identity map
    pub fn clone_root(&self, value: &Value, policy: &Policy) -> CloneResult<Value> {
        let mut cx = CloneContext::new(self, policy);
        let clone = cx.clone_value(value)?;
        tracing::trace!(objects = cx.visited(), "clone finished");
        Ok(clone)
    }

    /// Deep-copy every field of `source` into the existing `target` of the
    /// same class, under `policy`. References back to `source` resolve to
    /// `target`.
    pub fn copy_into(&self, source: &ObjRef, target: &ObjRef, policy: &Policy) -> CloneResult<()> {
        if source.ptr_eq(target) {
            return Ok(());
        }
        if source.class() != target.class() {
            return Err(CloneError::config(format!(
                "cannot copy {} into {}",
                self.class_name(source.class()),
                self.class_name(target.class())
            )));
        }
        if source.header().tag() != tags::INSTANCE || target.header().tag() != tags::INSTANCE {
            return Err(CloneError::config(format!(
                "copy into {} needs field-bearing instances",
                self.class_name(source.class())
            )));
        }
        let model = self.models.get(source.class())?;
        let mut cx = CloneContext::new(self, policy);
        cx.register(source, Value::Ref(target.clone()));
        self.copy_fields(source, target, &model, &mut cx)
    }

    /// One-level copy of `source`: a new object of the same class whose
    /// fields, elements or entries are the source's values, not clones.
    pub fn shallow_clone(&self, source: &ObjRef) -> CloneResult<ObjRef> {
        let class = source.class();
        match source.header().tag() {
            tags::PRIM_ARRAY => self.backend.duplicate_prim_array(source),
            tags::REF_ARRAY => {
                let items = self.ref_array_items(source)?;
                let copy = self.backend.allocate_ref_array(class, items.len())?;
                for (index, item) in items.into_iter().enumerate() {
                    self.backend.write_element(&copy, index, item)?;
                }
                Ok(copy)
            }
            tags::CONTAINER => {
                let model = self.models.get(class)?;
                let copy = self.backend.allocate(&model)?;
                let contents_error =
                    |err| CloneError::access(model.name().as_ref(), "<contents>", copy.addr(), err);
                let contents = source.container().ok_or_else(|| {
                    contents_error(HeapError::WrongBody {
                        class: model.name().to_string(),
                        expected: "container",
                    })
                })?;
                copy.with_container(|c| *c = contents)
                    .map_err(contents_error)?;
                Ok(copy)
            }
            _ => {
                let model = self.models.get(class)?;
                let copy = self.backend.allocate(&model)?;
                let bulk = self.backend.copy_primitive_block(source, &copy)?;
                for field in model.fields() {
                    if field.category == Category::Primitive && bulk {
                        continue;
                    }
                    self.backend.copy_field(source, &copy, field, None)?;
                }
                Ok(copy)
            }
        }
    }

    /// Clone one value, consulting and extending `cx`'s identity map
    pub(crate) fn clone_value(&self, value: &Value, cx: &mut CloneContext<'_>) -> CloneResult<Value> {
        let obj = match value {
            Value::Null => return Ok(Value::Null),
            Value::Ref(obj) => obj,
            // Boxed primitives, strings and enum constants
            immediate => return Ok(immediate.clone()),
        };
        if let Some(clone) = cx.lookup(obj) {
            return Ok(clone);
        }

        let class = obj.class();
        let policy = cx.policy();
        let full = self.mode == StrategyMode::Full;

        if full {
            if policy.nulls_class(class) {
                return Ok(Value::Null);
            }
            if policy.shares_class(self.models.registry(), class)
                || policy.is_immutable_instance(obj)
            {
                return Ok(value.clone());
            }
            if policy.use_overrides() {
                if let Some(implementor) = policy.override_for(class).cloned() {
                    return self.delegate(obj, implementor.as_ref(), cx);
                }
            }
        }

        let model = self.models.get(class)?;

        if full {
            match model.classification() {
                Classification::NonCloneable => return Ok(value.clone()),
                Classification::Immutable if !policy.clone_immutable_flagged() => {
                    return Ok(value.clone());
                }
                _ => {}
            }
            if let Some(name) = model.clone_with() {
                let implementor = self.named_implementor(&model, name)?;
                return self.delegate(obj, implementor.as_ref(), cx);
            }
            if let Some(self_copy) = model.self_copy().filter(|_| policy.use_native_clone_method()) {
                let copy = self_copy(obj)
                    .map_err(|err| CloneError::delegate(model.name().as_ref(), err))?;
                let copy = Value::Ref(copy);
                cx.register(obj, copy.clone());
                tracing::trace!(class = %model.name(), "cloned via self-copy");
                return Ok(copy);
            }
        }

        match obj.header().tag() {
            tags::PRIM_ARRAY => {
                let copy = Value::Ref(self.backend.duplicate_prim_array(obj)?);
                cx.register(obj, copy.clone());
                Ok(copy)
            }
            tags::REF_ARRAY => self.clone_ref_array(obj, cx),
            tags::CONTAINER => containers::clone_container(obj, cx),
            _ => {
                let target = self.backend.allocate(&model)?;
                cx.register(obj, Value::Ref(target.clone()));
                self.copy_fields(obj, &target, &model, cx)?;
                tracing::trace!(class = %model.name(), "cloned object");
                Ok(Value::Ref(target))
            }
        }
    }

    /// Fill `target` from `source` field by field
    pub(crate) fn copy_fields(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        model: &TypeModel,
        cx: &mut CloneContext<'_>,
    ) -> CloneResult<()> {
        let policy = cx.policy();
        let clone_transient = policy.clone_transient_fields();
        let clone_transient_annotated = policy.clone_transient_annotated_fields();
        let clone_synthetic = policy.clone_synthetic_fields();

        let bulk = self.backend.copy_primitive_block(source, target)?;
        for field in model.fields() {
            if (field.is_transient && !clone_transient)
                || (field.is_transient_annotated && !clone_transient_annotated)
                || (field.is_synthetic && !clone_synthetic)
            {
                self.backend.reset_field(target, field)?;
                continue;
            }
            if field.category == Category::Primitive {
                if !bulk {
                    self.backend.copy_primitive(source, target, field)?;
                }
                continue;
            }
            let value = self.backend.read_field(source, field)?;
            let value = cx.clone_value(&value)?;
            self.backend.copy_field(source, target, field, Some(value))?;
        }
        Ok(())
    }

    fn clone_ref_array(&self, source: &ObjRef, cx: &mut CloneContext<'_>) -> CloneResult<Value> {
        let items = self.ref_array_items(source)?;
        let copy = self.backend.allocate_ref_array(source.class(), items.len())?;
        cx.register(source, Value::Ref(copy.clone()));
        for (index, item) in items.iter().enumerate() {
            let clone = cx.clone_value(item)?;
            self.backend.write_element(&copy, index, clone)?;
        }
        tracing::trace!(class = ?source.class(), len = items.len(), "cloned array");
        Ok(Value::Ref(copy))
    }

    fn ref_array_items(&self, source: &ObjRef) -> CloneResult<Vec<Value>> {
        match &*source.body() {
            ObjectBody::RefArray(items) => Ok(items.clone()),
            _ => Err(CloneError::access(
                self.class_name(source.class()),
                "[]",
                source.addr(),
                HeapError::WrongBody {
                    class: self.class_name(source.class()),
                    expected: "reference array",
                },
            )),
        }
    }

    fn delegate(
        &self,
        source: &ObjRef,
        implementor: &dyn CloneImplementor,
        cx: &mut CloneContext<'_>,
    ) -> CloneResult<Value> {
        let clone = implementor
            .clone_object(source, cx)
            .map_err(|err| match err {
                CloneError::Heap(heap) => CloneError::Delegate {
                    class: self.class_name(source.class()),
                    source: Box::new(heap),
                },
                other => other,
            })?;
        if !cx.is_registered(source) {
            cx.register(source, clone.clone());
        }
        Ok(clone)
    }

    fn named_implementor(
        &self,
        model: &TypeModel,
        name: &str,
    ) -> CloneResult<Arc<dyn CloneImplementor>> {
        if let Some(implementor) = self.implementors.get(&model.class()) {
            return Ok(implementor.clone());
        }
        let implementor = resolve_implementor(name).ok_or_else(|| {
            CloneError::config(format!(
                "{} names unknown clone implementor '{name}'",
                model.name()
            ))
        })?;
        tracing::debug!(class = %model.name(), implementor = name, "resolved clone implementor");
        Ok(self
            .implementors
            .entry(model.class())
            .or_insert(implementor)
            .clone())
    }

    fn class_name(&self, class: ClassId) -> String {
        self.models.registry().class_name(class)
    }
}

impl std::fmt::Debug for CloneStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloneStrategy")
            .field("backend", &self.backend.kind())
            .field("mode", &self.mode)
            .field("models", &self.models.len())
            .finish()
    }
}
