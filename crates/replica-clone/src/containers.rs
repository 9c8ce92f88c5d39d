//! Logical rebuild of built-in containers.
//!
//! A container clone is a fresh container of the same class holding the
//! clones of the source's elements (and keys), inserted in source order. The
//! internal representation is never copied.

use crate::error::{CloneError, CloneResult};
use crate::implementor::CloneContext;
use replica_heap::{Container, HashKey, HeapError, ObjRef, Value};

/// Clone a container object through `cx`
pub(crate) fn clone_container(source: &ObjRef, cx: &mut CloneContext<'_>) -> CloneResult<Value> {
    let model = cx.model(source.class())?;
    let contents_error = |object: &ObjRef, err: HeapError| {
        CloneError::access(model.name().as_ref(), "<contents>", object.addr(), err)
    };
    let snapshot = source.container().ok_or_else(|| {
        contents_error(
            source,
            HeapError::WrongBody {
                class: model.name().to_string(),
                expected: "container",
            },
        )
    })?;

    let target = cx.backend().allocate(&model)?;
    cx.register(source, Value::Ref(target.clone()));

    let rebuilt = match snapshot {
        Container::List(items) => Container::List(clone_all(items, cx)?),
        Container::Linked(items) => Container::Linked(clone_all(items, cx)?.into()),
        Container::HashSet(set) => {
            let mut out = Vec::with_capacity(set.len());
            for key in set {
                out.push(clone_key(&key, cx)?);
            }
            Container::HashSet(out.into_iter().collect())
        }
        Container::HashMap(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, value) in map {
                out.push((clone_key(&key, cx)?, cx.clone_value(&value)?));
            }
            Container::HashMap(out.into_iter().collect())
        }
        Container::TreeMap(map) => {
            let mut out = Vec::with_capacity(map.len());
            for (key, value) in map {
                out.push((clone_key(&key, cx)?, cx.clone_value(&value)?));
            }
            Container::TreeMap(out.into_iter().collect())
        }
        Container::Calendar(at) => Container::Calendar(at),
    };

    let len = rebuilt.len();
    target
        .with_container(|contents| *contents = rebuilt)
        .map_err(|err| contents_error(&target, err))?;
    tracing::trace!(class = %model.name(), len, "rebuilt container");
    Ok(Value::Ref(target))
}

fn clone_all<I>(items: I, cx: &mut CloneContext<'_>) -> CloneResult<Vec<Value>>
where
    I: IntoIterator<Item = Value>,
{
    items.into_iter().map(|item| cx.clone_value(&item)).collect()
}

fn clone_key(key: &HashKey, cx: &mut CloneContext<'_>) -> CloneResult<HashKey> {
    Ok(HashKey::from_value(cx.clone_value(&key.to_value())?))
}
