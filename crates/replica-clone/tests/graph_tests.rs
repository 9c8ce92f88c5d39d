//! Graph-level clone properties
//!
//! Every test runs against each available backend and, where the graph has no
//! policy concerns, against the quick cloner too.

use chrono::{FixedOffset, TimeZone};
use replica_clone::{Cloner, FastBackend, PortableBackend, QuickCloner};
use replica_heap::{
    Allocator, ArrayComponent, ClassDef, ClassId, ClassRegistry, Container, FieldDef, HashKey,
    ObjRef, PrimitiveKind, Value,
};
use std::sync::Arc;

struct Graph {
    registry: Arc<ClassRegistry>,
    alloc: Allocator,
    node: ClassId,
    holder: ClassId,
}

fn graph() -> Graph {
    let registry = ClassRegistry::new();
    let node = registry
        .define(
            ClassDef::new("Node")
                .field(FieldDef::primitive("id", PrimitiveKind::I32))
                .field(FieldDef::primitive("weight", PrimitiveKind::F64))
                .field(FieldDef::object("next"))
                .field(FieldDef::object("payload")),
        )
        .unwrap();
    let holder = registry
        .define(
            ClassDef::new("Holder")
                .field(FieldDef::primitive("count", PrimitiveKind::I32).transient())
                .field(FieldDef::object("cache").transient_annotated())
                .field(FieldDef::object("left"))
                .field(FieldDef::object("right")),
        )
        .unwrap();
    let alloc = Allocator::new(registry.clone());
    Graph {
        registry,
        alloc,
        node,
        holder,
    }
}

impl Graph {
    fn node(&self, id: i64) -> ObjRef {
        self.alloc
            .instantiate(self.node, &[("id", Value::Int(id)), ("weight", Value::Float(0.5))])
            .unwrap()
    }

    fn holder(&self, left: Value, right: Value) -> ObjRef {
        self.alloc
            .instantiate(self.holder, &[("left", left), ("right", right)])
            .unwrap()
    }

    fn get(&self, obj: &ObjRef, field: &str) -> Value {
        self.registry.get_field(obj, field).unwrap()
    }

    fn set(&self, obj: &ObjRef, field: &str, value: Value) {
        self.registry.set_field(obj, field, value).unwrap();
    }

    fn cloners(&self) -> Vec<Cloner> {
        let mut cloners = vec![Cloner::with_backend(
            self.registry.clone(),
            Arc::new(PortableBackend::new(self.registry.clone())),
        )];
        if let Some(fast) = FastBackend::detect() {
            cloners.push(Cloner::with_backend(self.registry.clone(), Arc::new(fast)));
        }
        cloners
    }

    fn quick(&self) -> Option<QuickCloner> {
        QuickCloner::with_registry(self.registry.clone()).ok()
    }
}

fn object(value: Value) -> ObjRef {
    value.as_object().cloned().expect("expected an object")
}

#[test]
fn test_two_node_cycle() {
    let g = graph();
    let x = g.node(1);
    let y = g.node(2);
    g.set(&x, "next", Value::Ref(y.clone()));
    g.set(&y, "next", Value::Ref(x.clone()));

    let mut clones: Vec<Value> = g.cloners().iter().map(|c| c.clone(&x.clone().into()).unwrap()).collect();
    if let Some(quick) = g.quick() {
        clones.push(Value::Ref(quick.clone_ref(&x).unwrap()));
    }
    for clone in clones {
        let cx = object(clone);
        assert!(!cx.ptr_eq(&x));
        let cy = object(g.get(&cx, "next"));
        assert!(!cy.ptr_eq(&y));
        assert_eq!(g.get(&cy, "next"), Value::Ref(cx.clone()));
        assert_eq!(g.get(&cx, "id"), Value::Int(1));
        assert_eq!(g.get(&cy, "id"), Value::Int(2));
    }
}

#[test]
fn test_self_reference() {
    let g = graph();
    let a = g.node(7);
    g.set(&a, "next", Value::Ref(a.clone()));
    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&a).unwrap().unwrap();
        assert!(!copy.ptr_eq(&a));
        assert_eq!(g.get(&copy, "next"), Value::Ref(copy.clone()));
    }
}

#[test]
fn test_shared_reference_cloned_once() {
    let g = graph();
    let shared = g.node(3);
    let root = g.holder(Value::Ref(shared.clone()), Value::Ref(shared.clone()));
    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&root).unwrap().unwrap();
        let left = object(g.get(&copy, "left"));
        let right = object(g.get(&copy, "right"));
        assert!(left.ptr_eq(&right));
        assert!(!left.ptr_eq(&shared));
    }
}

#[test]
fn test_clone_is_independent_of_original() {
    let g = graph();
    let a = g.node(1);
    let b = g.node(2);
    g.set(&a, "next", Value::Ref(b.clone()));
    g.set(&b, "payload", Value::string("data"));

    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&a).unwrap().unwrap();
        let copy_b = object(g.get(&copy, "next"));

        g.set(&b, "id", Value::Int(99));
        g.set(&copy, "weight", Value::Float(8.0));

        assert_eq!(g.get(&copy_b, "id"), Value::Int(2));
        assert_eq!(g.get(&copy_b, "payload"), Value::string("data"));
        assert_eq!(g.get(&a, "weight"), Value::Float(0.5));
        g.set(&b, "id", Value::Int(2));
    }
}

#[test]
fn test_transient_count_reset_when_disabled() {
    let g = graph();
    let cached = g.node(5);
    let root = g.holder(Value::Null, Value::Null);
    g.set(&root, "count", Value::Int(42));
    g.set(&root, "cache", Value::Ref(cached.clone()));

    for mut cloner in g.cloners() {
        cloner.set_clone_transient(false);
        let copy = cloner.clone_ref(&root).unwrap().unwrap();
        assert_eq!(g.get(&copy, "count"), Value::Int(0));
        assert!(g.get(&copy, "cache").is_null());

        cloner.set_clone_transient(true);
        let copy = cloner.clone_ref(&root).unwrap().unwrap();
        assert_eq!(g.get(&copy, "count"), Value::Int(42));
        let cache = object(g.get(&copy, "cache"));
        assert!(!cache.ptr_eq(&cached));
        assert_eq!(g.get(&cache, "id"), Value::Int(5));
    }
}

#[test]
fn test_transient_kinds_are_independent() {
    let g = graph();
    let root = g.holder(Value::Null, Value::Null);
    g.set(&root, "count", Value::Int(42));
    g.set(&root, "cache", Value::string("kept"));

    for mut cloner in g.cloners() {
        cloner.set_clone_transient_fields(false);
        let copy = cloner.clone_ref(&root).unwrap().unwrap();
        assert_eq!(g.get(&copy, "count"), Value::Int(0));
        assert_eq!(g.get(&copy, "cache"), Value::string("kept"));
    }
}

#[test]
fn test_quick_cloner_keeps_transient_fields() {
    let g = graph();
    let Some(quick) = g.quick() else {
        return;
    };
    let root = g.holder(Value::Null, Value::Null);
    g.set(&root, "count", Value::Int(42));
    g.set(&root, "cache", Value::Ref(g.node(1)));
    let copy = quick.clone_ref(&root).unwrap();
    assert_eq!(g.get(&copy, "count"), Value::Int(42));
    assert!(!g.get(&copy, "cache").is_null());
}

#[test]
fn test_object_array_keeps_sharing() {
    let g = graph();
    let a = g.node(1);
    let b = g.node(2);
    let array = g
        .alloc
        .new_array(
            ArrayComponent::Reference(g.node),
            vec![Value::Ref(a.clone()), Value::Ref(b.clone()), Value::Ref(a.clone())],
        )
        .unwrap();

    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&array).unwrap().unwrap();
        assert!(!copy.ptr_eq(&array));
        assert_eq!(copy.class(), array.class());
        assert_eq!(copy.array_len(), Some(3));
        let first = object(copy.array_get(0).unwrap());
        let second = object(copy.array_get(1).unwrap());
        let third = object(copy.array_get(2).unwrap());
        assert!(first.ptr_eq(&third));
        assert!(!first.ptr_eq(&second));
        assert!(!first.ptr_eq(&a));
        assert!(!second.ptr_eq(&b));
    }
}

#[test]
fn test_array_containing_itself() {
    let g = graph();
    let array = g
        .alloc
        .new_array(ArrayComponent::Reference(ClassId::OBJECT), vec![Value::Null; 2])
        .unwrap();
    array.array_set(0, Value::Ref(array.clone())).unwrap();
    array.array_set(1, Value::Int(4)).unwrap();

    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&array).unwrap().unwrap();
        assert_eq!(copy.array_get(0).unwrap(), Value::Ref(copy.clone()));
        assert_eq!(copy.array_get(1).unwrap(), Value::Int(4));
    }
}

#[test]
fn test_primitive_array_by_value() {
    let g = graph();
    let array = g
        .alloc
        .new_array(
            ArrayComponent::Primitive(PrimitiveKind::I64),
            (0..16).map(Value::Int).collect(),
        )
        .unwrap();

    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&array).unwrap().unwrap();
        assert!(!copy.ptr_eq(&array));
        array.array_set(3, Value::Int(-1)).unwrap();
        assert_eq!(copy.array_get(3).unwrap(), Value::Int(3));
        assert_eq!(copy.array_get(15).unwrap(), Value::Int(15));
        array.array_set(3, Value::Int(3)).unwrap();
    }
}

#[test]
fn test_immutable_values_pass_through() {
    let g = graph();
    let color = g
        .registry
        .define(ClassDef::enumeration("Color", &["Red", "Green"]))
        .unwrap();
    let red = g.registry.enum_constant(color, "Red").unwrap();
    let decimal = g.alloc.allocate(g.registry.builtins().decimal).unwrap();

    for cloner in g.cloners() {
        assert_eq!(cloner.clone(&Value::Null).unwrap(), Value::Null);
        assert_eq!(cloner.clone(&Value::Int(5)).unwrap(), Value::Int(5));
        assert_eq!(cloner.clone(&Value::string("s")).unwrap(), Value::string("s"));
        assert_eq!(cloner.clone(&red).unwrap(), red);
        let copy = cloner.clone_ref(&decimal).unwrap().unwrap();
        assert!(copy.ptr_eq(&decimal));
    }
}

#[test]
fn test_containers_rebuilt_with_shared_elements() {
    let g = graph();
    let a = g.node(1);
    let list = g
        .alloc
        .new_list(vec![Value::Ref(a.clone()), Value::Ref(a.clone()), Value::string("s")])
        .unwrap();
    let map = g
        .alloc
        .new_hash_map(vec![(Value::string("k"), Value::Ref(a.clone()))])
        .unwrap();
    let root = g.holder(Value::Ref(list.clone()), Value::Ref(map.clone()));

    for mut cloner in g.cloners() {
        for overrides in [true, false] {
            cloner.set_use_overrides(overrides);
            let copy = cloner.clone_ref(&root).unwrap().unwrap();

            let list_copy = object(g.get(&copy, "left"));
            assert!(!list_copy.ptr_eq(&list));
            let Some(Container::List(items)) = list_copy.container() else {
                panic!("expected a list");
            };
            assert_eq!(items.len(), 3);
            let a_copy = object(items[0].clone());
            assert!(!a_copy.ptr_eq(&a));
            assert_eq!(items[1], Value::Ref(a_copy.clone()));
            assert_eq!(items[2], Value::string("s"));

            let map_copy = object(g.get(&copy, "right"));
            let Some(Container::HashMap(entries)) = map_copy.container() else {
                panic!("expected a map");
            };
            assert_eq!(
                entries.get(&HashKey::Str("k".into())),
                Some(&Value::Ref(a_copy))
            );
        }
    }
}

#[test]
fn test_container_holding_itself() {
    let g = graph();
    let list = g.alloc.new_list(Vec::new()).unwrap();
    list.with_container(|c| {
        if let Container::List(items) = c {
            items.push(Value::Ref(list.clone()));
        }
    })
    .unwrap();

    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&list).unwrap().unwrap();
        let Some(Container::List(items)) = copy.container() else {
            panic!("expected a list");
        };
        assert_eq!(items, vec![Value::Ref(copy.clone())]);
    }
}

#[test]
fn test_set_and_tree_map_keys_are_cloned() {
    let g = graph();
    let key = g.node(1);
    let set = g.alloc.new_hash_set(vec![Value::Ref(key.clone())]).unwrap();
    let tree = g
        .alloc
        .new_tree_map(vec![(Value::Int(1), Value::Ref(key.clone()))])
        .unwrap();
    let root = g.holder(Value::Ref(set), Value::Ref(tree));

    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&root).unwrap().unwrap();
        let Some(Container::HashSet(keys)) = object(g.get(&copy, "left")).container() else {
            panic!("expected a set");
        };
        let Some(Container::TreeMap(entries)) = object(g.get(&copy, "right")).container() else {
            panic!("expected a tree map");
        };
        let key_copy = keys.iter().next().map(HashKey::to_value).unwrap();
        assert_ne!(key_copy, Value::Ref(key.clone()));
        assert_eq!(entries.get(&HashKey::Int(1)), Some(&key_copy));
    }
}

#[test]
fn test_calendar_is_copied_not_shared() {
    let g = graph();
    let at = FixedOffset::east_opt(3600)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 1, 12, 30, 0)
        .unwrap();
    let calendar = g.alloc.new_calendar(at).unwrap();

    for cloner in g.cloners() {
        let copy = cloner.clone_ref(&calendar).unwrap().unwrap();
        assert!(!copy.ptr_eq(&calendar));
        let Some(Container::Calendar(copied)) = copy.container() else {
            panic!("expected a calendar");
        };
        assert_eq!(copied, at);
    }
}

#[test]
fn test_backends_agree() {
    let g = graph();
    let a = g.node(1);
    let b = g.node(2);
    g.set(&a, "next", Value::Ref(b.clone()));
    g.set(&b, "payload", Value::Float(2.5));
    let root = g.holder(Value::Ref(a.clone()), Value::Ref(b.clone()));
    g.set(&root, "count", Value::Int(11));

    let snapshots: Vec<_> = g
        .cloners()
        .iter()
        .map(|cloner| {
            let copy = cloner.clone_ref(&root).unwrap().unwrap();
            let left = object(g.get(&copy, "left"));
            let right = object(g.get(&copy, "right"));
            (
                g.get(&copy, "count"),
                g.get(&left, "id"),
                g.get(&left, "weight"),
                g.get(&left, "next") == Value::Ref(right.clone()),
                g.get(&right, "payload"),
            )
        })
        .collect();
    for snapshot in &snapshots {
        assert_eq!(snapshot, &snapshots[0]);
    }
}

#[test]
fn test_concurrent_clones_share_one_cloner() {
    let g = graph();
    let a = g.node(1);
    let b = g.node(2);
    g.set(&a, "next", Value::Ref(b.clone()));
    g.set(&b, "next", Value::Ref(a.clone()));
    let cloner = Cloner::with_registry(g.registry.clone());

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let copy = cloner.clone_ref(&a).unwrap().unwrap();
                    let next = object(g.registry.get_field(&copy, "next").unwrap());
                    assert_eq!(
                        g.registry.get_field(&next, "next").unwrap(),
                        Value::Ref(copy.clone())
                    );
                }
            });
        }
    });
}
