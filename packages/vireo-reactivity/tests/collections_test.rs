use std::cell::Cell;
use std::rc::Rc;
use vireo_reactivity::{effect, is_reactive, reactive, readonly, EffectOptions, Proxy, Target, Value};

fn proxy(value: Value) -> Proxy {
    value.as_proxy().cloned().expect("container wrapper")
}

fn watch_runs(f: impl Fn() + 'static) -> Rc<Cell<u32>> {
    let runs = Rc::new(Cell::new(0));
    let counted = runs.clone();
    effect(
        move || {
            counted.set(counted.get() + 1);
            f();
        },
        EffectOptions::default(),
    );
    runs
}

#[test]
fn test_map_triggers_by_operation() {
    let map = proxy(reactive(Target::map([("a", 1)])));

    let get_runs = watch_runs({
        let map = map.clone();
        move || {
            map.map_get("a");
        }
    });
    let size_runs = watch_runs({
        let map = map.clone();
        move || {
            map.size();
        }
    });
    let key_runs = watch_runs({
        let map = map.clone();
        move || {
            map.keys();
        }
    });

    // Value change: key readers and size readers, never pure key iteration.
    map.map_set("a", 2);
    assert_eq!((get_runs.get(), size_runs.get(), key_runs.get()), (2, 2, 1));

    map.map_set("b", 3);
    assert_eq!((get_runs.get(), size_runs.get(), key_runs.get()), (2, 3, 2));

    assert!(map.collection_delete("a"));
    assert_eq!((get_runs.get(), size_runs.get(), key_runs.get()), (3, 4, 3));
    assert!(!map.collection_delete("a"));

    map.clear();
    assert_eq!((get_runs.get(), size_runs.get(), key_runs.get()), (4, 5, 4));
    assert_eq!(map.size(), 0);

    // Clearing an empty map notifies nobody.
    map.clear();
    assert_eq!(size_runs.get(), 5);
}

#[test]
fn test_map_wraps_values_and_accepts_wrapped_keys() {
    let key = Target::object([("id", 1)]);
    let value = Target::object([("v", 1)]);
    let map = proxy(reactive(Target::map([(
        Value::Target(key.clone()),
        Value::Target(value),
    )])));

    let wrapped_key = reactive(key.clone());
    let found = map.map_get(wrapped_key.clone());
    assert!(is_reactive(&found));
    assert!(map.collection_has(wrapped_key));
    assert_eq!(map.entries().len(), 1);
    assert!(map.values().iter().all(is_reactive));
}

#[test]
fn test_set_add_and_for_each() {
    let set = proxy(reactive(Target::set([1, 2])));
    let has_runs = watch_runs({
        let set = set.clone();
        move || {
            set.collection_has(3);
        }
    });

    set.add(3);
    assert_eq!(has_runs.get(), 2);
    // Already present.
    set.add(3);
    assert_eq!(has_runs.get(), 2);

    let mut seen = Vec::new();
    set.for_each(|value, key| {
        assert_eq!(value, key);
        seen.push(value);
    });
    assert_eq!(seen, vec![Value::from(1), Value::from(2), Value::from(3)]);
}

#[test]
fn test_weak_map_requires_object_keys_and_forgets_dropped_ones() {
    let map = proxy(reactive(Target::weak_map()));
    let key = Target::empty_object();

    map.map_set(Value::Target(key.clone()), 1);
    assert_eq!(map.map_get(Value::Target(key.clone())), Value::from(1));

    map.map_set("not an object", 1);
    assert!(!map.collection_has("not an object"));

    drop(key);
    assert!(!map.collection_has(Value::Target(Target::empty_object())));
    assert_eq!(map.target().raw_len(), 0);
}

#[test]
fn test_weak_set_membership() {
    let set = proxy(reactive(Target::weak_set()));
    let member = Target::empty_object();
    set.add(Value::Target(member.clone()));
    assert!(set.collection_has(Value::Target(member.clone())));
    assert!(set.collection_delete(Value::Target(member)));
    assert_eq!(set.size(), 0);
}

#[test]
fn test_readonly_collection_rejects_mutation() {
    let map = proxy(readonly(Target::map([("a", 1)])));
    map.map_set("a", 2);
    map.clear();
    assert!(!map.collection_delete("a"));
    assert_eq!(map.map_get("a"), Value::from(1));
    assert_eq!(map.size(), 1);
}

#[test]
fn test_readonly_view_of_reactive_map_tracks() {
    let state = reactive(Target::map([("a", 1)]));
    let view = proxy(readonly(state.clone()));
    let runs = watch_runs({
        let view = view.clone();
        move || {
            view.map_get("a");
        }
    });
    proxy(state).map_set("a", 2);
    assert_eq!(runs.get(), 2);
    assert_eq!(view.map_get("a"), Value::from(2));
}
