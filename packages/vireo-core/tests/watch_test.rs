use std::cell::{Cell, RefCell};
use std::rc::Rc;
use vireo_core::{
    traverse, watch, watch_effect, watch_post_effect, watch_sync_effect, FlushMode, OnCleanup,
    WatchOptions, WatchSource,
};
use vireo_reactivity::{
    computed, create_ref, create_shallow_ref, reactive, trigger_ref, EffectScope, Target, Value,
};
use vireo_scheduler::{run_microtasks, set_error_handler, set_warn_handler, ErrorCode};

type Calls = Rc<RefCell<Vec<(Value, Value)>>>;

fn recorder(calls: &Calls) -> impl Fn(&Value, &Value, &OnCleanup) + 'static {
    let calls = calls.clone();
    move |new, old, _| calls.borrow_mut().push((new.clone(), old.clone()))
}

fn items(value: &Value) -> Vec<Value> {
    value
        .as_target()
        .map(|t| t.values_raw())
        .unwrap_or_default()
}

#[test]
fn test_watch_ref_fires_once_after_flush() {
    let count = create_ref(1);
    let calls = Calls::default();
    watch(&count, recorder(&calls), WatchOptions::default());
    assert!(calls.borrow().is_empty());

    count.set(2);
    assert!(calls.borrow().is_empty());
    run_microtasks();
    assert_eq!(*calls.borrow(), vec![(Value::from(2), Value::from(1))]);
}

#[test]
fn test_immediate_reports_undefined_old_value() {
    let count = create_ref(1);
    let calls = Calls::default();
    watch(&count, recorder(&calls), WatchOptions::default().immediate());
    assert_eq!(*calls.borrow(), vec![(Value::from(1), Value::Undefined)]);
}

#[test]
fn test_unchanged_value_does_not_fire() {
    let count = create_ref(1);
    let calls = Calls::default();
    watch(&count, recorder(&calls), WatchOptions::default());
    count.set(1);
    run_microtasks();
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_changes_in_one_turn_are_batched() {
    let count = create_ref(1);
    let calls = Calls::default();
    watch(&count, recorder(&calls), WatchOptions::default());
    count.set(2);
    count.set(3);
    run_microtasks();
    assert_eq!(*calls.borrow(), vec![(Value::from(3), Value::from(1))]);
}

#[test]
fn test_getter_source() {
    let state = reactive(Target::object([("a", 1), ("b", 2)]));
    let calls = Calls::default();
    let sum = {
        let state = state.clone();
        WatchSource::getter(move || {
            state.get("a").as_f64().unwrap_or(0.0) + state.get("b").as_f64().unwrap_or(0.0)
        })
    };
    watch(sum, recorder(&calls), WatchOptions::default());

    state.set("a", 5);
    run_microtasks();
    assert_eq!(*calls.borrow(), vec![(Value::from(7), Value::from(3))]);
}

#[test]
fn test_computed_source() {
    let base = create_ref(1);
    let doubled = {
        let base = base.clone();
        computed(move || base.get().as_f64().unwrap_or(0.0) * 2.0)
    };
    let calls = Calls::default();
    watch(&doubled, recorder(&calls), WatchOptions::default());

    base.set(2);
    run_microtasks();
    assert_eq!(*calls.borrow(), vec![(Value::from(4), Value::from(2))]);
}

#[test]
fn test_reactive_source_is_watched_deeply() {
    let state = reactive(Target::object([("nested", Target::object([("n", 1)]))]));
    let fired = Rc::new(Cell::new(0));
    {
        let fired = fired.clone();
        watch(
            state.clone(),
            move |new, old, _| {
                // Same object on both sides for in-place mutation.
                assert_eq!(new, old);
                fired.set(fired.get() + 1);
            },
            WatchOptions::default(),
        );
    }

    state.get("nested").set("n", 2);
    run_microtasks();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_deep_option_tracks_nested_reads() {
    let state = reactive(Target::object([("nested", Target::object([("n", 1)]))]));
    let shallow_fired = Rc::new(Cell::new(0));
    let deep_fired = Rc::new(Cell::new(0));
    for (fired, options) in [
        (shallow_fired.clone(), WatchOptions::default()),
        (deep_fired.clone(), WatchOptions::default().deep()),
    ] {
        let state = state.clone();
        watch(
            WatchSource::getter(move || state.get("nested")),
            move |_, _, _| fired.set(fired.get() + 1),
            options,
        );
    }

    state.get("nested").set("n", 2);
    run_microtasks();
    assert_eq!(shallow_fired.get(), 0);
    assert_eq!(deep_fired.get(), 1);
}

#[test]
fn test_multiple_sources() {
    let a = create_ref(1);
    let b = create_ref("x");
    let calls = Calls::default();
    watch(
        vec![WatchSource::from(&a), WatchSource::from(&b)],
        recorder(&calls),
        WatchOptions::default().immediate(),
    );
    {
        let calls = calls.borrow();
        assert_eq!(items(&calls[0].0), vec![Value::from(1), Value::from("x")]);
        // First run: the old value is an empty list.
        assert!(items(&calls[0].1).is_empty());
    }

    a.set(2);
    run_microtasks();
    let calls = calls.borrow();
    assert_eq!(calls.len(), 2);
    assert_eq!(items(&calls[1].0), vec![Value::from(2), Value::from("x")]);
    assert_eq!(items(&calls[1].1), vec![Value::from(1), Value::from("x")]);
}

#[test]
fn test_shallow_ref_fires_on_manual_trigger() {
    let shallow = create_shallow_ref(Target::object([("n", 1)]));
    let fired = Rc::new(Cell::new(0));
    {
        let fired = fired.clone();
        watch(
            &shallow,
            move |_, _, _| fired.set(fired.get() + 1),
            WatchOptions::default(),
        );
    }

    // Raw mutation is invisible until the ref is triggered by hand.
    shallow.get().set("n", 2);
    run_microtasks();
    assert_eq!(fired.get(), 0);

    trigger_ref(&shallow);
    run_microtasks();
    assert_eq!(fired.get(), 1);
}

#[test]
fn test_cleanup_runs_before_next_callback_and_on_stop() {
    let count = create_ref(1);
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    let handle = {
        let log = log.clone();
        watch(
            &count,
            move |new, _, on_cleanup| {
                log.borrow_mut().push(format!("cb {new}"));
                let log = log.clone();
                let seen = new.clone();
                on_cleanup.register(move || log.borrow_mut().push(format!("cleanup {seen}")));
            },
            WatchOptions::default(),
        )
    };

    count.set(2);
    run_microtasks();
    count.set(3);
    run_microtasks();
    handle.stop();

    assert_eq!(
        *log.borrow(),
        vec!["cb 2", "cleanup 2", "cb 3", "cleanup 3"]
    );
}

#[test]
fn test_stop_detaches_from_scope() {
    let count = create_ref(1);
    let calls = Calls::default();
    let scope = EffectScope::new(true);
    let handle = scope
        .run(|| watch(&count, recorder(&calls), WatchOptions::default()))
        .unwrap();
    assert_eq!(scope.effect_count(), 1);

    handle.stop();
    assert_eq!(scope.effect_count(), 0);
    count.set(2);
    run_microtasks();
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_scope_stop_stops_watchers() {
    let count = create_ref(1);
    let calls = Calls::default();
    let scope = EffectScope::new(true);
    scope.run(|| watch(&count, recorder(&calls), WatchOptions::default()));
    scope.stop();
    count.set(2);
    run_microtasks();
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_sync_flush_fires_inside_the_mutation() {
    let count = create_ref(1);
    let calls = Calls::default();
    watch(
        &count,
        recorder(&calls),
        WatchOptions::default().flush(FlushMode::Sync),
    );
    count.set(2);
    assert_eq!(*calls.borrow(), vec![(Value::from(2), Value::from(1))]);
    count.set(3);
    assert_eq!(calls.borrow().len(), 2);
}

#[test]
fn test_nested_sync_rerun_reports_previous_value() {
    let count = create_ref(0);
    let calls = Calls::default();
    {
        let (count, calls) = (count.clone(), calls.clone());
        watch(
            &count.clone(),
            move |new, old, _| {
                calls.borrow_mut().push((new.clone(), old.clone()));
                if new.as_i64() == Some(1) {
                    count.set(2);
                }
            },
            WatchOptions::default().flush(FlushMode::Sync),
        );
    }

    count.set(1);
    count.set(3);
    assert_eq!(
        *calls.borrow(),
        vec![
            (Value::from(1), Value::from(0)),
            (Value::from(2), Value::from(1)),
            (Value::from(3), Value::from(2)),
        ]
    );
}

#[test]
fn test_callback_may_retrigger_its_own_source() {
    let count = create_ref(0);
    let seen = Rc::new(RefCell::new(Vec::<Value>::new()));
    {
        let (count, seen) = (count.clone(), seen.clone());
        watch(
            &count.clone(),
            move |new, _, _| {
                seen.borrow_mut().push(new.clone());
                let n = new.as_i64().unwrap_or(0);
                if n < 3 {
                    count.set(n + 1);
                }
            },
            WatchOptions::default(),
        );
    }

    count.set(1);
    run_microtasks();
    assert_eq!(
        *seen.borrow(),
        vec![Value::from(1), Value::from(2), Value::from(3)]
    );
}

#[test]
fn test_watch_effect_reruns_after_flush() {
    let count = create_ref(1);
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    {
        let (count, log) = (count.clone(), log.clone());
        watch_effect(move |on_cleanup| {
            let value = count.get();
            log.borrow_mut().push(format!("run {value}"));
            let log = log.clone();
            on_cleanup.register(move || log.borrow_mut().push(format!("cleanup {value}")));
        });
    }
    assert_eq!(*log.borrow(), vec!["run 1"]);

    count.set(2);
    assert_eq!(log.borrow().len(), 1);
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["run 1", "cleanup 1", "run 2"]);
}

#[test]
fn test_sync_effect_runs_immediately_on_change() {
    let count = create_ref(1);
    let runs = Rc::new(Cell::new(0));
    let handle = {
        let (count, runs) = (count.clone(), runs.clone());
        watch_sync_effect(move |_| {
            count.get();
            runs.set(runs.get() + 1);
        })
    };
    count.set(2);
    assert_eq!(runs.get(), 2);

    handle.stop();
    count.set(3);
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_post_effect_runs_after_pre_effects() {
    let count = create_ref(1);
    let log = Rc::new(RefCell::new(Vec::<String>::new()));
    {
        let (count, log) = (count.clone(), log.clone());
        watch_post_effect(move |_| {
            log.borrow_mut().push(format!("post {}", count.get()));
        });
    }
    // The first run waits for the flush.
    assert!(log.borrow().is_empty());
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["post 1"]);

    {
        let (count, log) = (count.clone(), log.clone());
        watch_effect(move |_| {
            log.borrow_mut().push(format!("pre {}", count.get()));
        });
    }
    log.borrow_mut().clear();
    count.set(2);
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["pre 2", "post 2"]);
}

#[test]
fn test_invalid_source_warns() {
    let warnings = Rc::new(RefCell::new(Vec::<String>::new()));
    {
        let warnings = warnings.clone();
        set_warn_handler(Some(Rc::new(move |msg: &str| {
            warnings.borrow_mut().push(msg.to_string())
        })));
    }
    let calls = Calls::default();
    watch(Value::from(5), recorder(&calls), WatchOptions::default());
    set_warn_handler(None);

    assert!(warnings
        .borrow()
        .iter()
        .any(|w| w.contains("invalid watch source")));
    assert!(calls.borrow().is_empty());
}

#[test]
fn test_panicking_getter_and_callback_are_reported() {
    let codes = Rc::new(RefCell::new(Vec::<Option<ErrorCode>>::new()));
    {
        let codes = codes.clone();
        set_error_handler(Some(Rc::new(move |err: &vireo_scheduler::RuntimeError| {
            codes.borrow_mut().push(err.code())
        })));
    }

    watch(
        WatchSource::getter(|| -> Value { panic!("getter failed") }),
        |_, _, _| {},
        WatchOptions::default(),
    );
    watch(
        &create_ref(1),
        |_, _, _| panic!("callback failed"),
        WatchOptions::default().immediate(),
    );
    set_error_handler(None);

    assert_eq!(
        *codes.borrow(),
        vec![Some(ErrorCode::WatchGetter), Some(ErrorCode::WatchCallback)]
    );
}

#[test]
fn test_traverse_survives_cycles() {
    let raw = Target::empty_object();
    raw.set_raw("self".into(), Value::Target(raw.clone())).unwrap();
    raw.set_raw("n".into(), Value::from(1)).unwrap();
    let state = reactive(raw);
    assert_eq!(traverse(&state), state);
}
