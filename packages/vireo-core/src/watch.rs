//! Watchers: reactive effects whose re-runs are deferred through the job
//! scheduler and that hand `(new, old)` pairs to a callback.

use crate::component::{get_current_instance, WeakInstance};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use vireo_reactivity::{
    get_current_scope, has_changed, is_reactive, is_shallow, Computed, EffectScope,
    ReactiveEffect, ReactiveFlag, Ref, Target, TargetKind, Value,
};
use vireo_scheduler::{
    call_with_error_handling, queue_job, queue_post_flush_cb, warn, ErrorCode, Job,
};

/// When a triggered watcher runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushMode {
    /// Queued before the owning component re-renders.
    #[default]
    Pre,
    /// After the tree has been patched.
    Post,
    /// Inside the mutation that triggered it.
    Sync,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchOptions {
    pub immediate: bool,
    pub deep: bool,
    pub flush: FlushMode,
}

impl WatchOptions {
    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = flush;
        self
    }
}

/// Anything a watcher can observe.
#[derive(Clone)]
pub enum WatchSource {
    Ref(Ref),
    /// A reactive wrapper. Always watched deeply.
    Reactive(Value),
    Getter(Rc<dyn Fn() -> Value>),
    Multi(Vec<WatchSource>),
    /// Kept so the watcher can still be created; it warns and never fires.
    Invalid(Value),
}

impl WatchSource {
    pub fn getter<F, R>(f: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: Into<Value>,
    {
        WatchSource::Getter(Rc::new(move || f().into()))
    }

    /// Classifies a dynamic value: refs, reactive wrappers, functions and
    /// arrays of those.
    pub fn from_value(value: Value) -> Self {
        match &value {
            Value::Ref(r) => WatchSource::Ref(r.clone()),
            v if is_reactive(v) => WatchSource::Reactive(value),
            Value::Func(f) => {
                let f = f.clone();
                WatchSource::Getter(Rc::new(move || f.call(&[])))
            }
            Value::Target(t) if t.kind() == TargetKind::Array => WatchSource::Multi(
                t.values_raw()
                    .into_iter()
                    .map(WatchSource::from_value)
                    .collect(),
            ),
            _ => WatchSource::Invalid(value),
        }
    }
}

impl fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchSource::Ref(r) => f.debug_tuple("Ref").field(r).finish(),
            WatchSource::Reactive(v) => f.debug_tuple("Reactive").field(v).finish(),
            WatchSource::Getter(_) => f.write_str("Getter(..)"),
            WatchSource::Multi(s) => f.debug_tuple("Multi").field(s).finish(),
            WatchSource::Invalid(v) => f.debug_tuple("Invalid").field(v).finish(),
        }
    }
}

impl From<Ref> for WatchSource {
    fn from(r: Ref) -> Self {
        WatchSource::Ref(r)
    }
}

impl From<&Ref> for WatchSource {
    fn from(r: &Ref) -> Self {
        WatchSource::Ref(r.clone())
    }
}

impl From<Computed> for WatchSource {
    fn from(c: Computed) -> Self {
        WatchSource::Ref(c.to_ref())
    }
}

impl From<&Computed> for WatchSource {
    fn from(c: &Computed) -> Self {
        WatchSource::Ref(c.to_ref())
    }
}

impl From<Value> for WatchSource {
    fn from(value: Value) -> Self {
        WatchSource::from_value(value)
    }
}

impl From<Vec<WatchSource>> for WatchSource {
    fn from(sources: Vec<WatchSource>) -> Self {
        WatchSource::Multi(sources)
    }
}

type CleanupSlot = Rc<RefCell<Option<Box<dyn FnOnce()>>>>;

/// Registers a function to run before the watcher fires again, and when it
/// is stopped.
#[derive(Clone, Default)]
pub struct OnCleanup(CleanupSlot);

impl OnCleanup {
    pub fn register(&self, f: impl FnOnce() + 'static) {
        *self.0.borrow_mut() = Some(Box::new(f));
    }

    fn run(&self) {
        let pending = self.0.borrow_mut().take();
        if let Some(cleanup) = pending {
            call_with_error_handling(ErrorCode::WatchCleanup, cleanup);
        }
    }
}

pub type WatchCallback = Rc<dyn Fn(&Value, &Value, &OnCleanup)>;

/// Returned by every watch function.
pub struct WatchHandle {
    effect: ReactiveEffect,
    scope: Option<EffectScope>,
}

impl WatchHandle {
    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }

    pub fn stop(&self) {
        self.effect.stop();
        if let Some(scope) = &self.scope {
            scope.remove_effect(&self.effect);
        }
    }
}

/// Watches `source` and calls `cb(new, old, on_cleanup)` whenever it
/// changes. Nothing is called at registration unless `immediate` is set.
pub fn watch(
    source: impl Into<WatchSource>,
    cb: impl Fn(&Value, &Value, &OnCleanup) + 'static,
    options: WatchOptions,
) -> WatchHandle {
    do_watch(Getter::Source(source.into()), Some(Rc::new(cb)), options)
}

/// Runs `f` now and again whenever anything it read changes.
pub fn watch_effect(f: impl Fn(&OnCleanup) + 'static) -> WatchHandle {
    do_watch(Getter::Effect(Rc::new(f)), None, WatchOptions::default())
}

pub fn watch_post_effect(f: impl Fn(&OnCleanup) + 'static) -> WatchHandle {
    let options = WatchOptions::default().flush(FlushMode::Post);
    do_watch(Getter::Effect(Rc::new(f)), None, options)
}

pub fn watch_sync_effect(f: impl Fn(&OnCleanup) + 'static) -> WatchHandle {
    let options = WatchOptions::default().flush(FlushMode::Sync);
    do_watch(Getter::Effect(Rc::new(f)), None, options)
}

enum Getter {
    Source(WatchSource),
    Effect(Rc<dyn Fn(&OnCleanup)>),
}

fn warn_invalid_source(value: &Value) {
    warn(format_args!(
        "invalid watch source: {value:?}. A watch source can only be a getter function, \
         a ref, a reactive object, or an array of these"
    ));
}

fn read_source(source: &WatchSource) -> Value {
    match source {
        WatchSource::Ref(r) => r.get(),
        WatchSource::Reactive(v) => traverse(v),
        WatchSource::Getter(f) => {
            call_with_error_handling(ErrorCode::WatchGetter, || f()).unwrap_or_default()
        }
        WatchSource::Multi(sources) => {
            Value::Target(Target::array(sources.iter().map(read_source)))
        }
        WatchSource::Invalid(v) => {
            warn_invalid_source(v);
            Value::Undefined
        }
    }
}

fn do_watch(getter: Getter, cb: Option<WatchCallback>, options: WatchOptions) -> WatchHandle {
    let WatchOptions {
        immediate,
        mut deep,
        flush,
    } = options;
    let instance = get_current_instance();
    let on_cleanup = OnCleanup::default();
    let mut force_trigger = false;
    let mut is_multi = false;

    let base: Rc<dyn Fn() -> Value> = match getter {
        Getter::Source(source) => {
            match &source {
                WatchSource::Ref(r) => force_trigger = r.is_shallow(),
                WatchSource::Reactive(_) => deep = true,
                WatchSource::Multi(sources) => {
                    is_multi = true;
                    force_trigger = sources.iter().any(|s| match s {
                        WatchSource::Reactive(v) => is_reactive(v) || is_shallow(v),
                        WatchSource::Ref(r) => r.is_shallow(),
                        _ => false,
                    });
                }
                WatchSource::Invalid(v) => warn_invalid_source(v),
                WatchSource::Getter(_) => {}
            }
            match source {
                // Identity read; the traversal below does the tracking.
                WatchSource::Reactive(v) => Rc::new(move || v.clone()),
                WatchSource::Invalid(_) => Rc::new(|| Value::Undefined),
                source => Rc::new(move || read_source(&source)),
            }
        }
        Getter::Effect(f) => {
            let owner = instance.as_ref().map(|i| i.downgrade());
            let on_cleanup = on_cleanup.clone();
            Rc::new(move || {
                if owner
                    .as_ref()
                    .and_then(WeakInstance::upgrade)
                    .is_some_and(|i| i.is_unmounted())
                {
                    return Value::Undefined;
                }
                on_cleanup.run();
                call_with_error_handling(ErrorCode::WatchCallback, || f(&on_cleanup));
                Value::Undefined
            })
        }
    };

    let getter: Rc<dyn Fn() -> Value> = if cb.is_some() && deep {
        Rc::new(move || traverse(&base()))
    } else {
        base
    };

    let effect = ReactiveEffect::new(move || getter());
    {
        let on_cleanup = on_cleanup.clone();
        effect.set_on_stop(Some(Rc::new(move || on_cleanup.run())));
    }

    // `None` until the first run, so the first callback sees `undefined`.
    let old_value: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
    let job = {
        let weak = effect.downgrade();
        let cb = cb.clone();
        let old_value = old_value.clone();
        let on_cleanup = on_cleanup.clone();
        Job::new(move || {
            let Some(effect) = weak.upgrade() else {
                return;
            };
            if !effect.is_active() {
                return;
            }
            let Some(cb) = &cb else {
                effect.run();
                return;
            };
            let new_value = effect.run();
            let changed = deep
                || force_trigger
                || match &*old_value.borrow() {
                    None => true,
                    Some(old) if is_multi => elements_changed(&new_value, old),
                    Some(old) => has_changed(&new_value, old),
                };
            if !changed {
                return;
            }
            on_cleanup.run();
            // Stored before the callback so a nested sync rerun compares
            // against this value.
            let previous = old_value.replace(Some(new_value.clone()));
            let reported_old = match previous {
                Some(old) => old,
                None if is_multi => Value::Target(Target::array(Vec::<Value>::new())),
                None => Value::Undefined,
            };
            call_with_error_handling(ErrorCode::WatchCallback, || {
                cb(&new_value, &reported_old, &on_cleanup)
            });
        })
    };
    // A watcher with a callback may trigger itself through that callback.
    job.set_allow_recurse(cb.is_some());

    let job = match flush {
        FlushMode::Sync => {
            let queued = job.clone();
            effect.set_scheduler(Some(Rc::new(move || queued.run())));
            job
        }
        FlushMode::Post => {
            let queued = job.clone();
            effect.set_scheduler(Some(Rc::new(move || queue_post_flush_cb(&queued))));
            job
        }
        FlushMode::Pre => {
            let job = match &instance {
                Some(instance) => job.with_pre(true).with_id(instance.uid()),
                None => job.with_pre(true),
            };
            let queued = job.clone();
            effect.set_scheduler(Some(Rc::new(move || queue_job(&queued))));
            job
        }
    };

    if cb.is_some() {
        if immediate {
            job.run();
        } else {
            *old_value.borrow_mut() = Some(effect.run());
        }
    } else if flush == FlushMode::Post {
        let weak = effect.downgrade();
        queue_post_flush_cb(&Job::new(move || {
            if let Some(effect) = weak.upgrade() {
                effect.run();
            }
        }));
    } else {
        effect.run();
    }

    WatchHandle {
        effect,
        scope: get_current_scope(),
    }
}

fn elements_changed(new: &Value, old: &Value) -> bool {
    match (new.as_target(), old.as_target()) {
        (Some(new), Some(old)) => {
            let (new, old) = (new.values_raw(), old.values_raw());
            new.len() != old.len() || new.iter().zip(&old).any(|(n, o)| has_changed(n, o))
        }
        _ => true,
    }
}

/// Reads every nested property of `value` so each one is tracked.
pub fn traverse(value: &Value) -> Value {
    let mut seen = FxHashSet::default();
    traverse_into(value, &mut seen);
    value.clone()
}

fn traverse_into(value: &Value, seen: &mut FxHashSet<usize>) {
    let Some(id) = value.object_id() else {
        return;
    };
    if !seen.insert(id) {
        return;
    }
    match value {
        Value::Ref(r) => traverse_into(&r.get(), seen),
        Value::Proxy(p) => {
            if p.flag(ReactiveFlag::Skip).truthy() {
                return;
            }
            match p.target_kind() {
                TargetKind::Object | TargetKind::Array => {
                    for key in p.own_keys() {
                        traverse_into(&p.get(key), seen);
                    }
                }
                TargetKind::Map | TargetKind::Set => {
                    p.for_each(|v, _| traverse_into(&v, seen));
                }
                TargetKind::WeakMap | TargetKind::WeakSet => {}
            }
        }
        Value::Target(t) if !t.is_marked_raw() => {
            for v in t.values_raw() {
                traverse_into(&v, seen);
            }
        }
        _ => {}
    }
}
