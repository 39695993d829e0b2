//! Reactive computations.
//!
//! A [`ReactiveEffect`] runs its body with itself installed as the active
//! subscriber, so every tracked read made by the body subscribes the effect.
//! Dependencies are re-collected on every run: deps that were not touched
//! again are dropped when the run finishes, which keeps conditional reads
//! correct after a branch flips.
//!
//! Nested runs are told apart by a generation bit (`1 << depth`). Beyond
//! [`MAX_MARKER_BITS`] levels the bits run out and the effect instead drops
//! all of its deps before the run and rebuilds them from scratch.

use crate::dependency::{
    finalize_dep_markers, init_dep_markers, is_active_effect, pop_track_depth, push_track_depth,
    replace_active_effect, set_should_track, Dep, MAX_MARKER_BITS,
};
use crate::effect_scope::{record_effect_scope, EffectScope};
use crate::operations::DebuggerEvent;
use crate::value::Value;
use smallvec::SmallVec;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EffectId(u64);

impl EffectId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

pub type EffectFn = Rc<dyn Fn() -> Value>;
pub type SchedulerFn = Rc<dyn Fn()>;
pub type DebuggerHook = Rc<dyn Fn(&DebuggerEvent)>;

pub(crate) struct EffectInner {
    id: EffectId,
    func: EffectFn,
    scheduler: RefCell<Option<SchedulerFn>>,
    active: Cell<bool>,
    /// The subscriber that was active when this one started running.
    /// Only set for the duration of a run.
    parent: RefCell<Option<ReactiveEffect>>,
    deps: RefCell<SmallVec<[Rc<Dep>; 4]>>,
    defer_stop: Cell<bool>,
    allow_recurse: Cell<bool>,
    computed: Cell<bool>,
    on_stop: RefCell<Option<Rc<dyn Fn()>>>,
    on_track: RefCell<Option<DebuggerHook>>,
    on_trigger: RefCell<Option<DebuggerHook>>,
}

#[derive(Clone)]
pub struct ReactiveEffect(Rc<EffectInner>);

#[derive(Clone)]
pub struct WeakEffect(Weak<EffectInner>);

impl WeakEffect {
    pub fn upgrade(&self) -> Option<ReactiveEffect> {
        self.0.upgrade().map(ReactiveEffect)
    }
}

impl ReactiveEffect {
    /// Creates an effect and records it in the active effect scope, if any.
    pub fn new<F, R>(f: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: Into<Value>,
    {
        Self::new_in(f, None)
    }

    /// Creates an effect owned by `scope` (or the active scope when `None`).
    pub fn new_in<F, R>(f: F, scope: Option<&EffectScope>) -> Self
    where
        F: Fn() -> R + 'static,
        R: Into<Value>,
    {
        let effect = Self(Rc::new(EffectInner {
            id: EffectId::next(),
            func: Rc::new(move || f().into()),
            scheduler: RefCell::new(None),
            active: Cell::new(true),
            parent: RefCell::new(None),
            deps: RefCell::new(SmallVec::new()),
            defer_stop: Cell::new(false),
            allow_recurse: Cell::new(false),
            computed: Cell::new(false),
            on_stop: RefCell::new(None),
            on_track: RefCell::new(None),
            on_trigger: RefCell::new(None),
        }));
        record_effect_scope(&effect, scope);
        effect
    }

    pub fn with_scheduler(self, scheduler: impl Fn() + 'static) -> Self {
        self.set_scheduler(Some(Rc::new(scheduler)));
        self
    }

    pub fn set_scheduler(&self, scheduler: Option<SchedulerFn>) {
        *self.0.scheduler.borrow_mut() = scheduler;
    }

    pub fn id(&self) -> EffectId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &ReactiveEffect) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn downgrade(&self) -> WeakEffect {
        WeakEffect(Rc::downgrade(&self.0))
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.0.active.set(active);
    }

    pub fn allow_recurse(&self) -> bool {
        self.0.allow_recurse.get()
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.0.allow_recurse.set(allow);
    }

    pub fn is_computed(&self) -> bool {
        self.0.computed.get()
    }

    pub(crate) fn mark_computed(&self) {
        self.0.computed.set(true);
    }

    pub fn set_on_stop(&self, hook: Option<Rc<dyn Fn()>>) {
        *self.0.on_stop.borrow_mut() = hook;
    }

    pub fn set_on_track(&self, hook: Option<DebuggerHook>) {
        *self.0.on_track.borrow_mut() = hook;
    }

    pub fn set_on_trigger(&self, hook: Option<DebuggerHook>) {
        *self.0.on_trigger.borrow_mut() = hook;
    }

    /// Number of dependency sets this effect currently belongs to.
    pub fn dep_count(&self) -> usize {
        self.0.deps.borrow().len()
    }

    pub(crate) fn deps(&self) -> Ref<'_, SmallVec<[Rc<Dep>; 4]>> {
        self.0.deps.borrow()
    }

    pub(crate) fn deps_mut(&self) -> RefMut<'_, SmallVec<[Rc<Dep>; 4]>> {
        self.0.deps.borrow_mut()
    }

    pub(crate) fn scheduler(&self) -> Option<SchedulerFn> {
        self.0.scheduler.borrow().clone()
    }

    pub(crate) fn on_track_hook(&self) -> Option<DebuggerHook> {
        self.0.on_track.borrow().clone()
    }

    pub(crate) fn on_trigger_hook(&self) -> Option<DebuggerHook> {
        self.0.on_trigger.borrow().clone()
    }

    /// Runs the body, collecting dependencies when the effect is active.
    ///
    /// Returns `Undefined` without running when this effect is already on
    /// the chain of running effects.
    pub fn run(&self) -> Value {
        let func = self.0.func.clone();
        if !self.is_active() {
            return func();
        }

        let mut ancestor = crate::dependency::active_effect_handle();
        while let Some(effect) = ancestor {
            if effect.ptr_eq(self) {
                return Value::Undefined;
            }
            ancestor = effect.0.parent.borrow().clone();
        }

        let _guard = RunGuard::enter(self);
        func()
    }

    /// Unsubscribes from every dep. Stopping the running effect is deferred
    /// until its run returns. Idempotent.
    pub fn stop(&self) {
        if is_active_effect(self) {
            self.0.defer_stop.set(true);
        } else if self.is_active() {
            cleanup_effect(self);
            let on_stop = self.0.on_stop.borrow().clone();
            if let Some(on_stop) = on_stop {
                on_stop();
            }
            self.0.active.set(false);
        }
    }
}

impl fmt::Debug for ReactiveEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveEffect")
            .field("id", &self.0.id)
            .field("active", &self.0.active.get())
            .field("deps", &self.0.deps.borrow().len())
            .finish()
    }
}

fn cleanup_effect(effect: &ReactiveEffect) {
    let deps: SmallVec<[Rc<Dep>; 4]> = effect.deps_mut().drain(..).collect();
    for dep in deps {
        dep.remove(effect);
    }
}

/// Installs an effect as the active subscriber for one run and restores the
/// previous tracking state on drop, including during unwinding.
struct RunGuard<'a> {
    effect: &'a ReactiveEffect,
    last_should_track: bool,
    depth: u32,
}

impl<'a> RunGuard<'a> {
    fn enter(effect: &'a ReactiveEffect) -> Self {
        let parent = replace_active_effect(Some(effect.clone()));
        *effect.0.parent.borrow_mut() = parent;
        let last_should_track = set_should_track(true);
        let depth = push_track_depth();
        if depth <= MAX_MARKER_BITS {
            init_dep_markers(effect);
        } else {
            cleanup_effect(effect);
        }
        Self {
            effect,
            last_should_track,
            depth,
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.depth <= MAX_MARKER_BITS {
            finalize_dep_markers(self.effect);
        }
        pop_track_depth();
        let parent = self.effect.0.parent.borrow_mut().take();
        replace_active_effect(parent);
        set_should_track(self.last_should_track);
        if self.effect.0.defer_stop.replace(false) {
            self.effect.stop();
        }
    }
}

#[derive(Default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,
    pub scheduler: Option<SchedulerFn>,
    pub scope: Option<EffectScope>,
    pub allow_recurse: bool,
    pub on_stop: Option<Rc<dyn Fn()>>,
    pub on_track: Option<DebuggerHook>,
    pub on_trigger: Option<DebuggerHook>,
}

/// Handle returned by [`effect`]; runs the effect on demand.
#[derive(Clone)]
pub struct EffectRunner {
    effect: ReactiveEffect,
}

impl EffectRunner {
    pub fn run(&self) -> Value {
        self.effect.run()
    }

    pub fn effect(&self) -> &ReactiveEffect {
        &self.effect
    }
}

/// Registers a side effect that re-runs whenever something it read changes.
///
/// The effect stays subscribed until [`stop`] is called on it (directly or
/// through its owning scope).
pub fn effect<F, R>(f: F, options: EffectOptions) -> EffectRunner
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
{
    let effect = ReactiveEffect::new_in(f, options.scope.as_ref());
    effect.set_scheduler(options.scheduler);
    effect.set_allow_recurse(options.allow_recurse);
    effect.set_on_stop(options.on_stop);
    effect.set_on_track(options.on_track);
    effect.set_on_trigger(options.on_trigger);
    if !options.lazy {
        effect.run();
    }
    EffectRunner { effect }
}

pub fn stop(runner: &EffectRunner) {
    runner.effect.stop();
}

/// The currently running subscriber, if any.
pub fn active_effect() -> Option<ReactiveEffect> {
    crate::dependency::active_effect_handle()
}
