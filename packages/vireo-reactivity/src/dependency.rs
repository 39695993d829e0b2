use crate::effect::{EffectId, ReactiveEffect};
use crate::operations::{DebuggerEvent, TrackOp, TriggerOp};
use crate::target::{FxIndexMap, Target, TargetKind, TrackKey};
use crate::value::Value;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Nesting depth past which generation bits run out and effects fall back to
/// a full cleanup before every run.
pub const MAX_MARKER_BITS: u32 = 30;

thread_local! {
    static TRACKING: TrackingContext = TrackingContext::new();
}

/// The single slot of mutable tracking state. Every write goes through a
/// save/install/restore pair.
struct TrackingContext {
    active_effect: RefCell<Option<ReactiveEffect>>,
    should_track: Cell<bool>,
    track_stack: RefCell<Vec<bool>>,
    track_op_bit: Cell<u32>,
    track_depth: Cell<u32>,
}

impl TrackingContext {
    fn new() -> Self {
        Self {
            active_effect: RefCell::new(None),
            should_track: Cell::new(true),
            track_stack: RefCell::new(Vec::new()),
            track_op_bit: Cell::new(1),
            track_depth: Cell::new(0),
        }
    }
}

/// The set of subscribers of one reactive key, plus the generation markers
/// used while a subscriber is collecting its dependencies.
pub struct Dep {
    subscribers: RefCell<FxIndexMap<EffectId, ReactiveEffect>>,
    /// Generations in which this dep was already tracked before the run.
    w: Cell<u32>,
    /// Generations in which this dep was tracked during the run.
    n: Cell<u32>,
}

impl Dep {
    pub fn new() -> Rc<Dep> {
        Rc::new(Dep {
            subscribers: RefCell::new(FxIndexMap::default()),
            w: Cell::new(0),
            n: Cell::new(0),
        })
    }

    fn with_effects(effects: impl IntoIterator<Item = ReactiveEffect>) -> Rc<Dep> {
        let dep = Dep::new();
        {
            let mut subs = dep.subscribers.borrow_mut();
            for effect in effects {
                subs.entry(effect.id()).or_insert(effect);
            }
        }
        dep
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    pub fn contains(&self, effect: &ReactiveEffect) -> bool {
        self.subscribers.borrow().contains_key(&effect.id())
    }

    pub(crate) fn insert(&self, effect: ReactiveEffect) {
        self.subscribers.borrow_mut().insert(effect.id(), effect);
    }

    pub(crate) fn remove(&self, effect: &ReactiveEffect) {
        self.subscribers.borrow_mut().shift_remove(&effect.id());
    }

    pub(crate) fn snapshot(&self) -> SmallVec<[ReactiveEffect; 4]> {
        self.subscribers.borrow().values().cloned().collect()
    }

    fn was_tracked(&self) -> bool {
        self.w.get() & track_op_bit() > 0
    }

    fn new_tracked(&self) -> bool {
        self.n.get() & track_op_bit() > 0
    }
}

pub(crate) fn active_effect_handle() -> Option<ReactiveEffect> {
    TRACKING.with(|t| t.active_effect.borrow().clone())
}

/// Installs `effect` as the active subscriber and returns the previous one.
pub(crate) fn replace_active_effect(effect: Option<ReactiveEffect>) -> Option<ReactiveEffect> {
    TRACKING.with(|t| std::mem::replace(&mut *t.active_effect.borrow_mut(), effect))
}

pub(crate) fn is_active_effect(effect: &ReactiveEffect) -> bool {
    TRACKING.with(|t| {
        t.active_effect
            .borrow()
            .as_ref()
            .is_some_and(|e| e.ptr_eq(effect))
    })
}

pub fn should_track() -> bool {
    TRACKING.with(|t| t.should_track.get())
}

pub(crate) fn set_should_track(value: bool) -> bool {
    TRACKING.with(|t| t.should_track.replace(value))
}

pub(crate) fn track_op_bit() -> u32 {
    TRACKING.with(|t| t.track_op_bit.get())
}

/// Enters one more nesting level and returns the new depth.
pub(crate) fn push_track_depth() -> u32 {
    TRACKING.with(|t| {
        let depth = t.track_depth.get() + 1;
        t.track_depth.set(depth);
        t.track_op_bit.set(generation_bit(depth));
        depth
    })
}

pub(crate) fn pop_track_depth() {
    TRACKING.with(|t| {
        let depth = t.track_depth.get().saturating_sub(1);
        t.track_depth.set(depth);
        t.track_op_bit.set(generation_bit(depth));
    })
}

fn generation_bit(depth: u32) -> u32 {
    // Past the budget the bit is unused; keep it in range.
    1u32.checked_shl(depth.min(31)).unwrap_or(0)
}

pub fn pause_tracking() {
    TRACKING.with(|t| {
        t.track_stack.borrow_mut().push(t.should_track.get());
        t.should_track.set(false);
    })
}

pub fn enable_tracking() {
    TRACKING.with(|t| {
        t.track_stack.borrow_mut().push(t.should_track.get());
        t.should_track.set(true);
    })
}

pub fn reset_tracking() {
    TRACKING.with(|t| {
        let last = t.track_stack.borrow_mut().pop();
        t.should_track.set(last.unwrap_or(true));
    })
}

/// Pauses tracking until dropped.
pub(crate) struct PauseTracking;

impl PauseTracking {
    pub(crate) fn new() -> Self {
        pause_tracking();
        PauseTracking
    }
}

impl Drop for PauseTracking {
    fn drop(&mut self) {
        reset_tracking();
    }
}

/// Marks every dep of `effect` as tracked in the current generation.
pub(crate) fn init_dep_markers(effect: &ReactiveEffect) {
    let bit = track_op_bit();
    for dep in effect.deps().iter() {
        dep.w.set(dep.w.get() | bit);
    }
}

/// Drops the deps that were tracked before the run but not during it, and
/// clears the current generation bit from all of them.
pub(crate) fn finalize_dep_markers(effect: &ReactiveEffect) {
    let bit = track_op_bit();
    let mut deps = effect.deps_mut();
    deps.retain(|dep| {
        let keep = !(dep.was_tracked() && !dep.new_tracked());
        if !keep {
            dep.remove(effect);
        }
        dep.w.set(dep.w.get() & !bit);
        dep.n.set(dep.n.get() & !bit);
        keep
    });
}

pub fn track(target: &Target, op: TrackOp, key: TrackKey) {
    if !should_track() {
        return;
    }
    let Some(effect) = active_effect_handle() else {
        return;
    };
    let dep = target.dep_or_insert(key.clone());
    track_effects(&dep, &effect, || DebuggerEvent::track(&effect, op, Some(key)));
}

pub(crate) fn track_effects(
    dep: &Rc<Dep>,
    effect: &ReactiveEffect,
    event: impl FnOnce() -> DebuggerEvent,
) {
    let depth = TRACKING.with(|t| t.track_depth.get());
    let subscribe = if depth <= MAX_MARKER_BITS {
        if dep.new_tracked() {
            false
        } else {
            dep.n.set(dep.n.get() | track_op_bit());
            !dep.was_tracked()
        }
    } else {
        !dep.contains(effect)
    };

    if subscribe {
        dep.insert(effect.clone());
        effect.deps_mut().push(dep.clone());
        if let Some(on_track) = effect.on_track_hook() {
            on_track(&event());
        }
    }
}

pub fn trigger(
    target: &Target,
    op: TriggerOp,
    key: Option<TrackKey>,
    new_value: Option<&Value>,
    old_value: Option<&Value>,
) {
    if !target.has_deps() {
        return;
    }
    let kind = target.kind();
    let mut deps: SmallVec<[Rc<Dep>; 4]> = SmallVec::new();

    if op == TriggerOp::Clear {
        deps.extend(target.deps_where(|_| true));
    } else if key == Some(TrackKey::Length) && kind == TargetKind::Array {
        let new_len = new_value
            .and_then(Value::as_f64)
            .unwrap_or_default()
            .max(0.0) as usize;
        deps.extend(target.deps_where(|k| match k {
            TrackKey::Length => true,
            TrackKey::Index(i) => *i >= new_len,
            _ => false,
        }));
    } else {
        if let Some(k) = &key {
            deps.extend(target.dep(k));
        }
        match op {
            TriggerOp::Add => {
                if kind != TargetKind::Array {
                    deps.extend(target.dep(&TrackKey::Iterate));
                    if kind == TargetKind::Map {
                        deps.extend(target.dep(&TrackKey::MapKeyIterate));
                    }
                } else if matches!(key, Some(TrackKey::Index(_))) {
                    deps.extend(target.dep(&TrackKey::Length));
                }
            }
            TriggerOp::Delete => {
                if kind != TargetKind::Array {
                    deps.extend(target.dep(&TrackKey::Iterate));
                    if kind == TargetKind::Map {
                        deps.extend(target.dep(&TrackKey::MapKeyIterate));
                    }
                }
            }
            TriggerOp::Set => {
                if kind == TargetKind::Map {
                    deps.extend(target.dep(&TrackKey::Iterate));
                }
            }
            TriggerOp::Clear => {}
        }
    }

    let event = |effect: &ReactiveEffect| {
        DebuggerEvent::trigger(
            effect,
            op,
            key.clone(),
            new_value.cloned(),
            old_value.cloned(),
        )
    };

    match deps.len() {
        0 => {}
        1 => trigger_effects(&deps[0], event),
        _ => {
            let merged = Dep::with_effects(deps.iter().flat_map(|d| d.snapshot()));
            trigger_effects(&merged, event);
        }
    }
}

/// Notifies every subscriber of `dep`, computed cells first so that plain
/// subscribers reading them during the same pass see fresh values.
pub(crate) fn trigger_effects(dep: &Dep, event: impl Fn(&ReactiveEffect) -> DebuggerEvent) {
    let effects = dep.snapshot();
    for effect in effects.iter().filter(|e| e.is_computed()) {
        trigger_effect(effect, &event);
    }
    for effect in effects.iter().filter(|e| !e.is_computed()) {
        trigger_effect(effect, &event);
    }
}

fn trigger_effect(effect: &ReactiveEffect, event: &impl Fn(&ReactiveEffect) -> DebuggerEvent) {
    if is_active_effect(effect) && !effect.allow_recurse() {
        return;
    }
    if let Some(on_trigger) = effect.on_trigger_hook() {
        on_trigger(&event(effect));
    }
    match effect.scheduler() {
        Some(scheduler) => scheduler(),
        None => {
            effect.run();
        }
    }
}
