//! Single-value reactive cells.

use crate::dependency::{active_effect_handle, should_track, track_effects, trigger_effects, Dep};
use crate::operations::{DebuggerEvent, TrackOp, TriggerOp};
use crate::reactive::{is_readonly, is_shallow, to_raw, to_reactive, Proxy};
use crate::target::{PropKey, TargetKind};
use crate::value::{has_changed, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Behaviour shared by every ref flavour.
pub trait RefImpl {
    fn get(&self) -> Value;
    fn set(&self, value: Value);

    /// The dependency set readers of this ref subscribe to, if it owns or
    /// can locate one.
    fn dep(&self) -> Option<Rc<Dep>>;

    fn is_shallow(&self) -> bool {
        false
    }

    fn is_readonly(&self) -> bool {
        false
    }
}

pub(crate) fn track_ref_value(dep: &Rc<Dep>) {
    if !should_track() {
        return;
    }
    if let Some(effect) = active_effect_handle() {
        track_effects(dep, &effect, || DebuggerEvent::track(&effect, TrackOp::Get, None));
    }
}

pub(crate) fn trigger_ref_value(dep: &Dep, new_value: Option<&Value>) {
    trigger_effects(dep, |effect| {
        DebuggerEvent::trigger(effect, TriggerOp::Set, None, new_value.cloned(), None)
    });
}

/// Handle to a reactive cell. Cloning shares the cell.
#[derive(Clone)]
pub struct Ref(pub(crate) Rc<dyn RefImpl>);

impl Ref {
    pub fn new(inner: impl RefImpl + 'static) -> Self {
        Self(Rc::new(inner))
    }

    /// Tracked read of `.value`.
    pub fn get(&self) -> Value {
        self.0.get()
    }

    pub fn set(&self, value: impl Into<Value>) {
        self.0.set(value.into());
    }

    pub fn is_shallow(&self) -> bool {
        self.0.is_shallow()
    }

    pub fn is_readonly(&self) -> bool {
        self.0.is_readonly()
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Ref) -> bool {
        self.addr() == other.addr()
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref({:#x})", self.addr())
    }
}

struct PlainRef {
    raw: RefCell<Value>,
    value: RefCell<Value>,
    dep: Rc<Dep>,
    shallow: bool,
}

impl PlainRef {
    fn new(value: Value, shallow: bool) -> Self {
        let raw = if shallow { value.clone() } else { to_raw(&value) };
        let value = if shallow { value } else { to_reactive(&value) };
        Self {
            raw: RefCell::new(raw),
            value: RefCell::new(value),
            dep: Dep::new(),
            shallow,
        }
    }
}

impl RefImpl for PlainRef {
    fn get(&self) -> Value {
        track_ref_value(&self.dep);
        self.value.borrow().clone()
    }

    fn set(&self, value: Value) {
        let direct = self.shallow || is_shallow(&value) || is_readonly(&value);
        let new_raw = if direct { value.clone() } else { to_raw(&value) };
        if !has_changed(&new_raw, &self.raw.borrow()) {
            return;
        }
        *self.raw.borrow_mut() = new_raw.clone();
        let stored = if direct { value } else { to_reactive(&new_raw) };
        *self.value.borrow_mut() = stored.clone();
        trigger_ref_value(&self.dep, Some(&stored));
    }

    fn dep(&self) -> Option<Rc<Dep>> {
        Some(self.dep.clone())
    }

    fn is_shallow(&self) -> bool {
        self.shallow
    }
}

/// A ref whose object values are wrapped deeply. Passing a ref returns it.
pub fn create_ref(value: impl Into<Value>) -> Ref {
    match value.into() {
        Value::Ref(r) => r,
        value => Ref::new(PlainRef::new(value, false)),
    }
}

/// A ref that stores values as given; only `.value` replacement is reactive.
pub fn create_shallow_ref(value: impl Into<Value>) -> Ref {
    match value.into() {
        Value::Ref(r) => r,
        value => Ref::new(PlainRef::new(value, true)),
    }
}

pub type TrackFn = Rc<dyn Fn()>;
pub type TriggerFn = Rc<dyn Fn()>;

struct CustomRef {
    getter: Box<dyn Fn() -> Value>,
    setter: Box<dyn Fn(Value)>,
    dep: Rc<Dep>,
}

impl RefImpl for CustomRef {
    fn get(&self) -> Value {
        (self.getter)()
    }

    fn set(&self, value: Value) {
        (self.setter)(value);
    }

    fn dep(&self) -> Option<Rc<Dep>> {
        Some(self.dep.clone())
    }
}

/// A ref with user-controlled tracking. `factory` receives `track` and
/// `trigger` callbacks bound to the ref's dependency set and returns the
/// getter and setter.
pub fn create_custom_ref<F, G, S>(factory: F) -> Ref
where
    F: FnOnce(TrackFn, TriggerFn) -> (G, S),
    G: Fn() -> Value + 'static,
    S: Fn(Value) + 'static,
{
    let dep = Dep::new();
    let track: TrackFn = {
        let dep = dep.clone();
        Rc::new(move || track_ref_value(&dep))
    };
    let trigger: TriggerFn = {
        let dep = dep.clone();
        Rc::new(move || trigger_ref_value(&dep, None))
    };
    let (getter, setter) = factory(track, trigger);
    Ref::new(CustomRef {
        getter: Box::new(getter),
        setter: Box::new(setter),
        dep,
    })
}

/// View of one property of an object. Owns no dependency set; reads and
/// writes go through the object.
struct ObjectRef {
    object: Value,
    key: PropKey,
    default: Option<Value>,
}

impl RefImpl for ObjectRef {
    fn get(&self) -> Value {
        let value = self.object.get(self.key.clone());
        match (&value, &self.default) {
            (Value::Undefined, Some(default)) => default.clone(),
            _ => value,
        }
    }

    fn set(&self, value: Value) {
        self.object.set(self.key.clone(), value);
    }

    fn dep(&self) -> Option<Rc<Dep>> {
        let proxy = self.object.as_proxy()?;
        proxy.target().dep(&proxy.track_key(&self.key))
    }
}

/// A ref bound to `object[key]`. An existing ref stored there is returned
/// instead.
pub fn to_ref(object: &Value, key: impl Into<PropKey>) -> Ref {
    object_ref(object, key.into(), None)
}

/// Like [`to_ref`], reading `default` while the property is undefined.
pub fn to_ref_with_default(object: &Value, key: impl Into<PropKey>, default: impl Into<Value>) -> Ref {
    object_ref(object, key.into(), Some(default.into()))
}

fn object_ref(object: &Value, key: PropKey, default: Option<Value>) -> Ref {
    let raw = match object {
        Value::Proxy(p) => p.target().get_raw(&key),
        Value::Target(t) => t.get_raw(&key),
        _ => Value::Undefined,
    };
    if let Value::Ref(r) = raw {
        return r;
    }
    Ref::new(ObjectRef {
        object: object.clone(),
        key,
        default,
    })
}

struct GetterRef {
    getter: Box<dyn Fn() -> Value>,
}

impl RefImpl for GetterRef {
    fn get(&self) -> Value {
        (self.getter)()
    }

    fn set(&self, _value: Value) {
        tracing::warn!("write operation failed: getter ref is readonly");
    }

    fn dep(&self) -> Option<Rc<Dep>> {
        None
    }

    fn is_readonly(&self) -> bool {
        true
    }
}

/// A readonly ref whose value is whatever `getter` returns on each read.
pub fn getter_ref<F, R>(getter: F) -> Ref
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
{
    Ref::new(GetterRef {
        getter: Box::new(move || getter().into()),
    })
}

/// One property ref per own key of a reactive object or array.
pub fn to_refs(object: &Value) -> Vec<(PropKey, Ref)> {
    let keys = match object {
        Value::Proxy(p) => {
            if !matches!(p.target_kind(), TargetKind::Object | TargetKind::Array) {
                tracing::warn!("to_refs() expects an object or array wrapper");
                return Vec::new();
            }
            p.target().keys_raw()
        }
        Value::Target(t) => {
            tracing::warn!("to_refs() expects a reactive object but received a plain one.");
            t.keys_raw()
        }
        _ => return Vec::new(),
    };
    keys.into_iter()
        .map(|key| {
            let r = to_ref(object, key.clone());
            (key, r)
        })
        .collect()
}

/// Notifies the subscribers of a ref even though its value did not change,
/// e.g. after mutating the inside of a shallow ref.
pub fn trigger_ref(r: &Ref) {
    if let Some(dep) = r.0.dep() {
        trigger_ref_value(&dep, None);
    }
}

pub fn is_ref(value: &Value) -> bool {
    matches!(value, Value::Ref(_))
}

/// `.value` of a ref, or the value itself.
pub fn unref(value: &Value) -> Value {
    match value {
        Value::Ref(r) => r.get(),
        other => other.clone(),
    }
}

impl Proxy {
    /// Shorthand for `to_ref(&Value::Proxy(self.clone()), key)`.
    pub fn to_ref(&self, key: impl Into<PropKey>) -> Ref {
        to_ref(&Value::Proxy(self.clone()), key)
    }
}
