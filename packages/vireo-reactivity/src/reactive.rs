//! Reactive wrappers.
//!
//! A [`Proxy`] pairs a raw [`Target`] with one of four variants. Reads and
//! writes go through the capability methods in `base_handlers` (objects and
//! arrays) and `collection_handlers` (Map, Set, WeakMap, WeakSet), which
//! call `track`/`trigger` on the target's dependency registry.
//!
//! Wrapping is identity-stable: the target keeps one weak slot per variant,
//! so the same raw target and variant always yield the same live wrapper.

use crate::target::{PropKey, Target, TargetKind, TrackKey};
use crate::value::Value;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Reactive,
    Readonly,
    ShallowReactive,
    ShallowReadonly,
}

impl ProxyKind {
    pub fn is_readonly(self) -> bool {
        matches!(self, ProxyKind::Readonly | ProxyKind::ShallowReadonly)
    }

    pub fn is_shallow(self) -> bool {
        matches!(self, ProxyKind::ShallowReactive | ProxyKind::ShallowReadonly)
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            ProxyKind::Reactive => 0,
            ProxyKind::Readonly => 1,
            ProxyKind::ShallowReactive => 2,
            ProxyKind::ShallowReadonly => 3,
        }
    }
}

/// Internal flags every wrapper answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactiveFlag {
    IsReactive,
    IsReadonly,
    IsShallow,
    Raw,
    Skip,
}

pub(crate) struct ProxyInner {
    pub(crate) target: Target,
    pub(crate) kind: ProxyKind,
    /// The reactive wrapper a readonly view reads through.
    pub(crate) source: Option<Proxy>,
    views: RefCell<[Weak<ProxyInner>; 2]>,
}

#[derive(Clone)]
pub struct Proxy(pub(crate) Rc<ProxyInner>);

impl Proxy {
    fn new(target: Target, kind: ProxyKind, source: Option<Proxy>) -> Self {
        Self(Rc::new(ProxyInner {
            target,
            kind,
            source,
            views: RefCell::new([Weak::new(), Weak::new()]),
        }))
    }

    pub fn kind(&self) -> ProxyKind {
        self.0.kind
    }

    /// The raw container behind this wrapper.
    pub fn target(&self) -> &Target {
        &self.0.target
    }

    pub fn target_kind(&self) -> TargetKind {
        self.0.target.kind()
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn is_readonly(&self) -> bool {
        self.0.kind.is_readonly()
    }

    pub(crate) fn is_shallow(&self) -> bool {
        self.0.kind.is_shallow()
    }

    pub(crate) fn source(&self) -> Option<&Proxy> {
        self.0.source.as_ref()
    }

    pub fn flag(&self, flag: ReactiveFlag) -> Value {
        match flag {
            ReactiveFlag::IsReactive => Value::Bool(!self.is_readonly() || self.source().is_some()),
            ReactiveFlag::IsReadonly => Value::Bool(self.is_readonly()),
            ReactiveFlag::IsShallow => Value::Bool(self.is_shallow()),
            ReactiveFlag::Raw => Value::Target(self.0.target.clone()),
            ReactiveFlag::Skip => Value::Bool(self.0.target.is_marked_raw()),
        }
    }

    /// Dependency key of a property on this wrapper's target.
    pub(crate) fn track_key(&self, key: &PropKey) -> TrackKey {
        match self.target_kind() {
            TargetKind::Array => match key.array_key() {
                crate::target::ArrayKey::Index(i) => TrackKey::Index(i),
                crate::target::ArrayKey::Length => TrackKey::Length,
                crate::target::ArrayKey::Named(n) => TrackKey::Prop(n),
            },
            _ => TrackKey::Prop(key.name()),
        }
    }

    /// Deep variants wrap nested containers lazily, on the way out.
    pub(crate) fn wrap_nested(&self, value: Value) -> Value {
        match self.kind() {
            ProxyKind::Reactive => to_reactive(&value),
            ProxyKind::Readonly => to_readonly(&value),
            ProxyKind::ShallowReactive | ProxyKind::ShallowReadonly => value,
        }
    }

    /// A readonly view over this reactive wrapper. Reads keep tracking
    /// through the reactive wrapper; writes are rejected.
    fn readonly_view(&self, kind: ProxyKind) -> Proxy {
        let slot = usize::from(kind.is_shallow());
        if let Some(view) = self.0.views.borrow()[slot].upgrade() {
            return Proxy(view);
        }
        let view = Proxy::new(self.0.target.clone(), kind, Some(self.clone()));
        self.0.views.borrow_mut()[slot] = Rc::downgrade(&view.0);
        view
    }
}

impl PartialEq for Proxy {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proxy::{:?}({:?})", self.kind(), self.0.target)
    }
}

fn create_reactive_object(value: &Value, kind: ProxyKind) -> Value {
    match value {
        Value::Target(target) => {
            if target.is_marked_raw() {
                return value.clone();
            }
            if let Some(existing) = target.wrapper(kind) {
                return Value::Proxy(existing);
            }
            let proxy = Proxy::new(target.clone(), kind, None);
            target.set_wrapper(kind, &proxy);
            Value::Proxy(proxy)
        }
        // Only readonly over a mutable wrapper produces something new.
        Value::Proxy(proxy) if kind.is_readonly() && !proxy.is_readonly() => {
            Value::Proxy(proxy.readonly_view(kind))
        }
        other => other.clone(),
    }
}

fn warn_non_object(value: &Value, what: &str) {
    if !value.is_object() {
        tracing::warn!("value cannot be made {what}: {value:?}");
    }
}

/// Deep reactive wrapper of a raw container. Primitives pass through.
pub fn reactive(value: impl Into<Value>) -> Value {
    let value = value.into();
    warn_non_object(&value, "reactive");
    create_reactive_object(&value, ProxyKind::Reactive)
}

pub fn readonly(value: impl Into<Value>) -> Value {
    let value = value.into();
    warn_non_object(&value, "readonly");
    create_reactive_object(&value, ProxyKind::Readonly)
}

/// Only root-level access is reactive; nested values are returned as stored.
pub fn shallow_reactive(value: impl Into<Value>) -> Value {
    let value = value.into();
    warn_non_object(&value, "reactive");
    create_reactive_object(&value, ProxyKind::ShallowReactive)
}

pub fn shallow_readonly(value: impl Into<Value>) -> Value {
    let value = value.into();
    warn_non_object(&value, "readonly");
    create_reactive_object(&value, ProxyKind::ShallowReadonly)
}

/// `reactive` for containers, identity for everything else. Never warns.
pub fn to_reactive(value: &Value) -> Value {
    create_reactive_object(value, ProxyKind::Reactive)
}

pub fn to_readonly(value: &Value) -> Value {
    create_reactive_object(value, ProxyKind::Readonly)
}

pub fn is_reactive(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => p.flag(ReactiveFlag::IsReactive).truthy(),
        _ => false,
    }
}

pub fn is_readonly(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => p.is_readonly(),
        Value::Ref(r) => r.is_readonly(),
        _ => false,
    }
}

pub fn is_shallow(value: &Value) -> bool {
    match value {
        Value::Proxy(p) => p.is_shallow(),
        Value::Ref(r) => r.is_shallow(),
        _ => false,
    }
}

pub fn is_proxy(value: &Value) -> bool {
    matches!(value, Value::Proxy(_))
}

/// The raw container behind a wrapper; everything else is returned as is.
pub fn to_raw(value: &Value) -> Value {
    match value {
        Value::Proxy(p) => Value::Target(p.target().clone()),
        other => other.clone(),
    }
}

/// Excludes a container from ever being wrapped.
pub fn mark_raw(value: Value) -> Value {
    match value {
        Value::Target(t) => Value::Target(t.mark_raw()),
        other => other,
    }
}
