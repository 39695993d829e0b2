use crate::reactive::Proxy;
use crate::refs::Ref;
use crate::target::{PropKey, Target};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use thiserror::Error;

/// A dynamically typed value flowing through reactive containers, refs and
/// vnode props.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    /// A raw (unwrapped) container.
    Target(Target),
    /// A reactive or readonly wrapper around a raw container.
    Proxy(Proxy),
    Ref(Ref),
    Func(Callback),
}

#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("invalid array length: {0}")]
    InvalidArrayLength(String),
    #[error("array cannot grow to {0} elements")]
    ArrayTooLarge(usize),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Target(_) => "object",
            Value::Proxy(_) => "proxy",
            Value::Ref(_) => "ref",
            Value::Func(_) => "function",
        }
    }

    /// Objects are the values that can be wrapped or tracked by identity.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Target(_) | Value::Proxy(_) | Value::Ref(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64().map(|n| n as i64)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Value::Target(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_proxy(&self) -> Option<&Proxy> {
        match self {
            Value::Proxy(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_ref_cell(&self) -> Option<&Ref> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_func(&self) -> Option<&Callback> {
        match self {
            Value::Func(f) => Some(f),
            _ => None,
        }
    }

    /// Property read. Goes through tracking for wrappers, reads raw storage
    /// for plain targets, and yields `Undefined` for everything else.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        match self {
            Value::Proxy(p) => p.get(key),
            Value::Target(t) => t.get_raw(&key.into()),
            _ => Value::Undefined,
        }
    }

    /// Property write. Returns `false` when the value cannot hold properties.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        match self {
            Value::Proxy(p) => p.set(key, value),
            Value::Target(t) => t.set_raw(key.into(), value.into()).is_ok(),
            _ => false,
        }
    }

    /// Address of the underlying allocation for object values.
    pub fn object_id(&self) -> Option<usize> {
        match self {
            Value::Target(t) => Some(t.addr()),
            Value::Proxy(p) => Some(p.addr()),
            Value::Ref(r) => Some(r.addr()),
            Value::Func(f) => Some(f.addr()),
            _ => None,
        }
    }

    /// `===` semantics: numbers compare numerically (so `NaN !== NaN`),
    /// strings by content, everything else by identity.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (a, b) if a.is_object() || matches!(a, Value::Func(_)) => {
                a.object_id().is_some() && a.object_id() == b.object_id()
            }
            _ => false,
        }
    }

    /// Like `strict_equals`, except `NaN` equals itself.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

/// Change detection used by refs, reactive setters and watchers.
pub fn has_changed(value: &Value, old: &Value) -> bool {
    !value.same_value_zero(old)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value_zero(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Target(t) => write!(f, "{t:?}"),
            Value::Proxy(p) => write!(f, "{p:?}"),
            Value::Ref(r) => write!(f, "Ref({:#x})", r.addr()),
            Value::Func(c) => write!(f, "Func({:#x})", c.addr()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{}", *n as i64),
            other => write!(f, "{other:?}"),
        }
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::Number(n as f64)
            }
        })*
    };
}

impl_from_number!(i32, i64, u32, u64, usize, f32, f64);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<Target> for Value {
    fn from(t: Target) -> Self {
        Value::Target(t)
    }
}

impl From<Proxy> for Value {
    fn from(p: Proxy) -> Self {
        Value::Proxy(p)
    }
}

impl From<Ref> for Value {
    fn from(r: Ref) -> Self {
        Value::Ref(r)
    }
}

impl From<Callback> for Value {
    fn from(c: Callback) -> Self {
        Value::Func(c)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl TryFrom<Value> for f64 {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_f64().ok_or(ValueError::TypeMismatch {
            expected: "number",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for bool {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        value.as_bool().ok_or(ValueError::TypeMismatch {
            expected: "bool",
            found: value.type_name(),
        })
    }
}

impl TryFrom<Value> for String {
    type Error = ValueError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(ValueError::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }
}

/// A callable value, e.g. an event handler passed through vnode props.
#[derive(Clone)]
pub struct Callback(Rc<dyn Fn(&[Value]) -> Value>);

impl Callback {
    pub fn new(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

/// Hashable identity of a value when it is used as a Map/Set key.
///
/// Primitives hash by value with SameValueZero semantics (`NaN` is one key,
/// `-0` and `+0` are the same key); objects hash by allocation address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValueKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    Object(usize),
}

impl ValueKey {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Undefined => ValueKey::Undefined,
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Number(n) => {
                let n = if *n == 0.0 { 0.0 } else { *n };
                let bits = if n.is_nan() { f64::NAN.to_bits() } else { n.to_bits() };
                ValueKey::Number(bits)
            }
            Value::Str(s) => ValueKey::Str(s.clone()),
            other => ValueKey::Object(other.object_id().unwrap_or_default()),
        }
    }
}

impl Hash for ValueKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ValueKey::Undefined | ValueKey::Null => {}
            ValueKey::Bool(b) => b.hash(state),
            ValueKey::Number(bits) => bits.hash(state),
            ValueKey::Str(s) => s.hash(state),
            ValueKey::Object(addr) => addr.hash(state),
        }
    }
}
