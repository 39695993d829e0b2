use crate::dependency::Dep;
use crate::reactive::{Proxy, ProxyInner, ProxyKind};
use crate::refs::RefImpl;
use crate::value::{Value, ValueError, ValueKey};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHasher};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::hash::BuildHasherDefault;
use std::rc::{Rc, Weak};

pub type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Largest integer key stored as an array element. Larger integers are
/// ordinary named properties.
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

/// Property key accepted by the object/array capability methods.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropKey {
    Name(Rc<str>),
    Index(usize),
}

impl PropKey {
    pub(crate) fn name(&self) -> Rc<str> {
        match self {
            PropKey::Name(n) => n.clone(),
            PropKey::Index(i) => Rc::from(i.to_string()),
        }
    }

    pub(crate) fn array_key(&self) -> ArrayKey {
        match self {
            PropKey::Index(i) if *i <= MAX_ARRAY_INDEX => ArrayKey::Index(*i),
            PropKey::Index(i) => ArrayKey::Named(Rc::from(i.to_string())),
            PropKey::Name(n) if &**n == "length" => ArrayKey::Length,
            PropKey::Name(n) => match parse_array_index(n) {
                Some(i) => ArrayKey::Index(i),
                None => ArrayKey::Named(n.clone()),
            },
        }
    }
}

/// Only canonical decimal names are indices; "01" and "+1" are plain names.
fn parse_array_index(name: &str) -> Option<usize> {
    let canonical = !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_digit())
        && (name.len() == 1 || !name.starts_with('0'));
    if !canonical {
        return None;
    }
    name.parse::<usize>().ok().filter(|i| *i <= MAX_ARRAY_INDEX)
}

fn array_length(value: &Value) -> Result<usize, ValueError> {
    match value.as_f64() {
        Some(n) if n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX) => Ok(n as usize),
        _ => Err(ValueError::InvalidArrayLength(format!("{value:?}"))),
    }
}

fn grow(items: &mut Vec<Value>, len: usize) -> Result<(), ValueError> {
    if len > items.len() {
        items
            .try_reserve_exact(len - items.len())
            .map_err(|_| ValueError::ArrayTooLarge(len))?;
        items.resize(len, Value::Undefined);
    }
    Ok(())
}

impl fmt::Display for PropKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropKey::Name(n) => f.write_str(n),
            PropKey::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PropKey {
    fn from(s: &str) -> Self {
        PropKey::Name(Rc::from(s))
    }
}

impl From<String> for PropKey {
    fn from(s: String) -> Self {
        PropKey::Name(Rc::from(s))
    }
}

impl From<Rc<str>> for PropKey {
    fn from(s: Rc<str>) -> Self {
        PropKey::Name(s)
    }
}

impl From<usize> for PropKey {
    fn from(i: usize) -> Self {
        PropKey::Index(i)
    }
}

impl From<i32> for PropKey {
    fn from(i: i32) -> Self {
        match usize::try_from(i) {
            Ok(i) => PropKey::Index(i),
            Err(_) => PropKey::Name(Rc::from(i.to_string())),
        }
    }
}

pub(crate) enum ArrayKey {
    Index(usize),
    Length,
    Named(Rc<str>),
}

/// Key of one dependency set inside a target's registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TrackKey {
    Prop(Rc<str>),
    Index(usize),
    Length,
    /// Key-set shape of an object, or the contents of a collection.
    Iterate,
    /// Key-set shape of a Map, independent of its values.
    MapKeyIterate,
    /// A Map/Set entry.
    Entry(ValueKey),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Object,
    Array,
    Map,
    Set,
    WeakMap,
    WeakSet,
}

impl TargetKind {
    pub fn is_collection(self) -> bool {
        !matches!(self, TargetKind::Object | TargetKind::Array)
    }

    pub fn is_weak(self) -> bool {
        matches!(self, TargetKind::WeakMap | TargetKind::WeakSet)
    }
}

/// Non-owning handle to an object used as a weak collection key.
pub(crate) enum WeakObject {
    Target(Weak<TargetInner>),
    Proxy(Weak<ProxyInner>),
    Ref(Weak<dyn RefImpl>),
}

impl WeakObject {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Target(t) => Some(WeakObject::Target(Rc::downgrade(&t.0))),
            Value::Proxy(p) => Some(WeakObject::Proxy(Rc::downgrade(&p.0))),
            Value::Ref(r) => Some(WeakObject::Ref(Rc::downgrade(&r.0))),
            _ => None,
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            WeakObject::Target(w) => w.strong_count() > 0,
            WeakObject::Proxy(w) => w.strong_count() > 0,
            WeakObject::Ref(w) => w.strong_count() > 0,
        }
    }
}

pub(crate) enum TargetData {
    Object(FxIndexMap<Rc<str>, Value>),
    /// Elements plus any non-index properties set on the array.
    Array {
        items: Vec<Value>,
        named: FxIndexMap<Rc<str>, Value>,
    },
    Map(FxIndexMap<ValueKey, (Value, Value)>),
    Set(FxIndexMap<ValueKey, Value>),
    WeakMap(FxIndexMap<ValueKey, (WeakObject, Value)>),
    WeakSet(FxIndexMap<ValueKey, WeakObject>),
}

impl TargetData {
    pub(crate) fn kind(&self) -> TargetKind {
        match self {
            TargetData::Object(_) => TargetKind::Object,
            TargetData::Array { .. } => TargetKind::Array,
            TargetData::Map(_) => TargetKind::Map,
            TargetData::Set(_) => TargetKind::Set,
            TargetData::WeakMap(_) => TargetKind::WeakMap,
            TargetData::WeakSet(_) => TargetKind::WeakSet,
        }
    }

    pub(crate) fn prune_dead_keys(&mut self) {
        match self {
            TargetData::WeakMap(m) => m.retain(|_, (k, _)| k.is_alive()),
            TargetData::WeakSet(s) => s.retain(|_, k| k.is_alive()),
            _ => {}
        }
    }
}

pub(crate) struct TargetInner {
    pub(crate) data: RefCell<TargetData>,
    deps: RefCell<FxHashMap<TrackKey, Rc<Dep>>>,
    wrappers: RefCell<[Weak<ProxyInner>; 4]>,
    skip: Cell<bool>,
}

/// A raw container: plain object, array, Map, Set, WeakMap or WeakSet.
///
/// Every target owns the dependency sets of its keys, so the registry entry
/// for a target lives exactly as long as the target itself.
#[derive(Clone)]
pub struct Target(pub(crate) Rc<TargetInner>);

impl Target {
    fn from_data(data: TargetData) -> Self {
        Self(Rc::new(TargetInner {
            data: RefCell::new(data),
            deps: RefCell::new(FxHashMap::default()),
            wrappers: RefCell::new(std::array::from_fn(|_| Weak::new())),
            skip: Cell::new(false),
        }))
    }

    pub fn object<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Rc<str>>,
        V: Into<Value>,
    {
        Self::from_data(TargetData::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        ))
    }

    pub fn empty_object() -> Self {
        Self::from_data(TargetData::Object(FxIndexMap::default()))
    }

    pub fn array<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::from_data(TargetData::Array {
            items: items.into_iter().map(Into::into).collect(),
            named: FxIndexMap::default(),
        })
    }

    pub fn map<K: Into<Value>, V: Into<Value>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self::from_data(TargetData::Map(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let k = k.into();
                    (ValueKey::of(&k), (k, v.into()))
                })
                .collect(),
        ))
    }

    pub fn set<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Self::from_data(TargetData::Set(
            items
                .into_iter()
                .map(|v| {
                    let v = v.into();
                    (ValueKey::of(&v), v)
                })
                .collect(),
        ))
    }

    pub fn weak_map() -> Self {
        Self::from_data(TargetData::WeakMap(FxIndexMap::default()))
    }

    pub fn weak_set() -> Self {
        Self::from_data(TargetData::WeakSet(FxIndexMap::default()))
    }

    pub fn kind(&self) -> TargetKind {
        self.0.data.borrow().kind()
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &Target) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Excludes this target from ever being wrapped.
    pub fn mark_raw(self) -> Self {
        self.0.skip.set(true);
        self
    }

    pub fn is_marked_raw(&self) -> bool {
        self.0.skip.get()
    }

    /// Number of entries (array length, object key count, collection size).
    pub fn raw_len(&self) -> usize {
        match &*self.0.data.borrow() {
            TargetData::Object(m) => m.len(),
            TargetData::Array { items, .. } => items.len(),
            TargetData::Map(m) => m.len(),
            TargetData::Set(s) => s.len(),
            TargetData::WeakMap(m) => m.len(),
            TargetData::WeakSet(s) => s.len(),
        }
    }

    /// Untracked property read on objects and arrays.
    pub fn get_raw(&self, key: &PropKey) -> Value {
        match &*self.0.data.borrow() {
            TargetData::Object(m) => m.get(&key.name()).cloned().unwrap_or_default(),
            TargetData::Array { items, named } => match key.array_key() {
                ArrayKey::Index(i) => items.get(i).cloned().unwrap_or_default(),
                ArrayKey::Length => Value::from(items.len()),
                ArrayKey::Named(n) => named.get(&n).cloned().unwrap_or_default(),
            },
            _ => Value::Undefined,
        }
    }

    /// Untracked property write on objects and arrays. Does not notify.
    ///
    /// Fails without touching the target when an array length is not a
    /// valid length or the array cannot grow to hold the index.
    pub fn set_raw(&self, key: PropKey, value: Value) -> Result<(), ValueError> {
        match &mut *self.0.data.borrow_mut() {
            TargetData::Object(m) => {
                m.insert(key.name(), value);
            }
            TargetData::Array { items, named } => match key.array_key() {
                ArrayKey::Index(i) => {
                    if i >= items.len() {
                        let len = i.checked_add(1).ok_or(ValueError::ArrayTooLarge(i))?;
                        grow(items, len)?;
                    }
                    items[i] = value;
                }
                ArrayKey::Length => {
                    let len = array_length(&value)?;
                    grow(items, len)?;
                    items.truncate(len);
                }
                ArrayKey::Named(n) => {
                    named.insert(n, value);
                }
            },
            _ => {}
        }
        Ok(())
    }

    /// Untracked existence check. Array indices exist below the length.
    pub fn has_raw(&self, key: &PropKey) -> bool {
        match &*self.0.data.borrow() {
            TargetData::Object(m) => m.contains_key(&key.name()),
            TargetData::Array { items, named } => match key.array_key() {
                ArrayKey::Index(i) => i < items.len(),
                ArrayKey::Length => true,
                ArrayKey::Named(n) => named.contains_key(&n),
            },
            _ => false,
        }
    }

    /// Untracked removal. Array slots are left as holes (`Undefined`).
    pub fn delete_raw(&self, key: &PropKey) -> Option<Value> {
        match &mut *self.0.data.borrow_mut() {
            TargetData::Object(m) => m.shift_remove(&key.name()),
            TargetData::Array { items, named } => match key.array_key() {
                ArrayKey::Index(i) if i < items.len() => Some(std::mem::take(&mut items[i])),
                ArrayKey::Named(n) => named.shift_remove(&n),
                _ => None,
            },
            _ => None,
        }
    }

    /// Own enumerable keys of objects and arrays, in insertion order. Array
    /// indices come before named properties.
    pub fn keys_raw(&self) -> Vec<PropKey> {
        match &*self.0.data.borrow() {
            TargetData::Object(m) => m.keys().cloned().map(PropKey::Name).collect(),
            TargetData::Array { items, named } => (0..items.len())
                .map(PropKey::Index)
                .chain(named.keys().cloned().map(PropKey::Name))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Snapshot of every stored value, in iteration order. Arrays yield their
    /// elements, map entries their values, sets their members.
    pub fn values_raw(&self) -> Vec<Value> {
        match &*self.0.data.borrow() {
            TargetData::Object(m) => m.values().cloned().collect(),
            TargetData::Array { items, .. } => items.clone(),
            TargetData::Map(m) => m.values().map(|(_, v)| v.clone()).collect(),
            TargetData::Set(s) => s.values().cloned().collect(),
            TargetData::WeakMap(m) => m.values().map(|(_, v)| v.clone()).collect(),
            TargetData::WeakSet(_) => Vec::new(),
        }
    }

    pub(crate) fn dep(&self, key: &TrackKey) -> Option<Rc<Dep>> {
        self.0.deps.borrow().get(key).cloned()
    }

    pub(crate) fn dep_or_insert(&self, key: TrackKey) -> Rc<Dep> {
        self.0
            .deps
            .borrow_mut()
            .entry(key)
            .or_insert_with(Dep::new)
            .clone()
    }

    pub(crate) fn has_deps(&self) -> bool {
        !self.0.deps.borrow().is_empty()
    }

    pub(crate) fn deps_where(&self, mut pred: impl FnMut(&TrackKey) -> bool) -> Vec<Rc<Dep>> {
        self.0
            .deps
            .borrow()
            .iter()
            .filter(|(k, _)| pred(k))
            .map(|(_, d)| d.clone())
            .collect()
    }

    pub(crate) fn wrapper(&self, kind: ProxyKind) -> Option<Proxy> {
        self.0.wrappers.borrow()[kind.slot()].upgrade().map(Proxy)
    }

    pub(crate) fn set_wrapper(&self, kind: ProxyKind, proxy: &Proxy) {
        self.0.wrappers.borrow_mut()[kind.slot()] = Rc::downgrade(&proxy.0);
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Target::{:?}({} entries @ {:#x})",
            self.kind(),
            self.raw_len(),
            self.addr()
        )
    }
}
