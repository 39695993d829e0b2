//! Method-level instrumentation for Map, Set, WeakMap and WeakSet wrappers.
//!
//! Collections may hold reactive wrappers as keys, so lookups try the key as
//! given and then its raw form, and track both.

use crate::dependency::{track, trigger};
use crate::operations::{TrackOp, TriggerOp};
use crate::reactive::{to_raw, Proxy};
use crate::target::{Target, TargetData, TargetKind, TrackKey, WeakObject};
use crate::value::{has_changed, Value, ValueKey};

fn entry_key(key: &Value) -> TrackKey {
    TrackKey::Entry(ValueKey::of(key))
}

fn prune(target: &Target) {
    if target.kind().is_weak() {
        target.0.data.borrow_mut().prune_dead_keys();
    }
}

fn contains(target: &Target, key: &Value) -> bool {
    let k = ValueKey::of(key);
    match &*target.0.data.borrow() {
        TargetData::Map(m) => m.contains_key(&k),
        TargetData::Set(s) => s.contains_key(&k),
        TargetData::WeakMap(m) => m.contains_key(&k),
        TargetData::WeakSet(s) => s.contains_key(&k),
        _ => false,
    }
}

fn lookup(target: &Target, key: &Value) -> Option<Value> {
    let k = ValueKey::of(key);
    match &*target.0.data.borrow() {
        TargetData::Map(m) => m.get(&k).map(|(_, v)| v.clone()),
        TargetData::WeakMap(m) => m.get(&k).map(|(_, v)| v.clone()),
        _ => None,
    }
}

/// Snapshot of `(key, value)` pairs. Set members are their own keys.
fn entries_raw(target: &Target) -> Vec<(Value, Value)> {
    match &*target.0.data.borrow() {
        TargetData::Map(m) => m.values().cloned().collect(),
        TargetData::Set(s) => s.values().map(|v| (v.clone(), v.clone())).collect(),
        _ => Vec::new(),
    }
}

impl Proxy {
    fn warn_readonly(&self, op: &str, key: Option<&Value>) {
        match key {
            Some(key) => {
                tracing::warn!("{op} operation on key \"{key}\" failed: target is readonly.")
            }
            None => tracing::warn!("{op} operation failed: target is readonly."),
        }
    }

    fn weak_key_rejected(&self, key: &Value) -> bool {
        if self.target_kind().is_weak() && !key.is_object() {
            tracing::warn!("invalid value used as weak collection key: {key:?}");
            return true;
        }
        false
    }

    fn iterable(&self) -> bool {
        if self.target_kind().is_weak() {
            tracing::warn!("weak collections are not iterable");
            return false;
        }
        true
    }

    /// `Map.get`: tracked lookup by the key and by its raw form.
    pub fn map_get(&self, key: impl Into<Value>) -> Value {
        let key = key.into();
        if let Some(source) = self.source() {
            return self.wrap_nested(source.map_get(key));
        }
        let target = self.target();
        prune(target);
        let raw_key = to_raw(&key);
        if !self.is_readonly() {
            if !key.same_value_zero(&raw_key) {
                track(target, TrackOp::Get, entry_key(&key));
            }
            track(target, TrackOp::Get, entry_key(&raw_key));
        }
        lookup(target, &key)
            .or_else(|| lookup(target, &raw_key))
            .map(|v| self.wrap_nested(v))
            .unwrap_or_default()
    }

    /// `Map.set`: stores the raw value; triggers ADD for a new key and SET
    /// when an existing key's value changed.
    pub fn map_set(&self, key: impl Into<Value>, value: impl Into<Value>) {
        let mut key = key.into();
        let value = to_raw(&value.into());
        if self.is_readonly() {
            self.warn_readonly("set", Some(&key));
            return;
        }
        if self.weak_key_rejected(&key) {
            return;
        }
        let target = self.target();
        prune(target);
        let mut had_key = contains(target, &key);
        if !had_key {
            key = to_raw(&key);
            had_key = contains(target, &key);
        }
        let old = lookup(target, &key);
        let k = ValueKey::of(&key);
        match &mut *target.0.data.borrow_mut() {
            TargetData::Map(m) => {
                m.insert(k, (key.clone(), value.clone()));
            }
            TargetData::WeakMap(m) => {
                if let Some(weak) = WeakObject::from_value(&key) {
                    m.insert(k, (weak, value.clone()));
                }
            }
            _ => {
                tracing::warn!("map_set called on a {:?} target", self.target_kind());
                return;
            }
        }
        if !had_key {
            trigger(target, TriggerOp::Add, Some(entry_key(&key)), Some(&value), None);
        } else {
            let old = old.unwrap_or_default();
            if has_changed(&value, &old) {
                trigger(target, TriggerOp::Set, Some(entry_key(&key)), Some(&value), Some(&old));
            }
        }
    }

    /// `Map.has` / `Set.has`.
    pub fn collection_has(&self, key: impl Into<Value>) -> bool {
        let key = key.into();
        if let Some(source) = self.source() {
            return source.collection_has(key);
        }
        let target = self.target();
        prune(target);
        let raw_key = to_raw(&key);
        if !self.is_readonly() {
            if !key.same_value_zero(&raw_key) {
                track(target, TrackOp::Has, entry_key(&key));
            }
            track(target, TrackOp::Has, entry_key(&raw_key));
        }
        contains(target, &key) || contains(target, &raw_key)
    }

    /// `Set.add`. Stores the raw value and triggers ADD when it is new.
    pub fn add(&self, value: impl Into<Value>) {
        let value = to_raw(&value.into());
        if self.is_readonly() {
            self.warn_readonly("add", Some(&value));
            return;
        }
        if self.weak_key_rejected(&value) {
            return;
        }
        let target = self.target();
        prune(target);
        if contains(target, &value) {
            return;
        }
        let k = ValueKey::of(&value);
        match &mut *target.0.data.borrow_mut() {
            TargetData::Set(s) => {
                s.insert(k, value.clone());
            }
            TargetData::WeakSet(s) => {
                if let Some(weak) = WeakObject::from_value(&value) {
                    s.insert(k, weak);
                }
            }
            _ => {
                tracing::warn!("add called on a {:?} target", self.target_kind());
                return;
            }
        }
        trigger(target, TriggerOp::Add, Some(entry_key(&value)), Some(&value), None);
    }

    /// `Map.delete` / `Set.delete`. Returns whether the key was present.
    pub fn collection_delete(&self, key: impl Into<Value>) -> bool {
        let mut key = key.into();
        if self.is_readonly() {
            self.warn_readonly("delete", Some(&key));
            return false;
        }
        let target = self.target();
        prune(target);
        let mut had_key = contains(target, &key);
        if !had_key {
            key = to_raw(&key);
            had_key = contains(target, &key);
        }
        if !had_key {
            return false;
        }
        let old = lookup(target, &key);
        let k = ValueKey::of(&key);
        match &mut *target.0.data.borrow_mut() {
            TargetData::Map(m) => {
                m.shift_remove(&k);
            }
            TargetData::Set(s) => {
                s.shift_remove(&k);
            }
            TargetData::WeakMap(m) => {
                m.shift_remove(&k);
            }
            TargetData::WeakSet(s) => {
                s.shift_remove(&k);
            }
            _ => {}
        }
        trigger(target, TriggerOp::Delete, Some(entry_key(&key)), None, old.as_ref());
        true
    }

    /// Empties the collection, notifying every dependency of the target.
    pub fn clear(&self) {
        if self.is_readonly() {
            self.warn_readonly("clear", None);
            return;
        }
        let target = self.target();
        prune(target);
        let had_items = target.raw_len() != 0;
        match &mut *target.0.data.borrow_mut() {
            TargetData::Map(m) => m.clear(),
            TargetData::Set(s) => s.clear(),
            TargetData::WeakMap(m) => m.clear(),
            TargetData::WeakSet(s) => s.clear(),
            _ => {
                tracing::warn!("clear called on a {:?} target", self.target_kind());
                return;
            }
        }
        if had_items {
            trigger(target, TriggerOp::Clear, None, None, None);
        }
    }

    pub fn size(&self) -> usize {
        if let Some(source) = self.source() {
            return source.size();
        }
        if !self.iterable() {
            return 0;
        }
        let target = self.target();
        if !self.is_readonly() {
            track(target, TrackOp::Iterate, TrackKey::Iterate);
        }
        target.raw_len()
    }

    fn iterate(&self, key: TrackKey) -> Vec<(Value, Value)> {
        let target = self.target();
        if !self.is_readonly() {
            track(target, TrackOp::Iterate, key);
        }
        entries_raw(target)
    }

    /// Calls `f(value, key)` for every entry, with both wrapped as deep.
    pub fn for_each(&self, mut f: impl FnMut(Value, Value)) {
        self.for_each_dyn(&mut f)
    }

    fn for_each_dyn(&self, f: &mut dyn FnMut(Value, Value)) {
        if let Some(source) = self.source() {
            return source.for_each_dyn(&mut |v, k| f(self.wrap_nested(v), self.wrap_nested(k)));
        }
        if !self.iterable() {
            return;
        }
        for (k, v) in self.iterate(TrackKey::Iterate) {
            f(self.wrap_nested(v), self.wrap_nested(k));
        }
    }

    /// Map keys only depend on the key set, not on values.
    pub fn keys(&self) -> Vec<Value> {
        if let Some(source) = self.source() {
            return source.keys().into_iter().map(|k| self.wrap_nested(k)).collect();
        }
        if !self.iterable() {
            return Vec::new();
        }
        let marker = if self.target_kind() == TargetKind::Map {
            TrackKey::MapKeyIterate
        } else {
            TrackKey::Iterate
        };
        self.iterate(marker)
            .into_iter()
            .map(|(k, _)| self.wrap_nested(k))
            .collect()
    }

    pub fn values(&self) -> Vec<Value> {
        if let Some(source) = self.source() {
            return source.values().into_iter().map(|v| self.wrap_nested(v)).collect();
        }
        if !self.iterable() {
            return Vec::new();
        }
        self.iterate(TrackKey::Iterate)
            .into_iter()
            .map(|(_, v)| self.wrap_nested(v))
            .collect()
    }

    pub fn entries(&self) -> Vec<(Value, Value)> {
        if let Some(source) = self.source() {
            return source
                .entries()
                .into_iter()
                .map(|(k, v)| (self.wrap_nested(k), self.wrap_nested(v)))
                .collect();
        }
        if !self.iterable() {
            return Vec::new();
        }
        self.iterate(TrackKey::Iterate)
            .into_iter()
            .map(|(k, v)| (self.wrap_nested(k), self.wrap_nested(v)))
            .collect()
    }
}
