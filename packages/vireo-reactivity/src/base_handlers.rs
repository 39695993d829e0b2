//! Property access on reactive objects and arrays.

use crate::dependency::{track, trigger, PauseTracking};
use crate::operations::{TrackOp, TriggerOp};
use crate::reactive::{is_readonly, is_shallow, to_raw, Proxy};
use crate::target::{PropKey, TargetKind, TrackKey};
use crate::value::{has_changed, Value};

impl Proxy {
    /// Tracked property read.
    ///
    /// Deep variants unwrap refs (except array elements, which keep the
    /// ref) and wrap nested containers on the way out.
    pub fn get(&self, key: impl Into<PropKey>) -> Value {
        let key = key.into();
        if let Some(source) = self.source() {
            let value = source.get(key);
            return self.wrap_nested(value);
        }
        let target = self.target();
        if !self.is_readonly() {
            track(target, TrackOp::Get, self.track_key(&key));
        }
        let res = target.get_raw(&key);
        if self.is_shallow() {
            return res;
        }
        if let Value::Ref(r) = &res {
            let is_index = matches!(self.track_key(&key), TrackKey::Index(_));
            return if self.target_kind() == TargetKind::Array && is_index {
                res
            } else {
                r.get()
            };
        }
        self.wrap_nested(res)
    }

    /// Property write. Always reports success on readonly wrappers (after a
    /// warning). Returns `false` when a readonly ref would be replaced or
    /// the array rejects the key or length.
    pub fn set(&self, key: impl Into<PropKey>, value: impl Into<Value>) -> bool {
        let key = key.into();
        let mut value = value.into();
        if self.is_readonly() {
            tracing::warn!("set operation on key \"{key}\" failed: target is readonly.");
            return true;
        }
        let target = self.target();
        let is_array = self.target_kind() == TargetKind::Array;
        let mut old = target.get_raw(&key);

        if !self.is_shallow() {
            if is_readonly(&old) && matches!(old, Value::Ref(_)) && !matches!(value, Value::Ref(_))
            {
                return false;
            }
            if !is_shallow(&value) && !is_readonly(&value) {
                old = to_raw(&old);
                value = to_raw(&value);
            }
            if !is_array {
                if let (Value::Ref(r), false) = (&old, matches!(value, Value::Ref(_))) {
                    r.set(value);
                    return true;
                }
            }
        }

        let track_key = self.track_key(&key);
        let had_key = target.has_raw(&key);
        if let Err(err) = target.set_raw(key.clone(), value.clone()) {
            tracing::warn!("set operation on key \"{key}\" failed: {err}.");
            return false;
        }
        if !had_key {
            trigger(target, TriggerOp::Add, Some(track_key), Some(&value), None);
        } else if has_changed(&value, &old) {
            if track_key == TrackKey::Length {
                // The stored length is the source of truth after resizing.
                let len = Value::from(target.raw_len());
                trigger(target, TriggerOp::Set, Some(track_key), Some(&len), Some(&old));
            } else {
                trigger(target, TriggerOp::Set, Some(track_key), Some(&value), Some(&old));
            }
        }
        true
    }

    /// Removes a property. Returns whether it existed.
    pub fn delete(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        if self.is_readonly() {
            tracing::warn!("delete operation on key \"{key}\" failed: target is readonly.");
            return true;
        }
        let target = self.target();
        let had_key = target.has_raw(&key);
        let track_key = self.track_key(&key);
        let old = target.delete_raw(&key);
        if had_key {
            trigger(target, TriggerOp::Delete, Some(track_key), None, old.as_ref());
        }
        had_key
    }

    /// Tracked existence check.
    pub fn has(&self, key: impl Into<PropKey>) -> bool {
        let key = key.into();
        if let Some(source) = self.source() {
            return source.has(key);
        }
        let target = self.target();
        let result = target.has_raw(&key);
        if !self.is_readonly() {
            track(target, TrackOp::Has, self.track_key(&key));
        }
        result
    }

    /// Enumeration depends on the key-set shape, so it tracks the `length`
    /// of arrays and the iterate marker of objects.
    pub fn own_keys(&self) -> Vec<PropKey> {
        if let Some(source) = self.source() {
            return source.own_keys();
        }
        let target = self.target();
        if !self.is_readonly() {
            let key = if self.target_kind() == TargetKind::Array {
                TrackKey::Length
            } else {
                TrackKey::Iterate
            };
            track(target, TrackOp::Iterate, key);
        }
        target.keys_raw()
    }

    /// Every value in key order, read through [`Proxy::get`].
    pub fn to_vec(&self) -> Vec<Value> {
        self.own_keys().into_iter().map(|k| self.get(k)).collect()
    }

    pub fn len(&self) -> usize {
        self.get("length").as_f64().unwrap_or_default() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_len(&self, len: usize) -> bool {
        self.set("length", len)
    }

    /// Tracks every index and the length, then searches the raw elements
    /// for `value`, retrying with its raw form when the first pass misses.
    fn search(&self, value: &Value, pos: impl Fn(&[Value], &Value) -> Option<usize>) -> Option<usize> {
        if let Some(source) = self.source() {
            return source.search(value, pos);
        }
        let target = self.target();
        if !self.is_readonly() {
            track(target, TrackOp::Get, TrackKey::Length);
            for i in 0..target.raw_len() {
                track(target, TrackOp::Get, TrackKey::Index(i));
            }
        }
        let items = target.values_raw();
        pos(&items, value).or_else(|| pos(&items, &to_raw(value)))
    }

    pub fn includes(&self, value: impl Into<Value>) -> bool {
        self.search(&value.into(), |items, v| {
            items.iter().position(|item| item.same_value_zero(v))
        })
        .is_some()
    }

    pub fn index_of(&self, value: impl Into<Value>) -> Option<usize> {
        self.search(&value.into(), |items, v| {
            items.iter().position(|item| item.strict_equals(v))
        })
    }

    pub fn last_index_of(&self, value: impl Into<Value>) -> Option<usize> {
        self.search(&value.into(), |items, v| {
            items.iter().rposition(|item| item.strict_equals(v))
        })
    }

    /// Appends items and returns the new length. Length-mutating methods
    /// run with tracking paused so they never subscribe to `length`.
    pub fn push<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let _pause = PauseTracking::new();
        for item in items {
            let len = self.target().raw_len();
            self.set(len, item);
        }
        self.target().raw_len()
    }

    pub fn pop(&self) -> Value {
        let _pause = PauseTracking::new();
        let len = self.target().raw_len();
        if len == 0 {
            return Value::Undefined;
        }
        let last = self.get(len - 1);
        self.set_len(len - 1);
        last
    }

    pub fn shift(&self) -> Value {
        let _pause = PauseTracking::new();
        let len = self.target().raw_len();
        if len == 0 {
            return Value::Undefined;
        }
        let first = self.get(0);
        for k in 1..len {
            let next = self.target().get_raw(&PropKey::Index(k));
            self.set(k - 1, next);
        }
        self.set_len(len - 1);
        first
    }

    /// Prepends items and returns the new length.
    pub fn unshift<I, V>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let items: Vec<Value> = items.into_iter().map(Into::into).collect();
        let _pause = PauseTracking::new();
        let len = self.target().raw_len();
        let count = items.len();
        if count > 0 {
            for k in (0..len).rev() {
                let moved = self.target().get_raw(&PropKey::Index(k));
                self.set(k + count, moved);
            }
            for (i, item) in items.into_iter().enumerate() {
                self.set(i, item);
            }
        }
        self.target().raw_len()
    }

    /// Removes `delete_count` items at `start`, inserts `items` in their
    /// place and returns the removed items.
    pub fn splice<I, V>(&self, start: usize, delete_count: usize, items: I) -> Vec<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let _pause = PauseTracking::new();
        let current = self.target().values_raw();
        let len = current.len();
        let start = start.min(len);
        let end = start.saturating_add(delete_count).min(len);
        let removed: Vec<Value> = (start..end).map(|i| self.get(i)).collect();

        let mut next: Vec<Value> = Vec::with_capacity(len);
        next.extend_from_slice(&current[..start]);
        next.extend(items.into_iter().map(Into::into));
        next.extend_from_slice(&current[end..]);

        let new_len = next.len();
        for (i, item) in next.into_iter().enumerate() {
            self.set(i, item);
        }
        if new_len < len {
            self.set_len(new_len);
        }
        removed
    }
}
