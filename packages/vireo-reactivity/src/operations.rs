use crate::effect::{EffectId, ReactiveEffect};
use crate::target::TrackKey;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebuggerOp {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// Payload handed to `on_track` / `on_trigger` hooks.
#[derive(Clone, Debug)]
pub struct DebuggerEvent {
    pub effect: EffectId,
    pub op: DebuggerOp,
    pub key: Option<TrackKey>,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

impl DebuggerEvent {
    pub(crate) fn track(effect: &ReactiveEffect, op: TrackOp, key: Option<TrackKey>) -> Self {
        Self {
            effect: effect.id(),
            op: DebuggerOp::Track(op),
            key,
            new_value: None,
            old_value: None,
        }
    }

    pub(crate) fn trigger(
        effect: &ReactiveEffect,
        op: TriggerOp,
        key: Option<TrackKey>,
        new_value: Option<Value>,
        old_value: Option<Value>,
    ) -> Self {
        Self {
            effect: effect.id(),
            op: DebuggerOp::Trigger(op),
            key,
            new_value,
            old_value,
        }
    }
}
