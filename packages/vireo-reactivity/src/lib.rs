pub mod base_handlers;
pub mod collection_handlers;
pub mod computed;
pub mod dependency;
pub mod effect;
pub mod effect_scope;
pub mod operations;
pub mod reactive;
pub mod refs;
pub mod target;
pub mod value;

pub use computed::{computed, writable_computed, Computed};
pub use dependency::{
    enable_tracking, pause_tracking, reset_tracking, should_track, track, trigger, Dep,
    MAX_MARKER_BITS,
};
pub use effect::{
    active_effect, effect, stop, EffectId, EffectOptions, EffectRunner, ReactiveEffect,
    WeakEffect,
};
pub use effect_scope::{effect_scope, get_current_scope, on_scope_dispose, EffectScope};
pub use operations::{DebuggerEvent, DebuggerOp, TrackOp, TriggerOp};
pub use reactive::{
    is_proxy, is_reactive, is_readonly, is_shallow, mark_raw, reactive, readonly,
    shallow_reactive, shallow_readonly, to_raw, to_reactive, to_readonly, Proxy, ProxyKind,
    ReactiveFlag,
};
pub use refs::{
    create_custom_ref, create_ref, create_shallow_ref, getter_ref, is_ref, to_ref,
    to_ref_with_default, to_refs, trigger_ref, unref, Ref, RefImpl,
};
pub use target::{PropKey, Target, TargetKind, TrackKey, MAX_ARRAY_INDEX};
pub use value::{has_changed, Callback, Value, ValueError, ValueKey};
