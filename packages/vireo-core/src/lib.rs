pub mod app;
pub mod component;
mod diff;
pub mod host;
pub mod mutations;
pub mod renderer;
pub mod vnode;
pub mod watch;

pub use app::{create_app, App, AppConfig, AppContext};
pub use component::{
    get_current_instance, inject, inject_or, on_before_mount, on_before_unmount,
    on_before_update, on_mounted, on_unmounted, on_updated, provide, Component,
    ComponentInstance, Hook, LifecycleHook, RenderFn, SetupContext,
};
pub use host::{HostNode, HostOps};
pub use mutations::{HostError, Mutation, RecordingHost};
pub use renderer::{should_update_component, Renderer};
pub use vnode::{
    comment, fragment, h, h_component, is_same_vnode_type, static_content, text, Children,
    PatchFlags, Props, Slot, Slots, VKey, VNode, VNodeBuilder, VNodeType,
};
pub use watch::{
    traverse, watch, watch_effect, watch_post_effect, watch_sync_effect, FlushMode, OnCleanup,
    WatchCallback, WatchHandle, WatchOptions, WatchSource,
};
