//! Component definitions and live instances.
//!
//! A component's setup runs once per instance and returns its render
//! closure. The renderer wraps that closure in a render effect whose
//! scheduler queues the instance's update job, so state read during render
//! re-renders the component on the next flush.

use crate::app::AppContext;
use crate::vnode::{comment, Slot, Slots, VNode};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU32, Ordering};
use vireo_reactivity::{
    pause_tracking, reset_tracking, shallow_reactive, shallow_readonly, EffectScope, PropKey,
    ReactiveEffect, Target, Value,
};
use vireo_scheduler::{call_with_error_handling, queue_post_flush_cbs, warn, ErrorCode, Job};

pub type RenderFn = Rc<dyn Fn() -> VNode>;
type SetupFn = Rc<dyn Fn(&SetupContext) -> RenderFn>;
pub type Hook = Rc<dyn Fn()>;

struct ComponentDef {
    name: Rc<str>,
    setup: SetupFn,
}

/// A component definition. Two nodes are the same component when they
/// point at the same definition.
#[derive(Clone)]
pub struct Component(Rc<ComponentDef>);

impl Component {
    pub fn new<F, R>(name: &str, setup: F) -> Self
    where
        F: Fn(&SetupContext) -> R + 'static,
        R: Fn() -> VNode + 'static,
    {
        Self(Rc::new(ComponentDef {
            name: Rc::from(name),
            setup: Rc::new(move |ctx| Rc::new(setup(ctx)) as RenderFn),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.0.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    BeforeUnmount,
    Unmounted,
}

/// One level of provided values. Lookups fall through to the parent.
pub(crate) struct ProvideScope {
    values: RefCell<FxHashMap<Rc<str>, Value>>,
    parent: Option<Rc<ProvideScope>>,
}

impl ProvideScope {
    pub(crate) fn new(parent: Option<Rc<ProvideScope>>) -> Rc<Self> {
        Rc::new(Self {
            values: RefCell::new(FxHashMap::default()),
            parent,
        })
    }

    pub(crate) fn insert(&self, key: Rc<str>, value: Value) {
        self.values.borrow_mut().insert(key, value);
    }

    pub(crate) fn lookup(&self, key: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(s) = scope {
            if let Some(value) = s.values.borrow().get(key) {
                return Some(value.clone());
            }
            scope = s.parent.as_deref();
        }
        None
    }
}

fn next_uid() -> u32 {
    static UID: AtomicU32 = AtomicU32::new(0);
    UID.fetch_add(1, Ordering::Relaxed)
}

pub(crate) struct InstanceInner {
    uid: u32,
    component: Component,
    vnode: RefCell<VNode>,
    /// The parent's newer vnode, set while an update from above is pending.
    next: RefCell<Option<VNode>>,
    sub_tree: RefCell<Option<VNode>>,
    props: Value,
    slots: RefCell<Slots>,
    parent: Option<Weak<InstanceInner>>,
    app: AppContext,
    parent_provides: Rc<ProvideScope>,
    own_provides: RefCell<Option<Rc<ProvideScope>>>,
    scope: EffectScope,
    effect: RefCell<Option<ReactiveEffect>>,
    job: RefCell<Option<Job>>,
    render: RefCell<Option<RenderFn>>,
    hooks: RefCell<FxHashMap<LifecycleHook, Vec<Hook>>>,
    is_mounted: Cell<bool>,
    is_unmounted: Cell<bool>,
}

#[derive(Clone)]
pub struct ComponentInstance(Rc<InstanceInner>);

/// Non-owning handle held by closures the instance itself owns.
#[derive(Clone)]
pub(crate) struct WeakInstance(Weak<InstanceInner>);

impl WeakInstance {
    pub(crate) fn upgrade(&self) -> Option<ComponentInstance> {
        self.0.upgrade().map(ComponentInstance)
    }
}

impl ComponentInstance {
    pub(crate) fn new(
        component: &Component,
        vnode: &VNode,
        parent: Option<&ComponentInstance>,
        app: AppContext,
    ) -> Self {
        let parent_provides = match parent {
            Some(p) => p.provides(),
            None => app.provides(),
        };
        let props = Target::object(
            vnode
                .props()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Self(Rc::new(InstanceInner {
            uid: next_uid(),
            component: component.clone(),
            vnode: RefCell::new(vnode.clone()),
            next: RefCell::new(None),
            sub_tree: RefCell::new(None),
            props: shallow_reactive(props),
            slots: RefCell::new(vnode.slots()),
            parent: parent.map(|p| Rc::downgrade(&p.0)),
            app,
            parent_provides,
            own_provides: RefCell::new(None),
            scope: EffectScope::new(true),
            effect: RefCell::new(None),
            job: RefCell::new(None),
            render: RefCell::new(None),
            hooks: RefCell::new(FxHashMap::default()),
            is_mounted: Cell::new(false),
            is_unmounted: Cell::new(false),
        }))
    }

    /// Creation-ordered id; also the priority of the update job, so
    /// parents always re-render before their children.
    pub fn uid(&self) -> u32 {
        self.0.uid
    }

    pub fn name(&self) -> &str {
        self.0.component.name()
    }

    /// The shallow-reactive props object.
    pub fn props(&self) -> Value {
        self.0.props.clone()
    }

    pub fn vnode(&self) -> VNode {
        self.0.vnode.borrow().clone()
    }

    pub(crate) fn set_vnode(&self, vnode: VNode) {
        *self.0.vnode.borrow_mut() = vnode;
    }

    pub(crate) fn take_next(&self) -> Option<VNode> {
        self.0.next.borrow_mut().take()
    }

    pub(crate) fn set_next(&self, next: Option<VNode>) {
        *self.0.next.borrow_mut() = next;
    }

    pub fn sub_tree(&self) -> Option<VNode> {
        self.0.sub_tree.borrow().clone()
    }

    pub(crate) fn replace_sub_tree(&self, tree: VNode) -> Option<VNode> {
        self.0.sub_tree.borrow_mut().replace(tree)
    }

    pub fn parent(&self) -> Option<ComponentInstance> {
        self.0.parent.as_ref()?.upgrade().map(ComponentInstance)
    }

    pub fn app_context(&self) -> &AppContext {
        &self.0.app
    }

    pub fn scope(&self) -> &EffectScope {
        &self.0.scope
    }

    pub fn effect(&self) -> Option<ReactiveEffect> {
        self.0.effect.borrow().clone()
    }

    /// The update job queued whenever render dependencies change.
    pub fn job(&self) -> Option<Job> {
        self.0.job.borrow().clone()
    }

    pub(crate) fn set_render_effect(&self, effect: ReactiveEffect, job: Job) {
        *self.0.effect.borrow_mut() = Some(effect);
        *self.0.job.borrow_mut() = Some(job);
    }

    pub fn is_mounted(&self) -> bool {
        self.0.is_mounted.get()
    }

    pub(crate) fn set_mounted(&self) {
        self.0.is_mounted.set(true);
    }

    pub fn is_unmounted(&self) -> bool {
        self.0.is_unmounted.get()
    }

    pub fn ptr_eq(&self, other: &ComponentInstance) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.0))
    }

    fn provides(&self) -> Rc<ProvideScope> {
        match &*self.0.own_provides.borrow() {
            Some(own) => own.clone(),
            None => self.0.parent_provides.clone(),
        }
    }

    fn provide(&self, key: Rc<str>, value: Value) {
        self.0
            .own_provides
            .borrow_mut()
            .get_or_insert_with(|| ProvideScope::new(Some(self.0.parent_provides.clone())))
            .insert(key, value);
    }

    /// Runs setup inside the instance scope and keeps the returned render
    /// closure. A panicking setup leaves the component rendering a comment.
    pub(crate) fn setup(&self) {
        let ctx = SetupContext {
            instance: self.downgrade(),
        };
        let prev = set_current_instance(Some(self.clone()));
        pause_tracking();
        let render = self
            .0
            .scope
            .run(|| {
                call_with_error_handling(ErrorCode::SetupFunction, || (self.0.component.0.setup)(&ctx))
            })
            .flatten();
        reset_tracking();
        set_current_instance(prev);
        *self.0.render.borrow_mut() = render;
    }

    /// Produces the next sub tree. Render failures yield an empty comment.
    pub(crate) fn render_root(&self) -> VNode {
        let render = self.0.render.borrow().clone();
        let prev = set_current_instance(Some(self.clone()));
        let tree = render.and_then(|render| call_with_error_handling(ErrorCode::RenderFunction, || render()));
        set_current_instance(prev);
        match tree {
            Some(tree) if tree.is_mounted() => tree.clone_vnode(),
            Some(tree) => tree,
            None => comment(""),
        }
    }

    /// Writes the props of a newer vnode into the props object. Removed
    /// props are deleted so readers of them are notified too.
    pub(crate) fn update_props(&self, next: &VNode) {
        let Some(props) = self.0.props.as_proxy() else {
            return;
        };
        for (key, value) in next.props() {
            props.set(key.clone(), value.clone());
        }
        for key in props.target().keys_raw() {
            if let PropKey::Name(name) = &key {
                if !next.props().contains_key(name) {
                    props.delete(key.clone());
                }
            }
        }
        *self.0.slots.borrow_mut() = next.slots();
    }

    fn hooks(&self, kind: LifecycleHook) -> Vec<Hook> {
        self.0.hooks.borrow().get(&kind).cloned().unwrap_or_default()
    }

    /// Runs the hooks of `kind` now.
    pub(crate) fn run_hooks(&self, kind: LifecycleHook) {
        for hook in self.hooks(kind) {
            call_hook(&hook);
        }
    }

    /// Runs the hooks of `kind` after the current flush has patched the tree.
    pub(crate) fn queue_hooks(&self, kind: LifecycleHook) {
        let hooks = self.hooks(kind);
        if !hooks.is_empty() {
            queue_post_flush_cbs(hooks.into_iter().map(|hook| Job::new(move || call_hook(&hook))));
        }
    }

    pub(crate) fn queue_unmounted(&self) {
        self.queue_hooks(LifecycleHook::Unmounted);
        let instance = Rc::downgrade(&self.0);
        queue_post_flush_cbs([Job::new(move || {
            if let Some(instance) = instance.upgrade() {
                instance.is_unmounted.set(true);
            }
        })]);
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("uid", &self.uid())
            .field("name", &self.name())
            .field("mounted", &self.is_mounted())
            .finish()
    }
}

fn call_hook(hook: &Hook) {
    pause_tracking();
    call_with_error_handling(ErrorCode::LifecycleHook, || hook());
    reset_tracking();
}

thread_local! {
    static CURRENT_INSTANCE: RefCell<Option<ComponentInstance>> = const { RefCell::new(None) };
}

fn set_current_instance(instance: Option<ComponentInstance>) -> Option<ComponentInstance> {
    CURRENT_INSTANCE.with(|current| current.replace(instance))
}

/// The instance whose setup or render is running.
pub fn get_current_instance() -> Option<ComponentInstance> {
    CURRENT_INSTANCE.with(|current| current.borrow().clone())
}

/// What a component's setup gets to work with. Cheap to clone, and safe to
/// keep in the render closure: it does not keep the instance alive.
#[derive(Clone)]
pub struct SetupContext {
    instance: WeakInstance,
}

impl SetupContext {
    /// Props as a read-only view; reads are tracked.
    pub fn props(&self) -> Value {
        self.instance
            .upgrade()
            .map(|instance| shallow_readonly(instance.props()))
            .unwrap_or_default()
    }

    pub fn slot(&self, name: &str) -> Option<Slot> {
        let instance = self.instance.upgrade()?;
        let slot = instance.0.slots.borrow().get(name).cloned();
        slot
    }

    /// Renders a slot with the given slot props; a missing slot renders
    /// nothing.
    pub fn render_slot(&self, name: &str, props: &Value) -> Vec<VNode> {
        self.slot(name).map(|slot| slot(props)).unwrap_or_default()
    }

    /// Calls the `on<Event>` prop handler, if the parent passed one.
    pub fn emit(&self, event: &str, args: &[Value]) {
        let Some(instance) = self.instance.upgrade() else {
            return;
        };
        let mut chars = event.chars();
        let handler_name = match chars.next() {
            Some(first) => format!("on{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => return,
        };
        if let Value::Func(handler) = instance.vnode().prop(&handler_name) {
            call_with_error_handling(ErrorCode::EventHandler, || handler.call(args));
        }
    }

    pub fn instance(&self) -> Option<ComponentInstance> {
        self.instance.upgrade()
    }
}

fn inject_hook(kind: LifecycleHook, hook: Hook) {
    match get_current_instance() {
        Some(instance) => instance.0.hooks.borrow_mut().entry(kind).or_default().push(hook),
        None => warn(format_args!(
            "{kind:?} hook registered with no active component instance"
        )),
    }
}

pub fn on_before_mount(f: impl Fn() + 'static) {
    inject_hook(LifecycleHook::BeforeMount, Rc::new(f));
}

pub fn on_mounted(f: impl Fn() + 'static) {
    inject_hook(LifecycleHook::Mounted, Rc::new(f));
}

pub fn on_before_update(f: impl Fn() + 'static) {
    inject_hook(LifecycleHook::BeforeUpdate, Rc::new(f));
}

pub fn on_updated(f: impl Fn() + 'static) {
    inject_hook(LifecycleHook::Updated, Rc::new(f));
}

pub fn on_before_unmount(f: impl Fn() + 'static) {
    inject_hook(LifecycleHook::BeforeUnmount, Rc::new(f));
}

pub fn on_unmounted(f: impl Fn() + 'static) {
    inject_hook(LifecycleHook::Unmounted, Rc::new(f));
}

/// Makes `value` available to every descendant of the current component.
pub fn provide(key: &str, value: impl Into<Value>) {
    match get_current_instance() {
        Some(instance) => instance.provide(Rc::from(key), value.into()),
        None => warn("provide() can only be used inside setup()"),
    }
}

/// Looks `key` up through the ancestors' provides and then the app's.
pub fn inject(key: &str) -> Option<Value> {
    let Some(instance) = get_current_instance() else {
        warn("inject() can only be used inside setup() or render");
        return None;
    };
    let found = instance.0.parent_provides.lookup(key);
    if found.is_none() {
        warn(format_args!("injection \"{key}\" not found"));
    }
    found
}

pub fn inject_or(key: &str, default: impl Into<Value>) -> Value {
    let Some(instance) = get_current_instance() else {
        warn("inject() can only be used inside setup() or render");
        return default.into();
    };
    instance
        .0
        .parent_provides
        .lookup(key)
        .unwrap_or_else(|| default.into())
}
