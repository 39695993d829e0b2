//! Turns vnode trees into host nodes and keeps them in sync.
//!
//! `patch(old, new)` is the single entry point: with no old node it mounts,
//! with an old node of the same type and key it updates in place, and with a
//! mismatched one it unmounts the old node and mounts the new one where the
//! old one was.

use crate::component::{Component, ComponentInstance, LifecycleHook};
use crate::host::{HostNode, HostOps};
use crate::vnode::{is_same_vnode_type, Children, PatchFlags, Props, VNode, VNodeType};
use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use vireo_reactivity::{has_changed, pause_tracking, reset_tracking, ReactiveEffect, Value};
use vireo_scheduler::{
    call_with_error_handling, flush_post_flush_cbs, flush_pre_flush_cbs, invalidate_job,
    queue_job, warn, ErrorCode, Job,
};

pub(crate) struct RendererInner<H> {
    host: H,
    /// Last tree rendered into each container.
    roots: RefCell<FxHashMap<HostNode, VNode>>,
}

/// Cheap handle; clones share the host and the rendered roots.
pub struct Renderer<H>(pub(crate) Rc<RendererInner<H>>);

impl<H> Clone for Renderer<H> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

type MountTarget = Cell<Option<(HostNode, Option<HostNode>)>>;

impl<H: HostOps + 'static> Renderer<H> {
    pub fn new(host: H) -> Self {
        Self(Rc::new(RendererInner {
            host,
            roots: RefCell::new(FxHashMap::default()),
        }))
    }

    pub fn host(&self) -> &H {
        &self.0.host
    }

    /// The tree currently rendered into `container`.
    pub fn root(&self, container: HostNode) -> Option<VNode> {
        self.0.roots.borrow().get(&container).cloned()
    }

    /// Renders `vnode` into `container`, patching against whatever was
    /// rendered there before. `None` unmounts. Queued pre and post jobs are
    /// flushed before returning, so mounted hooks have run.
    pub fn render(&self, vnode: Option<&VNode>, container: HostNode) {
        let prev = self.root(container);
        match vnode {
            Some(vnode) => self.patch(prev.as_ref(), vnode, container, None, None),
            None => {
                if let Some(prev) = &prev {
                    self.unmount(prev, None, true);
                }
            }
        }
        flush_pre_flush_cbs(None);
        flush_post_flush_cbs();
        let mut roots = self.0.roots.borrow_mut();
        match vnode {
            Some(vnode) => roots.insert(container, vnode.clone()),
            None => roots.remove(&container),
        };
    }

    pub fn patch(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&ComponentInstance>,
    ) {
        let mut anchor = anchor;
        let n1 = match n1 {
            Some(old) if old.ptr_eq(n2) => return,
            Some(old) if !is_same_vnode_type(old, n2) => {
                anchor = self.next_host_node(old);
                self.unmount(old, parent, true);
                None
            }
            other => other,
        };

        match n2.ty() {
            VNodeType::Text => self.process_text(n1, n2, container, anchor),
            VNodeType::Comment => self.process_comment(n1, n2, container, anchor),
            VNodeType::Static => self.process_static(n1, n2, container, anchor),
            VNodeType::Fragment => self.process_fragment(n1, n2, container, anchor, parent),
            VNodeType::Element(tag) => match n1 {
                None => self.mount_element(n2, tag, container, anchor, parent),
                Some(n1) => self.patch_element(n1, n2, parent),
            },
            VNodeType::Component(component) => match n1 {
                None => self.mount_component(n2, component, container, anchor, parent),
                Some(n1) => self.update_component(n1, n2),
            },
        }
    }

    fn process_text(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) {
        let host = self.host();
        let text = n2.text().unwrap_or_default();
        match n1 {
            None => {
                let el = host.create_text(&text);
                n2.set_el(Some(el));
                host.insert(el, container, anchor);
            }
            Some(n1) => {
                n2.set_el(n1.el());
                if let Some(el) = n1.el() {
                    if n1.text().unwrap_or_default() != text {
                        host.set_text(el, &text);
                    }
                }
            }
        }
    }

    fn process_comment(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) {
        match n1 {
            None => {
                let host = self.host();
                let el = host.create_comment(&n2.text().unwrap_or_default());
                n2.set_el(Some(el));
                host.insert(el, container, anchor);
            }
            // Comments are never dynamic.
            Some(n1) => n2.set_el(n1.el()),
        }
    }

    fn process_static(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
    ) {
        match n1 {
            None => self.mount_static(n2, container, anchor),
            Some(n1) if n1.text() == n2.text() => {
                n2.set_el(n1.el());
                n2.set_anchor(n1.anchor());
            }
            Some(n1) => {
                let anchor = self.next_host_node(n1);
                self.remove(n1);
                self.mount_static(n2, container, anchor);
            }
        }
    }

    fn mount_static(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let host = self.host();
        // A single-node block that was mounted before can be copied.
        if let (Some(first), Some(last)) = (vnode.el(), vnode.anchor()) {
            if first == last {
                if let Some(copy) = host.clone_node(first) {
                    host.insert(copy, container, anchor);
                    vnode.set_el(Some(copy));
                    vnode.set_anchor(Some(copy));
                    return;
                }
            }
        }
        let content = vnode.text().unwrap_or_default();
        let (first, last) = host.insert_static_content(&content, container, anchor);
        vnode.set_el(Some(first));
        vnode.set_anchor(Some(last));
    }

    fn process_fragment(
        &self,
        n1: Option<&VNode>,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&ComponentInstance>,
    ) {
        let host = self.host();
        match n1 {
            None => {
                let start = host.create_text("");
                let end = host.create_text("");
                n2.set_el(Some(start));
                n2.set_anchor(Some(end));
                host.insert(start, container, anchor);
                host.insert(end, container, anchor);
                self.mount_children(&n2.normalized_children(), container, Some(end), parent);
            }
            Some(n1) => {
                n2.set_el(n1.el());
                n2.set_anchor(n1.anchor());
                self.patch_children(n1, n2, container, n1.anchor(), parent);
            }
        }
    }

    fn mount_element(
        &self,
        vnode: &VNode,
        tag: &str,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&ComponentInstance>,
    ) {
        let host = self.host();
        let el = host.create_element(tag);
        vnode.set_el(Some(el));

        let text = vnode.text();
        match text {
            Some(text) => host.set_element_text(el, &text),
            None => self.mount_children(&vnode.normalized_children(), el, None, parent),
        }
        for (key, value) in vnode.props() {
            host.patch_prop(el, key, &Value::Undefined, value);
        }
        host.insert(el, container, anchor);
    }

    pub(crate) fn mount_children(
        &self,
        children: &[VNode],
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&ComponentInstance>,
    ) {
        for child in children {
            self.patch(None, child, container, anchor, parent);
        }
    }

    fn patch_element(&self, n1: &VNode, n2: &VNode, parent: Option<&ComponentInstance>) {
        let Some(el) = n1.el() else {
            return;
        };
        n2.set_el(Some(el));
        let host = self.host();
        let flag = n2.patch_flag();
        if flag == PatchFlags::HOISTED {
            return;
        }

        if flag.is_optimized() {
            if flag.contains(PatchFlags::FULL_PROPS) {
                self.patch_props(el, n1.props(), n2.props());
            } else {
                if flag.contains(PatchFlags::CLASS) {
                    let (prev, next) = (n1.prop("class"), n2.prop("class"));
                    if has_changed(&next, &prev) {
                        host.patch_prop(el, "class", &prev, &next);
                    }
                }
                if flag.contains(PatchFlags::STYLE) {
                    host.patch_prop(el, "style", &n1.prop("style"), &n2.prop("style"));
                }
                if flag.contains(PatchFlags::PROPS) {
                    for name in n2.dynamic_props().unwrap_or_default() {
                        let (prev, next) = (n1.prop(name), n2.prop(name));
                        if has_changed(&next, &prev) {
                            host.patch_prop(el, name, &prev, &next);
                        }
                    }
                }
            }
        } else {
            self.patch_props(el, n1.props(), n2.props());
        }

        self.patch_children(n1, n2, el, None, parent);
    }

    fn patch_props(&self, el: HostNode, old: &Props, new: &Props) {
        let host = self.host();
        for (key, next) in new {
            let prev = old.get(key).cloned().unwrap_or_default();
            if has_changed(next, &prev) {
                host.patch_prop(el, key, &prev, next);
            }
        }
        for (key, prev) in old {
            if !new.contains_key(key) {
                host.patch_prop(el, key, prev, &Value::Undefined);
            }
        }
    }

    fn patch_children(
        &self,
        n1: &VNode,
        n2: &VNode,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&ComponentInstance>,
    ) {
        let flag = n2.patch_flag();
        if flag.contains(PatchFlags::KEYED_FRAGMENT) {
            let new = n2.normalized_children();
            self.patch_keyed_children(&n1.child_list(), &new, container, anchor, parent);
            return;
        }
        if flag.contains(PatchFlags::UNKEYED_FRAGMENT) {
            let new = n2.normalized_children();
            self.patch_unkeyed_children(&n1.child_list(), &new, container, anchor, parent);
            return;
        }

        let old = n1.children().clone();
        let new = n2.children().clone();
        let host = self.host();
        match (&old, &new) {
            (_, Children::Text(text)) => {
                if let Children::List(old) = &old {
                    self.unmount_children(old, parent, false);
                }
                if !matches!(&old, Children::Text(prev) if prev == text) {
                    host.set_element_text(container, text);
                }
            }
            (Children::List(old), Children::List(_)) => {
                let new = n2.normalized_children();
                self.patch_keyed_children(old, &new, container, anchor, parent);
            }
            (Children::List(old), _) => self.unmount_children(old, parent, true),
            (Children::Text(_), Children::List(_)) => {
                host.set_element_text(container, "");
                self.mount_children(&n2.normalized_children(), container, anchor, parent);
            }
            (Children::Text(_), _) => host.set_element_text(container, ""),
            (_, Children::List(_)) => {
                self.mount_children(&n2.normalized_children(), container, anchor, parent);
            }
            _ => {}
        }
    }

    /// Tears a node down: components are unmounted first, then the host
    /// nodes are removed when `do_remove` is set. Descendants of a removed
    /// element are not removed one by one.
    pub fn unmount(&self, vnode: &VNode, parent: Option<&ComponentInstance>, do_remove: bool) {
        match vnode.ty() {
            VNodeType::Component(_) => {
                if let Some(instance) = vnode.component() {
                    self.unmount_component(&instance, do_remove);
                }
                return;
            }
            VNodeType::Element(_) | VNodeType::Fragment => {
                self.unmount_children(&vnode.child_list(), parent, false);
            }
            _ => {}
        }
        if do_remove {
            self.remove(vnode);
        }
    }

    pub(crate) fn unmount_children(
        &self,
        children: &[VNode],
        parent: Option<&ComponentInstance>,
        do_remove: bool,
    ) {
        for child in children {
            self.unmount(child, parent, do_remove);
        }
    }

    fn remove(&self, vnode: &VNode) {
        match vnode.ty() {
            VNodeType::Fragment | VNodeType::Static => {
                if let (Some(start), Some(end)) = (vnode.el(), vnode.anchor()) {
                    self.remove_range(start, end);
                }
            }
            _ => {
                if let Some(el) = vnode.el() {
                    self.host().remove(el);
                }
            }
        }
    }

    /// Removes `start`, `end` and every sibling in between.
    fn remove_range(&self, start: HostNode, end: HostNode) {
        let host = self.host();
        let mut current = start;
        loop {
            let next = host.next_sibling(current);
            host.remove(current);
            if current == end {
                break;
            }
            match next {
                Some(next) => current = next,
                None => break,
            }
        }
    }

    /// Relocates the host nodes of a mounted vnode without re-creating them.
    pub fn move_node(&self, vnode: &VNode, container: HostNode, anchor: Option<HostNode>) {
        let host = self.host();
        match vnode.ty() {
            VNodeType::Component(_) => {
                if let Some(tree) = vnode.component().and_then(|c| c.sub_tree()) {
                    self.move_node(&tree, container, anchor);
                }
            }
            VNodeType::Fragment => {
                if let Some(start) = vnode.el() {
                    host.insert(start, container, anchor);
                }
                for child in vnode.child_list() {
                    self.move_node(&child, container, anchor);
                }
                if let Some(end) = vnode.anchor() {
                    host.insert(end, container, anchor);
                }
            }
            VNodeType::Static => {
                let (Some(mut current), Some(end)) = (vnode.el(), vnode.anchor()) else {
                    return;
                };
                loop {
                    let next = host.next_sibling(current);
                    host.insert(current, container, anchor);
                    if current == end {
                        break;
                    }
                    match next {
                        Some(next) => current = next,
                        None => break,
                    }
                }
            }
            _ => {
                if let Some(el) = vnode.el() {
                    host.insert(el, container, anchor);
                }
            }
        }
    }

    /// The host node right after everything `vnode` rendered.
    pub(crate) fn next_host_node(&self, vnode: &VNode) -> Option<HostNode> {
        if let VNodeType::Component(_) = vnode.ty() {
            let tree = vnode.component()?.sub_tree()?;
            return self.next_host_node(&tree);
        }
        self.host().next_sibling(vnode.anchor().or(vnode.el())?)
    }

    fn mount_component(
        &self,
        vnode: &VNode,
        component: &Component,
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&ComponentInstance>,
    ) {
        let app = parent
            .map(|p| p.app_context().clone())
            .or_else(|| vnode.app_context())
            .unwrap_or_default();
        let instance = ComponentInstance::new(component, vnode, parent, app);
        vnode.set_component(Some(instance.clone()));
        tracing::debug!(
            component = instance.name(),
            uid = instance.uid(),
            "mounting component"
        );
        instance.setup();
        self.setup_render_effect(&instance, container, anchor);
    }

    /// Wraps the instance's render in an effect whose scheduler queues the
    /// instance's update job, then runs it once to mount.
    fn setup_render_effect(
        &self,
        instance: &ComponentInstance,
        container: HostNode,
        anchor: Option<HostNode>,
    ) {
        let renderer: Weak<RendererInner<H>> = Rc::downgrade(&self.0);
        let weak_instance = instance.downgrade();
        let mount_target: MountTarget = Cell::new(Some((container, anchor)));
        let update = move || {
            let (Some(inner), Some(instance)) = (renderer.upgrade(), weak_instance.upgrade())
            else {
                return;
            };
            Renderer(inner).run_component_update(&instance, &mount_target);
        };

        let effect = ReactiveEffect::new_in(update, Some(instance.scope()));
        let weak_effect = effect.downgrade();
        let job = Job::new(move || {
            if let Some(effect) = weak_effect.upgrade() {
                if effect.is_active() {
                    effect.run();
                }
            }
        })
        .with_id(instance.uid());
        let queued = job.clone();
        effect.set_scheduler(Some(Rc::new(move || queue_job(&queued))));
        instance.set_render_effect(effect.clone(), job);
        effect.run();
    }

    fn run_component_update(&self, instance: &ComponentInstance, mount_target: &MountTarget) {
        if !instance.is_mounted() {
            let Some((container, anchor)) = mount_target.take() else {
                return;
            };
            instance.run_hooks(LifecycleHook::BeforeMount);
            let tree = instance.render_root();
            self.patch(None, &tree, container, anchor, Some(instance));
            instance.vnode().set_el(tree.el());
            instance.replace_sub_tree(tree);
            instance.set_mounted();
            instance.queue_hooks(LifecycleHook::Mounted);
            return;
        }

        let next = instance.take_next();
        let updated_from_parent = next.is_some();
        let vnode = match next {
            Some(next) => {
                next.set_el(instance.vnode().el());
                self.update_component_pre_render(instance, &next);
                next
            }
            None => instance.vnode(),
        };
        instance.run_hooks(LifecycleHook::BeforeUpdate);
        let next_tree = instance.render_root();
        let Some(prev_tree) = instance.replace_sub_tree(next_tree.clone()) else {
            return;
        };
        let container = prev_tree.el().and_then(|el| self.host().parent_node(el));
        let Some(container) = container else {
            warn(format_args!(
                "component {} has no mounted host node to update",
                instance.name()
            ));
            return;
        };
        let anchor = self.next_host_node(&prev_tree);
        self.patch(Some(&prev_tree), &next_tree, container, anchor, Some(instance));
        vnode.set_el(next_tree.el());
        if !updated_from_parent {
            update_hoc_host_el(instance, next_tree.el());
        }
        instance.queue_hooks(LifecycleHook::Updated);
    }

    /// Takes over the parent's newer vnode before re-rendering: props and
    /// slots are refreshed, then the watchers those props triggered run.
    fn update_component_pre_render(&self, instance: &ComponentInstance, next: &VNode) {
        next.set_component(Some(instance.clone()));
        instance.set_vnode(next.clone());
        instance.update_props(next);
        pause_tracking();
        flush_pre_flush_cbs(Some(instance.uid()));
        reset_tracking();
    }

    fn update_component(&self, n1: &VNode, n2: &VNode) {
        let Some(instance) = n1.component() else {
            return;
        };
        n2.set_component(Some(instance.clone()));
        if should_update_component(n1, n2) {
            instance.set_next(Some(n2.clone()));
            if let Some(job) = instance.job() {
                // Updating now; a queued run would be redundant.
                invalidate_job(&job);
                call_with_error_handling(ErrorCode::ComponentUpdate, || job.run());
            }
        } else {
            n2.set_el(n1.el());
            instance.set_vnode(n2.clone());
        }
    }

    fn unmount_component(&self, instance: &ComponentInstance, do_remove: bool) {
        tracing::debug!(
            component = instance.name(),
            uid = instance.uid(),
            "unmounting component"
        );
        instance.run_hooks(LifecycleHook::BeforeUnmount);
        instance.scope().stop();
        if let Some(job) = instance.job() {
            job.set_active(false);
        }
        if let Some(tree) = instance.sub_tree() {
            self.unmount(&tree, Some(instance), do_remove);
        }
        instance.queue_unmounted();
        // The vnode and the instance point at each other.
        instance.vnode().set_component(None);
    }
}

/// A component whose root is another component shares its host element;
/// walk up and keep the ancestors' vnodes pointing at it.
fn update_hoc_host_el(instance: &ComponentInstance, el: Option<HostNode>) {
    let mut current = instance.clone();
    while let Some(parent) = current.parent() {
        match parent.sub_tree() {
            Some(tree) if tree.ptr_eq(&current.vnode()) => {
                parent.vnode().set_el(el);
                current = parent;
            }
            _ => break,
        }
    }
}

fn has_props_changed(prev: &Props, next: &Props) -> bool {
    if prev.len() != next.len() {
        return true;
    }
    next.iter().any(|(key, value)| {
        let old = prev.get(key).cloned().unwrap_or_default();
        has_changed(value, &old)
    })
}

/// Whether a parent re-render has to re-render the child component.
pub fn should_update_component(prev: &VNode, next: &VNode) -> bool {
    let flag = next.patch_flag();
    if flag.is_optimized() {
        if flag.contains(PatchFlags::DYNAMIC_SLOTS) {
            return true;
        }
        if flag.contains(PatchFlags::FULL_PROPS) {
            return has_props_changed(prev.props(), next.props());
        }
        if flag.contains(PatchFlags::PROPS) {
            return next
                .dynamic_props()
                .unwrap_or_default()
                .iter()
                .any(|name| has_changed(&next.prop(name), &prev.prop(name)));
        }
        return false;
    }
    // Slot closures are recreated by every parent render.
    let has_slots = |v: &VNode| matches!(&*v.children(), Children::Slots(_));
    if has_slots(prev) || has_slots(next) {
        return true;
    }
    has_props_changed(prev.props(), next.props())
}
