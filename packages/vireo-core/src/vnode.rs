use crate::app::AppContext;
use crate::component::{Component, ComponentInstance};
use crate::host::HostNode;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::ops::BitOr;
use std::rc::Rc;
use vireo_reactivity::Value;

pub type Props = IndexMap<Rc<str>, Value>;
/// Slot content renderer; receives the slot props.
pub type Slot = Rc<dyn Fn(&Value) -> Vec<VNode>>;
pub type Slots = IndexMap<Rc<str>, Slot>;

/// Identity of a node among its siblings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VKey {
    Int(i64),
    Str(Rc<str>),
}

impl VKey {
    /// Keys coming through props: integral numbers and strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) if n.fract() == 0.0 => Some(VKey::Int(*n as i64)),
            Value::Str(s) => Some(VKey::Str(s.clone())),
            _ => None,
        }
    }
}

impl From<&str> for VKey {
    fn from(s: &str) -> Self {
        VKey::Str(Rc::from(s))
    }
}

impl From<String> for VKey {
    fn from(s: String) -> Self {
        VKey::Str(Rc::from(s))
    }
}

impl From<i64> for VKey {
    fn from(n: i64) -> Self {
        VKey::Int(n)
    }
}

impl From<i32> for VKey {
    fn from(n: i32) -> Self {
        VKey::Int(i64::from(n))
    }
}

impl From<usize> for VKey {
    fn from(n: usize) -> Self {
        VKey::Int(n as i64)
    }
}

/// Optimization hints attached by a template compiler. Positive values are
/// bit sets naming what may change; the negative values are markers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PatchFlags(i32);

impl PatchFlags {
    pub const NONE: Self = Self(0);
    /// Text children are dynamic.
    pub const TEXT: Self = Self(1);
    pub const CLASS: Self = Self(1 << 1);
    pub const STYLE: Self = Self(1 << 2);
    /// Props other than class and style are dynamic; their names are in
    /// the node's dynamic props list.
    pub const PROPS: Self = Self(1 << 3);
    /// Prop names themselves are dynamic; diff every prop.
    pub const FULL_PROPS: Self = Self(1 << 4);
    pub const STABLE_FRAGMENT: Self = Self(1 << 6);
    pub const KEYED_FRAGMENT: Self = Self(1 << 7);
    pub const UNKEYED_FRAGMENT: Self = Self(1 << 8);
    pub const NEED_PATCH: Self = Self(1 << 9);
    pub const DYNAMIC_SLOTS: Self = Self(1 << 10);
    /// Static subtree; never patched.
    pub const HOISTED: Self = Self(-1);
    /// Leave optimized mode and fully diff this node.
    pub const BAIL: Self = Self(-2);

    pub fn bits(self) -> i32 {
        self.0
    }

    pub fn is_optimized(self) -> bool {
        self.0 > 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 > 0 && other.0 > 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for PatchFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0.max(0) | rhs.0.max(0))
    }
}

#[derive(Clone)]
pub enum VNodeType {
    Element(Rc<str>),
    Text,
    Comment,
    /// Pre-rendered markup inserted in one piece.
    Static,
    Fragment,
    Component(Component),
}

impl VNodeType {
    fn same_as(&self, other: &VNodeType) -> bool {
        match (self, other) {
            (VNodeType::Element(a), VNodeType::Element(b)) => a == b,
            (VNodeType::Component(a), VNodeType::Component(b)) => a.ptr_eq(b),
            (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
        }
    }
}

impl fmt::Debug for VNodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VNodeType::Element(tag) => write!(f, "<{tag}>"),
            VNodeType::Text => f.write_str("Text"),
            VNodeType::Comment => f.write_str("Comment"),
            VNodeType::Static => f.write_str("Static"),
            VNodeType::Fragment => f.write_str("Fragment"),
            VNodeType::Component(c) => write!(f, "Component({})", c.name()),
        }
    }
}

#[derive(Clone, Default)]
pub enum Children {
    #[default]
    None,
    /// Element text, or the content of text, comment and static nodes.
    Text(Rc<str>),
    List(Vec<VNode>),
    Slots(Slots),
}

struct VNodeInner {
    ty: VNodeType,
    key: Option<VKey>,
    props: Props,
    children: RefCell<Children>,
    patch_flag: PatchFlags,
    dynamic_props: Option<Vec<Rc<str>>>,
    el: Cell<Option<HostNode>>,
    anchor: Cell<Option<HostNode>>,
    component: RefCell<Option<ComponentInstance>>,
    app_context: RefCell<Option<AppContext>>,
}

/// A lightweight description of one position in the rendered tree.
///
/// Render functions produce fresh trees; the renderer matches them against
/// the previous tree and records the host nodes it created on the new one.
#[derive(Clone)]
pub struct VNode(Rc<VNodeInner>);

impl VNode {
    fn from_parts(ty: VNodeType, children: Children) -> Self {
        Self(Rc::new(VNodeInner {
            ty,
            key: None,
            props: Props::new(),
            children: RefCell::new(children),
            patch_flag: PatchFlags::NONE,
            dynamic_props: None,
            el: Cell::new(None),
            anchor: Cell::new(None),
            component: RefCell::new(None),
            app_context: RefCell::new(None),
        }))
    }

    pub fn ty(&self) -> &VNodeType {
        &self.0.ty
    }

    pub fn key(&self) -> Option<&VKey> {
        self.0.key.as_ref()
    }

    pub fn props(&self) -> &Props {
        &self.0.props
    }

    pub fn prop(&self, name: &str) -> Value {
        self.0.props.get(name).cloned().unwrap_or_default()
    }

    pub fn children(&self) -> Ref<'_, Children> {
        self.0.children.borrow()
    }

    /// Text content of text, comment and static nodes, or text children.
    pub fn text(&self) -> Option<Rc<str>> {
        match &*self.0.children.borrow() {
            Children::Text(t) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn patch_flag(&self) -> PatchFlags {
        self.0.patch_flag
    }

    pub fn dynamic_props(&self) -> Option<&[Rc<str>]> {
        self.0.dynamic_props.as_deref()
    }

    /// First host node, once mounted. Fragments use their start marker.
    pub fn el(&self) -> Option<HostNode> {
        self.0.el.get()
    }

    pub(crate) fn set_el(&self, el: Option<HostNode>) {
        self.0.el.set(el);
    }

    /// Last host node of fragments and static content.
    pub fn anchor(&self) -> Option<HostNode> {
        self.0.anchor.get()
    }

    pub(crate) fn set_anchor(&self, anchor: Option<HostNode>) {
        self.0.anchor.set(anchor);
    }

    pub fn component(&self) -> Option<ComponentInstance> {
        self.0.component.borrow().clone()
    }

    pub(crate) fn set_component(&self, instance: Option<ComponentInstance>) {
        *self.0.component.borrow_mut() = instance;
    }

    pub fn app_context(&self) -> Option<AppContext> {
        self.0.app_context.borrow().clone()
    }

    pub(crate) fn set_app_context(&self, context: Option<AppContext>) {
        *self.0.app_context.borrow_mut() = context;
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_mounted(&self) -> bool {
        self.el().is_some()
    }

    /// A new node with the same description and host references.
    pub(crate) fn clone_vnode(&self) -> VNode {
        let inner = &self.0;
        Self(Rc::new(VNodeInner {
            ty: inner.ty.clone(),
            key: inner.key.clone(),
            props: inner.props.clone(),
            children: RefCell::new(inner.children.borrow().clone()),
            patch_flag: inner.patch_flag,
            dynamic_props: inner.dynamic_props.clone(),
            el: Cell::new(inner.el.get()),
            anchor: Cell::new(inner.anchor.get()),
            component: RefCell::new(inner.component.borrow().clone()),
            app_context: RefCell::new(inner.app_context.borrow().clone()),
        }))
    }

    /// Child list ready for patching. Entries that are already mounted
    /// somewhere else (a node reused across renders), or that repeat an
    /// earlier entry of this list, are replaced by clones so every position
    /// gets its own host references.
    pub(crate) fn normalized_children(&self) -> Vec<VNode> {
        let mut children = self.0.children.borrow_mut();
        match &mut *children {
            Children::List(list) => {
                let mut seen = FxHashSet::default();
                for child in list.iter_mut() {
                    let repeated = !seen.insert(Rc::as_ptr(&child.0));
                    if repeated || child.is_mounted() {
                        *child = child.clone_vnode();
                        seen.insert(Rc::as_ptr(&child.0));
                    }
                }
                list.clone()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn child_list(&self) -> Vec<VNode> {
        match &*self.0.children.borrow() {
            Children::List(list) => list.clone(),
            _ => Vec::new(),
        }
    }

    pub fn slots(&self) -> Slots {
        match &*self.0.children.borrow() {
            Children::Slots(slots) => slots.clone(),
            _ => Slots::new(),
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("VNode");
        s.field("type", &self.0.ty).field("key", &self.0.key);
        if let Some(text) = self.text() {
            s.field("text", &text);
        }
        s.field("el", &self.el()).finish()
    }
}

/// Same type and same key: the old node can be patched into the new one.
pub fn is_same_vnode_type(a: &VNode, b: &VNode) -> bool {
    a.ty().same_as(b.ty()) && a.key() == b.key()
}

pub struct VNodeBuilder {
    ty: VNodeType,
    key: Option<VKey>,
    props: Props,
    children: Children,
    patch_flag: PatchFlags,
    dynamic_props: Option<Vec<Rc<str>>>,
}

impl VNodeBuilder {
    fn new(ty: VNodeType) -> Self {
        Self {
            ty,
            key: None,
            props: Props::new(),
            children: Children::None,
            patch_flag: PatchFlags::NONE,
            dynamic_props: None,
        }
    }

    pub fn key(mut self, key: impl Into<VKey>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets a prop. A `key` prop becomes the node key instead.
    pub fn prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if name == "key" {
            self.key = VKey::from_value(&value);
        } else {
            self.props.insert(Rc::from(name), value);
        }
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        match &mut self.children {
            Children::List(list) => list.push(child.into()),
            _ => self.children = Children::List(vec![child.into()]),
        }
        self
    }

    pub fn children<I, C>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<VNode>,
    {
        let mut list = match std::mem::take(&mut self.children) {
            Children::List(list) => list,
            _ => Vec::new(),
        };
        list.extend(children.into_iter().map(Into::into));
        self.children = Children::List(list);
        self
    }

    /// Text children of an element.
    pub fn text(mut self, text: impl Into<Rc<str>>) -> Self {
        self.children = Children::Text(text.into());
        self
    }

    /// Named slot of a component node.
    pub fn slot(mut self, name: &str, slot: impl Fn(&Value) -> Vec<VNode> + 'static) -> Self {
        let mut slots = match std::mem::take(&mut self.children) {
            Children::Slots(slots) => slots,
            _ => Slots::new(),
        };
        slots.insert(Rc::from(name), Rc::new(slot));
        self.children = Children::Slots(slots);
        self
    }

    pub fn patch_flag(mut self, flag: PatchFlags) -> Self {
        self.patch_flag = flag;
        self
    }

    pub fn dynamic_props<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Rc<str>>,
    {
        self.dynamic_props = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> VNode {
        VNode(Rc::new(VNodeInner {
            ty: self.ty,
            key: self.key,
            props: self.props,
            children: RefCell::new(self.children),
            patch_flag: self.patch_flag,
            dynamic_props: self.dynamic_props,
            el: Cell::new(None),
            anchor: Cell::new(None),
            component: RefCell::new(None),
            app_context: RefCell::new(None),
        }))
    }
}

impl From<VNodeBuilder> for VNode {
    fn from(builder: VNodeBuilder) -> Self {
        builder.build()
    }
}

impl From<&str> for VNode {
    fn from(s: &str) -> Self {
        text(s)
    }
}

impl From<String> for VNode {
    fn from(s: String) -> Self {
        text(s)
    }
}

/// Element node builder.
pub fn h(tag: &str) -> VNodeBuilder {
    VNodeBuilder::new(VNodeType::Element(Rc::from(tag)))
}

/// Component node builder.
pub fn h_component(component: &Component) -> VNodeBuilder {
    VNodeBuilder::new(VNodeType::Component(component.clone()))
}

pub fn fragment<I, C>(children: I) -> VNodeBuilder
where
    I: IntoIterator<Item = C>,
    C: Into<VNode>,
{
    VNodeBuilder::new(VNodeType::Fragment).children(children)
}

pub fn text(content: impl Into<Rc<str>>) -> VNode {
    VNode::from_parts(VNodeType::Text, Children::Text(content.into()))
}

pub fn comment(content: impl Into<Rc<str>>) -> VNode {
    VNode::from_parts(VNodeType::Comment, Children::Text(content.into()))
}

/// Pre-rendered markup. Marked hoisted: it is mounted once and never diffed.
pub fn static_content(markup: impl Into<Rc<str>>) -> VNode {
    VNodeBuilder::new(VNodeType::Static)
        .text(markup)
        .patch_flag(PatchFlags::HOISTED)
        .build()
}
