//! A headless host that keeps its node tree in memory and records every
//! operation it receives as a [`Mutation`].

use crate::host::{HostNode, HostOps};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, Key, KeyData, SlotMap};
use smallvec::SmallVec;
use std::cell::RefCell;
use thiserror::Error;
use vireo_reactivity::{Callback, Value};
use vireo_scheduler::{call_with_error_handling, ErrorCode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    CreateElement {
        tag: String,
        id: u64,
    },
    CreateTextNode {
        value: String,
        id: u64,
    },
    CreateComment {
        value: String,
        id: u64,
    },
    InsertStaticContent {
        content: String,
        id: u64,
    },
    CloneNode {
        source: u64,
        id: u64,
    },
    /// A detached node was attached.
    Insert {
        id: u64,
        parent: u64,
        anchor: Option<u64>,
    },
    /// An attached node was re-inserted somewhere else.
    Move {
        id: u64,
        parent: u64,
        anchor: Option<u64>,
    },
    Remove {
        id: u64,
    },
    SetText {
        value: String,
        id: u64,
    },
    SetElementText {
        value: String,
        id: u64,
    },
    SetAttribute {
        name: String,
        value: String,
        id: u64,
    },
    RemoveAttribute {
        name: String,
        id: u64,
    },
    NewEventListener {
        name: String,
        id: u64,
    },
    RemoveEventListener {
        name: String,
        id: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("unknown host node {0:?}")]
    UnknownNode(HostNode),
    #[error("host node {0:?} is not an element")]
    NotAnElement(HostNode),
    #[error("anchor {anchor:?} is not a child of {parent:?}")]
    AnchorNotFound { parent: HostNode, anchor: HostNode },
    #[error("no `{event}` listener on {node:?}")]
    NoListener { node: HostNode, event: String },
}

new_key_type! {
    struct NodeKey;
}

enum NodeKind {
    Element {
        tag: String,
        attrs: IndexMap<String, String>,
        listeners: IndexMap<String, Callback>,
    },
    Text(String),
    Comment(String),
    /// Pre-rendered markup, serialized verbatim.
    Raw(String),
}

struct HostNodeData {
    kind: NodeKind,
    parent: Option<NodeKey>,
    children: SmallVec<[NodeKey; 4]>,
}

#[derive(Default)]
struct HostTree {
    nodes: SlotMap<NodeKey, HostNodeData>,
    mutations: Vec<Mutation>,
}

fn handle(key: NodeKey) -> HostNode {
    HostNode(key.data().as_ffi())
}

fn key_of(node: HostNode) -> NodeKey {
    NodeKey::from(KeyData::from_ffi(node.0))
}

/// `onClick` style keys name event listeners.
fn event_name(key: &str) -> Option<String> {
    let rest = key.strip_prefix("on")?;
    rest.starts_with(|c: char| c.is_ascii_uppercase())
        .then(|| rest.to_ascii_lowercase())
}

impl HostTree {
    fn get(&self, node: HostNode) -> Result<&HostNodeData, HostError> {
        self.nodes
            .get(key_of(node))
            .ok_or(HostError::UnknownNode(node))
    }

    fn get_mut(&mut self, node: HostNode) -> Result<&mut HostNodeData, HostError> {
        self.nodes
            .get_mut(key_of(node))
            .ok_or(HostError::UnknownNode(node))
    }

    fn create(&mut self, kind: NodeKind) -> HostNode {
        handle(self.nodes.insert(HostNodeData {
            kind,
            parent: None,
            children: SmallVec::new(),
        }))
    }

    fn detach(&mut self, key: NodeKey) {
        let Some(parent) = self.nodes.get_mut(key).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|c| *c != key);
        }
    }

    fn free(&mut self, key: NodeKey) {
        if let Some(node) = self.nodes.remove(key) {
            for child in node.children {
                self.free(child);
            }
        }
    }

    fn insert(
        &mut self,
        child: HostNode,
        parent: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<(), HostError> {
        self.get(parent)?;
        let was_attached = self.get(child)?.parent.is_some();
        let (child_key, parent_key) = (key_of(child), key_of(parent));
        let anchor_at = match anchor {
            Some(anchor) => Some(
                self.get(parent)?
                    .children
                    .iter()
                    .position(|c| *c == key_of(anchor))
                    .ok_or(HostError::AnchorNotFound { parent, anchor })?,
            ),
            None => None,
        };
        self.detach(child_key);

        let siblings = &self.get(parent)?.children;
        // An anchor equal to the child keeps the child's old slot.
        let at = match (anchor, anchor_at) {
            (Some(anchor), Some(before)) => siblings
                .iter()
                .position(|c| *c == key_of(anchor))
                .unwrap_or(before),
            _ => siblings.len(),
        };
        self.get_mut(parent)?.children.insert(at, child_key);
        self.get_mut(child)?.parent = Some(parent_key);

        let (id, parent, anchor) = (child.0, parent.0, anchor.map(|a| a.0));
        self.mutations.push(if was_attached {
            Mutation::Move { id, parent, anchor }
        } else {
            Mutation::Insert { id, parent, anchor }
        });
        Ok(())
    }

    fn set_element_text(&mut self, el: HostNode, text: &str) -> Result<(), HostError> {
        if !matches!(self.get(el)?.kind, NodeKind::Element { .. }) {
            return Err(HostError::NotAnElement(el));
        }
        let old = std::mem::take(&mut self.get_mut(el)?.children);
        for child in old {
            self.free(child);
        }
        if !text.is_empty() {
            let key = self.nodes.insert(HostNodeData {
                kind: NodeKind::Text(text.to_string()),
                parent: Some(key_of(el)),
                children: SmallVec::new(),
            });
            self.get_mut(el)?.children.push(key);
        }
        self.mutations.push(Mutation::SetElementText {
            value: text.to_string(),
            id: el.0,
        });
        Ok(())
    }

    fn patch_prop(&mut self, el: HostNode, key: &str, next: &Value) -> Result<(), HostError> {
        let id = el.0;
        let NodeKind::Element {
            attrs, listeners, ..
        } = &mut self.get_mut(el)?.kind
        else {
            return Err(HostError::NotAnElement(el));
        };
        let mutation = if let Some(event) = event_name(key) {
            match next {
                Value::Func(cb) => listeners
                    .insert(event.clone(), cb.clone())
                    .is_none()
                    .then_some(Mutation::NewEventListener { name: event, id }),
                _ => listeners
                    .shift_remove(&event)
                    .map(|_| Mutation::RemoveEventListener { name: event, id }),
            }
        } else if next.is_nullish() || matches!(next, Value::Bool(false)) {
            attrs
                .shift_remove(key)
                .map(|_| Mutation::RemoveAttribute {
                    name: key.to_string(),
                    id,
                })
        } else {
            let value = next.to_string();
            attrs.insert(key.to_string(), value.clone());
            Some(Mutation::SetAttribute {
                name: key.to_string(),
                value,
                id,
            })
        };
        self.mutations.extend(mutation);
        Ok(())
    }

    fn clone_subtree(&mut self, key: NodeKey) -> Option<NodeKey> {
        let node = self.nodes.get(key)?;
        let kind = match &node.kind {
            NodeKind::Element {
                tag,
                attrs,
                listeners,
            } => NodeKind::Element {
                tag: tag.clone(),
                attrs: attrs.clone(),
                listeners: listeners.clone(),
            },
            NodeKind::Text(t) => NodeKind::Text(t.clone()),
            NodeKind::Comment(t) => NodeKind::Comment(t.clone()),
            NodeKind::Raw(t) => NodeKind::Raw(t.clone()),
        };
        let children = node.children.clone();
        let copy = self.nodes.insert(HostNodeData {
            kind,
            parent: None,
            children: SmallVec::new(),
        });
        for child in children {
            if let Some(child_copy) = self.clone_subtree(child) {
                if let Some(c) = self.nodes.get_mut(child_copy) {
                    c.parent = Some(copy);
                }
                if let Some(n) = self.nodes.get_mut(copy) {
                    n.children.push(child_copy);
                }
            }
        }
        Some(copy)
    }

    fn write_html(&self, key: NodeKey, out: &mut String) {
        let Some(node) = self.nodes.get(key) else {
            return;
        };
        match &node.kind {
            NodeKind::Element { tag, attrs, .. } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push_str(&format!(" {name}=\"{value}\""));
                }
                out.push('>');
                for child in &node.children {
                    self.write_html(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
            NodeKind::Text(text) | NodeKind::Raw(text) => out.push_str(text),
            NodeKind::Comment(text) => out.push_str(&format!("<!--{text}-->")),
        }
    }
}

/// In-memory [`HostOps`] implementation used by tests and headless tools.
///
/// Invalid handles never panic: the operation is dropped and a warning is
/// logged, the same way a platform adapter would degrade.
#[derive(Default)]
pub struct RecordingHost {
    tree: RefCell<HostTree>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply(&self, op: &str, f: impl FnOnce(&mut HostTree) -> Result<(), HostError>) {
        if let Err(err) = f(&mut self.tree.borrow_mut()) {
            tracing::warn!("host {op} ignored: {err}");
        }
    }

    /// Removes and returns everything recorded so far.
    pub fn take_mutations(&self) -> Vec<Mutation> {
        std::mem::take(&mut self.tree.borrow_mut().mutations)
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.tree.borrow().mutations.clone()
    }

    /// Live nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.tree.borrow().nodes.len()
    }

    pub fn children(&self, node: HostNode) -> Result<Vec<HostNode>, HostError> {
        let tree = self.tree.borrow();
        Ok(tree.get(node)?.children.iter().copied().map(handle).collect())
    }

    pub fn tag(&self, node: HostNode) -> Result<String, HostError> {
        match &self.tree.borrow().get(node)?.kind {
            NodeKind::Element { tag, .. } => Ok(tag.clone()),
            _ => Err(HostError::NotAnElement(node)),
        }
    }

    pub fn attribute(&self, node: HostNode, name: &str) -> Result<Option<String>, HostError> {
        match &self.tree.borrow().get(node)?.kind {
            NodeKind::Element { attrs, .. } => Ok(attrs.get(name).cloned()),
            _ => Err(HostError::NotAnElement(node)),
        }
    }

    /// Concatenated text of a node and its descendants.
    pub fn text_content(&self, node: HostNode) -> Result<String, HostError> {
        fn collect(tree: &HostTree, key: NodeKey, out: &mut String) {
            let Some(node) = tree.nodes.get(key) else {
                return;
            };
            match &node.kind {
                NodeKind::Text(t) | NodeKind::Raw(t) => out.push_str(t),
                NodeKind::Comment(_) => {}
                NodeKind::Element { .. } => {
                    for child in &node.children {
                        collect(tree, *child, out);
                    }
                }
            }
        }
        let tree = self.tree.borrow();
        tree.get(node)?;
        let mut out = String::new();
        collect(&tree, key_of(node), &mut out);
        Ok(out)
    }

    /// Markup of the node itself, including its own tag.
    pub fn outer_html(&self, node: HostNode) -> Result<String, HostError> {
        let tree = self.tree.borrow();
        tree.get(node)?;
        let mut out = String::new();
        tree.write_html(key_of(node), &mut out);
        Ok(out)
    }

    /// Markup of the node's children.
    pub fn inner_html(&self, node: HostNode) -> Result<String, HostError> {
        let tree = self.tree.borrow();
        let mut out = String::new();
        for child in &tree.get(node)?.children {
            tree.write_html(*child, &mut out);
        }
        Ok(out)
    }

    /// Calls the listener registered for `event` (`"click"` for `onClick`).
    pub fn dispatch(&self, node: HostNode, event: &str, args: &[Value]) -> Result<(), HostError> {
        let listener = {
            let tree = self.tree.borrow();
            match &tree.get(node)?.kind {
                NodeKind::Element { listeners, .. } => listeners.get(event).cloned(),
                _ => return Err(HostError::NotAnElement(node)),
            }
        };
        let listener = listener.ok_or_else(|| HostError::NoListener {
            node,
            event: event.to_string(),
        })?;
        call_with_error_handling(ErrorCode::EventHandler, || listener.call(args));
        Ok(())
    }
}

impl HostOps for RecordingHost {
    fn create_element(&self, tag: &str) -> HostNode {
        let mut tree = self.tree.borrow_mut();
        let node = tree.create(NodeKind::Element {
            tag: tag.to_string(),
            attrs: IndexMap::new(),
            listeners: IndexMap::new(),
        });
        tree.mutations.push(Mutation::CreateElement {
            tag: tag.to_string(),
            id: node.0,
        });
        node
    }

    fn create_text(&self, text: &str) -> HostNode {
        let mut tree = self.tree.borrow_mut();
        let node = tree.create(NodeKind::Text(text.to_string()));
        tree.mutations.push(Mutation::CreateTextNode {
            value: text.to_string(),
            id: node.0,
        });
        node
    }

    fn create_comment(&self, text: &str) -> HostNode {
        let mut tree = self.tree.borrow_mut();
        let node = tree.create(NodeKind::Comment(text.to_string()));
        tree.mutations.push(Mutation::CreateComment {
            value: text.to_string(),
            id: node.0,
        });
        node
    }

    fn insert(&self, child: HostNode, parent: HostNode, anchor: Option<HostNode>) {
        self.apply("insert", |tree| tree.insert(child, parent, anchor));
    }

    fn remove(&self, child: HostNode) {
        self.apply("remove", |tree| {
            tree.get(child)?;
            let key = key_of(child);
            tree.detach(key);
            tree.free(key);
            tree.mutations.push(Mutation::Remove { id: child.0 });
            Ok(())
        });
    }

    fn set_text(&self, node: HostNode, text: &str) {
        self.apply("set_text", |tree| {
            match &mut tree.get_mut(node)?.kind {
                NodeKind::Text(t) | NodeKind::Comment(t) => *t = text.to_string(),
                _ => return Err(HostError::NotAnElement(node)),
            }
            tree.mutations.push(Mutation::SetText {
                value: text.to_string(),
                id: node.0,
            });
            Ok(())
        });
    }

    fn set_element_text(&self, el: HostNode, text: &str) {
        self.apply("set_element_text", |tree| tree.set_element_text(el, text));
    }

    fn patch_prop(&self, el: HostNode, key: &str, _prev: &Value, next: &Value) {
        self.apply("patch_prop", |tree| tree.patch_prop(el, key, next));
    }

    fn parent_node(&self, node: HostNode) -> Option<HostNode> {
        let tree = self.tree.borrow();
        tree.get(node).ok()?.parent.map(handle)
    }

    fn next_sibling(&self, node: HostNode) -> Option<HostNode> {
        let tree = self.tree.borrow();
        let parent = tree.get(node).ok()?.parent?;
        let siblings = &tree.nodes.get(parent)?.children;
        let at = siblings.iter().position(|c| *c == key_of(node))?;
        siblings.get(at + 1).copied().map(handle)
    }

    fn clone_node(&self, node: HostNode) -> Option<HostNode> {
        let mut tree = self.tree.borrow_mut();
        let copy = handle(tree.clone_subtree(key_of(node))?);
        tree.mutations.push(Mutation::CloneNode {
            source: node.0,
            id: copy.0,
        });
        Some(copy)
    }

    fn insert_static_content(
        &self,
        content: &str,
        parent: HostNode,
        anchor: Option<HostNode>,
    ) -> (HostNode, HostNode) {
        let node = {
            let mut tree = self.tree.borrow_mut();
            let node = tree.create(NodeKind::Raw(content.to_string()));
            tree.mutations.push(Mutation::InsertStaticContent {
                content: content.to_string(),
                id: node.0,
            });
            node
        };
        self.insert(node, parent, anchor);
        (node, node)
    }
}
