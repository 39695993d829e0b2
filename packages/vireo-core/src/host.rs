//! The narrow interface between the renderer and a platform.
//!
//! A host owns the real nodes (DOM elements, terminal cells, GPU quads). The
//! renderer only ever sees opaque [`HostNode`] handles and drives the host
//! through [`HostOps`].

use serde::{Deserialize, Serialize};
use vireo_reactivity::Value;

/// Opaque handle to a node owned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostNode(pub u64);

pub trait HostOps {
    fn create_element(&self, tag: &str) -> HostNode;
    fn create_text(&self, text: &str) -> HostNode;
    fn create_comment(&self, text: &str) -> HostNode;

    /// Inserts `child` into `parent` before `anchor`, or appends it when
    /// there is no anchor. Inserting an attached node moves it.
    fn insert(&self, child: HostNode, parent: HostNode, anchor: Option<HostNode>);
    fn remove(&self, child: HostNode);

    fn set_text(&self, node: HostNode, text: &str);
    /// Replaces all children of an element with a single text run.
    fn set_element_text(&self, el: HostNode, text: &str);

    /// Applies one prop change. `prev` is `Undefined` on mount and `next` is
    /// `Undefined` when the prop was removed.
    fn patch_prop(&self, el: HostNode, key: &str, prev: &Value, next: &Value);

    fn parent_node(&self, node: HostNode) -> Option<HostNode>;
    fn next_sibling(&self, node: HostNode) -> Option<HostNode>;

    /// Deep copy of a node, when the host supports it.
    fn clone_node(&self, _node: HostNode) -> Option<HostNode> {
        None
    }

    /// Inserts a pre-rendered chunk and returns its first and last nodes.
    /// Hosts without a parser get the content as a single text node.
    fn insert_static_content(
        &self,
        content: &str,
        parent: HostNode,
        anchor: Option<HostNode>,
    ) -> (HostNode, HostNode) {
        let node = self.create_text(content);
        self.insert(node, parent, anchor);
        (node, node)
    }
}
