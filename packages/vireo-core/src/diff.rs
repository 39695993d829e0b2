//! Child list reconciliation.

use crate::component::ComponentInstance;
use crate::host::{HostNode, HostOps};
use crate::renderer::Renderer;
use crate::vnode::{is_same_vnode_type, VKey, VNode};
use rustc_hash::FxHashMap;
use vireo_scheduler::warn;

impl<H: HostOps + 'static> Renderer<H> {
    /// Positional diff: the common length is patched pairwise, then the
    /// surplus is mounted or unmounted.
    pub(crate) fn patch_unkeyed_children(
        &self,
        c1: &[VNode],
        c2: &[VNode],
        container: HostNode,
        anchor: Option<HostNode>,
        parent: Option<&ComponentInstance>,
    ) {
        let common = c1.len().min(c2.len());
        for (old, new) in c1.iter().zip(c2) {
            self.patch(Some(old), new, container, None, parent);
        }
        if c1.len() > common {
            self.unmount_children(&c1[common..], parent, true);
        } else {
            self.mount_children(&c2[common..], container, anchor, parent);
        }
    }

    /// Keyed diff. Common heads and tails are patched in place; what is left
    /// in the middle is matched by key (or by type for keyless nodes), and
    /// only nodes outside the longest increasing run of matched positions
    /// are moved.
    pub(crate) fn patch_keyed_children(
        &self,
        c1: &[VNode],
        c2: &[VNode],
        container: HostNode,
        parent_anchor: Option<HostNode>,
        parent: Option<&ComponentInstance>,
    ) {
        let mut i = 0usize;
        let l2 = c2.len();
        // Exclusive ends of the ranges still to be matched.
        let mut e1 = c1.len();
        let mut e2 = l2;

        // Common prefix.
        while i < e1 && i < e2 {
            if !is_same_vnode_type(&c1[i], &c2[i]) {
                break;
            }
            self.patch(Some(&c1[i]), &c2[i], container, None, parent);
            i += 1;
        }

        // Common suffix.
        while i < e1 && i < e2 {
            let (old, new) = (&c1[e1 - 1], &c2[e2 - 1]);
            if !is_same_vnode_type(old, new) {
                break;
            }
            self.patch(Some(old), new, container, None, parent);
            e1 -= 1;
            e2 -= 1;
        }

        if i >= e1 {
            // Only new nodes remain.
            if i < e2 {
                let anchor = c2.get(e2).map_or(parent_anchor, VNode::el);
                self.mount_children(&c2[i..e2], container, anchor, parent);
            }
            return;
        }
        if i >= e2 {
            // Only old nodes remain.
            self.unmount_children(&c1[i..e1], parent, true);
            return;
        }

        let (s1, s2) = (i, i);
        let mut key_to_new_index: FxHashMap<&VKey, usize> = FxHashMap::default();
        for (offset, child) in c2[s2..e2].iter().enumerate() {
            if let Some(key) = child.key() {
                if key_to_new_index.insert(key, s2 + offset).is_some() {
                    warn(format_args!("duplicate keys found during update: {key:?}"));
                }
            }
        }

        let to_be_patched = e2 - s2;
        let mut patched = 0usize;
        let mut moved = false;
        let mut max_new_index_so_far = 0usize;
        // Old index + 1 for every new position; 0 means nothing to reuse.
        let mut new_index_to_old_index = vec![0usize; to_be_patched];

        for (old_index, prev) in c1.iter().enumerate().take(e1).skip(s1) {
            if patched >= to_be_patched {
                // Every new node already has a match.
                self.unmount(prev, parent, true);
                continue;
            }
            let new_index = match prev.key() {
                Some(key) => key_to_new_index.get(key).copied(),
                None => (s2..e2).find(|&j| {
                    new_index_to_old_index[j - s2] == 0 && is_same_vnode_type(prev, &c2[j])
                }),
            };
            let Some(new_index) = new_index else {
                self.unmount(prev, parent, true);
                continue;
            };
            new_index_to_old_index[new_index - s2] = old_index + 1;
            if new_index >= max_new_index_so_far {
                max_new_index_so_far = new_index;
            } else {
                moved = true;
            }
            self.patch(Some(prev), &c2[new_index], container, None, parent);
            patched += 1;
        }

        let stable = if moved {
            longest_increasing_subsequence(&new_index_to_old_index)
        } else {
            Vec::new()
        };
        let mut stable = stable.iter().rev().peekable();

        // Back to front, so the next sibling is always in its final place.
        for offset in (0..to_be_patched).rev() {
            let index = s2 + offset;
            let child = &c2[index];
            let anchor = c2.get(index + 1).map_or(parent_anchor, VNode::el);
            if new_index_to_old_index[offset] == 0 {
                self.patch(None, child, container, anchor, parent);
            } else if moved {
                if stable.peek() == Some(&&offset) {
                    stable.next();
                } else {
                    self.move_node(child, container, anchor);
                }
            }
        }
    }
}

/// Indices of one longest strictly increasing subsequence of `arr`,
/// ignoring zero entries. Patience sorting with back pointers, O(n log n).
fn longest_increasing_subsequence(arr: &[usize]) -> Vec<usize> {
    if arr.is_empty() {
        return vec![];
    }
    let mut p = vec![0; arr.len()];
    // m[k] is the index of the smallest tail of a run of length k.
    let mut m = vec![0; arr.len() + 1];
    let mut l = 0;

    for i in 0..arr.len() {
        if arr[i] == 0 {
            continue;
        }
        let mut lo: usize = 1;
        let mut hi = l;
        while lo <= hi {
            let mid = (lo + hi).div_ceil(2);
            if arr[m[mid]] < arr[i] {
                lo = mid + 1;
            } else {
                hi = mid - 1;
            }
        }
        let new_l = lo;
        p[i] = m[new_l - 1];
        m[new_l] = i;
        if new_l > l {
            l = new_l;
        }
    }

    let mut res = vec![0; l];
    let mut k = m[l];
    for i in (0..l).rev() {
        res[i] = k;
        k = p[k];
    }
    res
}
