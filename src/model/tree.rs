//! Arena-backed MIME tree.
//!
//! Parts live in a slot vector and refer to each other by [`NodeId`]. The
//! structure is the classic first-child / next-sibling chain: the top level is
//! the sibling chain starting at `root`, and every multipart owns the chain
//! starting at its first child.

use std::ops::{Index, IndexMut};

use serde::Serialize;
use tracing::{debug, warn};

use super::node::{AttachmentNode, NodeBody};

/// Stable handle to a node in a [`MimeTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A position that owns a node: the root slot, a first-child slot, or a
/// next-sibling slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Root,
    FirstChild(NodeId),
    Next(NodeId),
}

/// One entry of a pre-order flattening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatPart {
    pub node: NodeId,
    pub level: usize,
    /// Subtype of the enclosing multipart, `None` at top level.
    pub parent_subtype: Option<String>,
}

/// The MIME structure of a message under composition.
#[derive(Debug, Clone, Default)]
pub struct MimeTree {
    slots: Vec<Option<AttachmentNode>>,
    free: Vec<usize>,
    root: Option<NodeId>,
}

impl MimeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node without linking it anywhere.
    pub fn insert(&mut self, mut node: AttachmentNode) -> NodeId {
        node.next = None;
        if let NodeBody::Multipart { ref mut first_child } = node.body {
            *first_child = None;
        }
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Store a node at the end of the top-level chain.
    pub fn push_top(&mut self, node: AttachmentNode) -> NodeId {
        let id = self.insert(node);
        let tail = self.chain(self.root).last();
        match tail {
            Some(last) => self[last].next = Some(id),
            None => self.root = Some(id),
        }
        id
    }

    /// Store a node at the end of `parent`'s child chain.
    ///
    /// Returns `None` (and stores nothing) if `parent` is not a multipart.
    pub fn push_child(&mut self, parent: NodeId, node: AttachmentNode) -> Option<NodeId> {
        if !self.get(parent)?.is_multipart() {
            return None;
        }
        let id = self.insert(node);
        let tail = self.chain(self[parent].first_child()).last();
        match tail {
            Some(last) => self[last].next = Some(id),
            None => self.set_first_child(parent, Some(id)),
        }
        Some(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&AttachmentNode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut AttachmentNode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: Option<NodeId>) {
        self.root = root;
    }

    /// Number of live nodes, reachable or not.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn set_next(&mut self, id: NodeId, next: Option<NodeId>) {
        self[id].next = next;
    }

    pub(crate) fn set_first_child(&mut self, id: NodeId, child: Option<NodeId>) {
        if let NodeBody::Multipart { ref mut first_child } = self[id].body {
            *first_child = child;
        }
    }

    /// Current target of a link.
    pub fn link_target(&self, link: Link) -> Option<NodeId> {
        match link {
            Link::Root => self.root,
            Link::FirstChild(parent) => self[parent].first_child(),
            Link::Next(prev) => self[prev].next,
        }
    }

    pub(crate) fn set_link(&mut self, link: Link, target: Option<NodeId>) {
        match link {
            Link::Root => self.root = target,
            Link::FirstChild(parent) => self.set_first_child(parent, target),
            Link::Next(prev) => self.set_next(prev, target),
        }
    }

    /// Find the link that owns `target`, searching from the root.
    ///
    /// Parts have no back pointers, so this walks every reachable node.
    pub fn find_link(&self, target: NodeId) -> Option<Link> {
        let mut stack = vec![Link::Root];
        while let Some(link) = stack.pop() {
            let Some(id) = self.link_target(link) else {
                continue;
            };
            if id == target {
                return Some(link);
            }
            stack.push(Link::Next(id));
            if self[id].is_multipart() {
                stack.push(Link::FirstChild(id));
            }
        }
        None
    }

    /// Unhook `id` from whatever owns it, splicing its next sibling in its place.
    ///
    /// Returns the link the node used to hang from.
    pub(crate) fn detach(&mut self, id: NodeId) -> Option<Link> {
        let link = self.find_link(id)?;
        let next = self[id].next.take();
        self.set_link(link, next);
        Some(link)
    }

    /// Iterate a sibling chain starting at `start`.
    pub fn chain(&self, start: Option<NodeId>) -> Chain<'_> {
        Chain {
            tree: self,
            current: start,
        }
    }

    /// Iterate the direct children of `id`.
    pub fn children(&self, id: NodeId) -> Chain<'_> {
        self.chain(self[id].first_child())
    }

    /// Every node reachable from the root in pre-order, opaque subtrees included.
    pub fn reachable(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            // Guard against cycles in a corrupted tree
            if out.len() > self.slots.len() {
                break;
            }
            if let Some(next) = self[id].next {
                stack.push(next);
            }
            if let Some(child) = self[id].first_child() {
                stack.push(child);
            }
        }
        out
    }

    /// Pre-order flattening of the whole tree.
    ///
    /// Containers for which `is_opaque` returns true are emitted as one entry
    /// and their children are skipped.
    pub fn flatten(&self, is_opaque: &dyn Fn(&AttachmentNode) -> bool) -> Vec<FlatPart> {
        let mut out = Vec::new();
        let mut id = self.root;
        while let Some(current) = id {
            self.flatten_into(current, 0, None, is_opaque, &mut out);
            id = self[current].next;
        }
        out
    }

    /// Pre-order flattening of `id` and its subtree, without its siblings.
    pub fn flatten_node(
        &self,
        id: NodeId,
        level: usize,
        parent_subtype: Option<&str>,
        is_opaque: &dyn Fn(&AttachmentNode) -> bool,
    ) -> Vec<FlatPart> {
        let mut out = Vec::new();
        self.flatten_into(id, level, parent_subtype, is_opaque, &mut out);
        out
    }

    fn flatten_into(
        &self,
        id: NodeId,
        level: usize,
        parent_subtype: Option<&str>,
        is_opaque: &dyn Fn(&AttachmentNode) -> bool,
        out: &mut Vec<FlatPart>,
    ) {
        let node = &self[id];
        out.push(FlatPart {
            node: id,
            level,
            parent_subtype: parent_subtype.map(str::to_string),
        });
        if node.is_multipart() && !is_opaque(node) {
            for child in self.children(id) {
                self.flatten_into(child, level + 1, Some(node.subtype.as_str()), is_opaque, out);
            }
        }
    }

    /// Free `id` and everything below it. Its next sibling is left alone and
    /// the caller must already have unlinked it.
    ///
    /// Files flagged for unlinking are removed from disk, including spooled
    /// copies of embedded messages. The parsed messages themselves are never
    /// touched: the node only holds a weak reference to them.
    pub fn release(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.slots.get_mut(current.0).and_then(Option::take) else {
                continue;
            };
            self.free.push(current.0);
            if current != id {
                if let Some(next) = node.next {
                    stack.push(next);
                }
            }
            match node.body {
                NodeBody::Multipart { first_child } => stack.extend(first_child),
                NodeBody::File { ref path } | NodeBody::Message { ref path, .. }
                    if node.unlink =>
                {
                    match std::fs::remove_file(path) {
                        Ok(()) => debug!(path = %path.display(), "Unlinked attachment file"),
                        Err(e) => warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to unlink attachment file"
                        ),
                    }
                }
                _ => {}
            }
        }
    }

    /// Release every node reachable from the root and clear the tree.
    pub fn release_all(&mut self) {
        let mut id = self.root.take();
        while let Some(current) = id {
            id = self[current].next.take();
            self.release(current);
        }
    }
}

impl Index<NodeId> for MimeTree {
    type Output = AttachmentNode;

    fn index(&self, id: NodeId) -> &AttachmentNode {
        self.get(id).expect("node id refers to a released node")
    }
}

impl IndexMut<NodeId> for MimeTree {
    fn index_mut(&mut self, id: NodeId) -> &mut AttachmentNode {
        self.get_mut(id).expect("node id refers to a released node")
    }
}

/// Iterator over a sibling chain.
pub struct Chain<'a> {
    tree: &'a MimeTree,
    current: Option<NodeId>,
}

impl Iterator for Chain<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.current?;
        self.current = self.tree.get(id).and_then(|n| n.next);
        Some(id)
    }
}
