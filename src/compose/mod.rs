//! The attachment context of a compose session.
//!
//! [`AttachmentContext`] keeps two views of the same parts in step:
//!
//! - the [`MimeTree`], which is what eventually goes on the wire;
//! - a flat array of [`AttachmentIndex`] entries in pre-order, which is what
//!   the user sees and addresses by position.
//!
//! Positions passed to public operations are *view* positions. They are
//! mapped to storage positions through `v2r`, which skips the descendants of
//! collapsed containers.

mod edit;
mod entry;
mod group;
mod meta;
mod view;

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::config::ComposeConfig;
use crate::content::encoding;
use crate::error::{ComposeError, Result};
use crate::model::node::AttachmentNode;
use crate::model::tree::{FlatPart, MimeTree, NodeId};

pub use entry::AttachmentIndex;
pub use view::ViewRow;

/// Session-scoped container for the parts of the message being composed.
#[derive(Debug)]
pub struct AttachmentContext {
    pub(crate) tree: MimeTree,
    /// Storage order: a pre-order flattening of `tree`.
    pub(crate) idx: Vec<AttachmentIndex>,
    /// View position → storage position.
    pub(crate) v2r: Vec<usize>,
    pub(crate) current: usize,
    pub(crate) settings: ComposeConfig,
}

impl AttachmentContext {
    /// Start a session from an existing tree (a fresh body, a draft, a forward).
    ///
    /// A lone top-level `multipart/mixed` is unwrapped: the top-level chain is
    /// already the mixed part of the outgoing message.
    pub fn new(mut tree: MimeTree, settings: ComposeConfig) -> Self {
        unwrap_mixed_root(&mut tree, &settings);
        let mut ctx = Self {
            tree,
            idx: Vec::new(),
            v2r: Vec::new(),
            current: 0,
            settings,
        };
        ctx.idx = ctx
            .flatten_all()
            .into_iter()
            .map(AttachmentIndex::from_flat)
            .collect();
        ctx.refresh();
        info!(entries = ctx.idx.len(), "Compose session started");
        ctx
    }

    /// Start a session whose only part is `body`.
    pub fn with_body(body: AttachmentNode, settings: ComposeConfig) -> Self {
        let mut tree = MimeTree::new();
        tree.push_top(body);
        Self::new(tree, settings)
    }

    // ── Read access ─────────────────────────────────────────────

    /// All entries in storage order, hidden ones included.
    pub fn entries(&self) -> &[AttachmentIndex] {
        &self.idx
    }

    pub fn tree(&self) -> &MimeTree {
        &self.tree
    }

    pub fn settings(&self) -> &ComposeConfig {
        &self.settings
    }

    /// Number of entries (hidden ones included).
    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// Number of visible entries.
    pub fn vcount(&self) -> usize {
        self.v2r.len()
    }

    /// Storage position of the entry at view position `view`.
    pub fn resolve(&self, view: usize) -> Result<usize> {
        if self.idx.is_empty() {
            return Err(ComposeError::NoAttachments);
        }
        self.v2r
            .get(view)
            .copied()
            .ok_or(ComposeError::InvalidPosition {
                position: view,
                len: self.v2r.len(),
            })
    }

    /// Entry at view position `view`.
    pub fn entry(&self, view: usize) -> Result<&AttachmentIndex> {
        let r = self.resolve(view)?;
        Ok(&self.idx[r])
    }

    /// Node shown at view position `view`.
    pub fn node(&self, view: usize) -> Result<&AttachmentNode> {
        let r = self.resolve(view)?;
        Ok(&self.tree[self.idx[r].node])
    }

    /// Mutable access to the node at `view`, for metadata edits made by
    /// collaborators. Tree links cannot be changed through it.
    pub fn node_mut(&mut self, view: usize) -> Result<&mut AttachmentNode> {
        let r = self.resolve(view)?;
        let id = self.idx[r].node;
        Ok(&mut self.tree[id])
    }

    /// The currently selected view position.
    pub fn current(&self) -> usize {
        self.current
    }

    pub fn set_current(&mut self, view: usize) -> Result<()> {
        self.resolve(view)?;
        self.current = view;
        Ok(())
    }

    /// Root of the message: always the node of the first entry.
    pub fn root(&self) -> Option<NodeId> {
        self.tree.root()
    }

    /// View position of the entry showing `node`, if it is visible.
    pub fn view_position(&self, node: NodeId) -> Option<usize> {
        let r = self.idx.iter().position(|e| e.node == node)?;
        self.v2r.binary_search(&r).ok()
    }

    /// Number of tagged entries, counted from the nodes themselves.
    pub fn tagged_count(&self) -> usize {
        self.idx.iter().filter(|e| self.tree[e.node].tagged).count()
    }

    // ── Tagging and collapsing ──────────────────────────────────

    /// Set the tag of the entry at `view`.
    pub fn set_tag(&mut self, view: usize, tagged: bool) -> Result<()> {
        let id = self.node_id(view)?;
        self.tree[id].tagged = tagged;
        Ok(())
    }

    /// Flip the tag of the entry at `view`; returns the new state.
    pub fn toggle_tag(&mut self, view: usize) -> Result<bool> {
        let tagged = !self.node(view)?.tagged;
        self.set_tag(view, tagged)?;
        Ok(tagged)
    }

    pub fn untag_all(&mut self) {
        for e in &self.idx {
            self.tree[e.node].tagged = false;
        }
    }

    /// Hide or show the descendants of the container at `view`.
    ///
    /// Returns the new collapsed state. Storage is not touched.
    pub fn toggle_collapse(&mut self, view: usize) -> Result<bool> {
        let r = self.resolve(view)?;
        if !self.is_expanded(self.idx[r].node) {
            return Err(ComposeError::NotAContainer);
        }
        let collapsed = !self.idx[r].collapsed;
        self.idx[r].collapsed = collapsed;
        self.rebuild_v2r();
        self.current = view;
        Ok(collapsed)
    }

    /// Mark the entry showing `node` as holding a user-owned file.
    pub fn mark_unowned(&mut self, node: NodeId) -> bool {
        match self.idx.iter_mut().find(|e| e.node == node) {
            Some(e) => {
                e.unowned = true;
                true
            }
            None => false,
        }
    }

    // ── Sizes ───────────────────────────────────────────────────

    /// Estimated size of all parts after transfer encoding.
    ///
    /// Content statistics are computed on first use and cached on the nodes.
    /// Parts whose file cannot be read count as zero.
    pub fn attachments_size(&mut self) -> u64 {
        let mut total = 0;
        for e in &self.idx {
            let node = &mut self.tree[e.node];
            if node.is_multipart() {
                continue;
            }
            match encoding::estimate_node(node) {
                Ok(size) => total += size,
                Err(err) => {
                    debug!(entry = e.num + 1, error = %err, "Skipping part in size estimate");
                }
            }
        }
        total
    }

    // ── Whole-tree maintenance ──────────────────────────────────

    /// Rebuild the flat array from the tree.
    ///
    /// Used after bulk changes made outside the edit operations. Per-node
    /// `unowned` and `collapsed` flags survive.
    pub fn regenerate(&mut self) {
        let flags: HashMap<NodeId, (bool, bool)> = self
            .idx
            .iter()
            .map(|e| (e.node, (e.unowned, e.collapsed)))
            .collect();
        self.idx = self
            .flatten_all()
            .into_iter()
            .map(|part| {
                let mut e = AttachmentIndex::from_flat(part);
                if let Some(&(unowned, collapsed)) = flags.get(&e.node) {
                    e.unowned = unowned;
                    e.collapsed = collapsed;
                }
                e
            })
            .collect();
        self.refresh();
        debug!(entries = self.idx.len(), "Regenerated attachment index");
    }

    /// Check that the flat array is exactly the pre-order flattening of the
    /// tree and that no node is reachable twice.
    pub fn verify(&self) -> Result<()> {
        let reachable = self.tree.reachable();
        let mut seen = HashSet::new();
        for id in &reachable {
            if !seen.insert(*id) {
                return Err(ComposeError::Inconsistent(format!(
                    "node {} is reachable more than once",
                    id.index()
                )));
            }
        }

        let expected = self.flatten_all();
        if expected.len() != self.idx.len() {
            return Err(ComposeError::Inconsistent(format!(
                "tree flattens to {} entries, index has {}",
                expected.len(),
                self.idx.len()
            )));
        }
        for (i, (want, have)) in expected.iter().zip(&self.idx).enumerate() {
            if want.node != have.node || want.level != have.level {
                return Err(ComposeError::Inconsistent(format!(
                    "entry {i}: index has node {}@{}, tree has node {}@{}",
                    have.node.index(),
                    have.level,
                    want.node.index(),
                    want.level
                )));
            }
            if have.num != i {
                return Err(ComposeError::Inconsistent(format!(
                    "entry {i} is numbered {}",
                    have.num
                )));
            }
        }
        if self.tree.root() != self.idx.first().map(|e| e.node) {
            return Err(ComposeError::Inconsistent(
                "root is not the first entry".to_string(),
            ));
        }
        Ok(())
    }

    /// End the session, handing the finished tree to the caller.
    ///
    /// User-owned files lose their unlink flag so nothing downstream deletes them.
    pub fn finish(mut self) -> MimeTree {
        self.protect_unowned();
        let root = self.idx.first().map(|e| e.node);
        self.tree.set_root(root);
        info!(entries = self.idx.len(), "Compose session finished");
        self.tree
    }

    /// Abandon the session, releasing every part.
    ///
    /// Temporary files flagged for unlinking are removed; embedded messages
    /// are left to their owners.
    pub fn discard(mut self) {
        self.protect_unowned();
        self.tree.release_all();
        info!("Compose session discarded");
    }

    // ── Internal helpers ────────────────────────────────────────

    fn protect_unowned(&mut self) {
        for e in &self.idx {
            if e.unowned {
                self.tree[e.node].unlink = false;
            }
        }
    }

    pub(crate) fn node_id(&self, view: usize) -> Result<NodeId> {
        let r = self.resolve(view)?;
        Ok(self.idx[r].node)
    }

    /// True for containers whose children appear in the flat array.
    pub(crate) fn is_expanded(&self, id: NodeId) -> bool {
        let node = &self.tree[id];
        node.is_multipart() && !self.settings.is_opaque(&node.subtype)
    }

    pub(crate) fn flatten_all(&self) -> Vec<FlatPart> {
        let settings = &self.settings;
        self.tree
            .flatten(&|n: &AttachmentNode| n.is_multipart() && settings.is_opaque(&n.subtype))
    }

    pub(crate) fn flatten_subtree(
        &self,
        id: NodeId,
        level: usize,
        parent_subtype: Option<&str>,
    ) -> Vec<AttachmentIndex> {
        let settings = &self.settings;
        self.tree
            .flatten_node(id, level, parent_subtype, &|n: &AttachmentNode| {
                n.is_multipart() && settings.is_opaque(&n.subtype)
            })
            .into_iter()
            .map(AttachmentIndex::from_flat)
            .collect()
    }

    /// One past the last storage position of the subtree starting at `r`.
    pub(crate) fn span_end(&self, r: usize) -> usize {
        let level = self.idx[r].level;
        self.idx[r + 1..]
            .iter()
            .position(|e| e.level <= level)
            .map_or(self.idx.len(), |p| r + 1 + p)
    }

    /// View position showing storage position `r`, or the closest visible
    /// entry before it.
    pub(crate) fn view_of(&self, r: usize) -> usize {
        self.v2r.partition_point(|&x| x <= r).saturating_sub(1)
    }

    /// Renumber, rebuild `v2r`, and clamp the selection.
    pub(crate) fn refresh(&mut self) {
        for (i, e) in self.idx.iter_mut().enumerate() {
            e.num = i;
        }
        self.rebuild_v2r();
        if self.current >= self.v2r.len() {
            self.current = self.v2r.len().saturating_sub(1);
        }
    }

    fn rebuild_v2r(&mut self) {
        self.v2r.clear();
        let mut hide_below: Option<usize> = None;
        for (i, e) in self.idx.iter().enumerate() {
            if let Some(level) = hide_below {
                if e.level > level {
                    continue;
                }
                hide_below = None;
            }
            self.v2r.push(i);
            if e.collapsed {
                hide_below = Some(e.level);
            }
        }
    }
}

/// Replace a lone `multipart/mixed` root by its children.
fn unwrap_mixed_root(tree: &mut MimeTree, settings: &ComposeConfig) {
    let Some(root) = tree.root() else {
        return;
    };
    let node = &tree[root];
    if !node.is_multipart()
        || !node.subtype.eq_ignore_ascii_case("mixed")
        || settings.is_opaque(&node.subtype)
        || node.next().is_some()
    {
        return;
    }
    let children = node.first_child();
    if children.is_none() {
        warn!("Draft has an empty multipart/mixed body");
        return;
    }
    tree.set_first_child(root, None);
    tree.set_root(children);
    tree.release(root);
    debug!("Unwrapped top-level multipart/mixed");
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn leaf(name: &str) -> AttachmentNode {
        AttachmentNode::file(format!("/tmp/mimecompose-test/{name}"))
    }

    /// A context with one top-level leaf per name.
    pub(crate) fn flat_ctx(names: &[&str]) -> (AttachmentContext, Vec<NodeId>) {
        let mut tree = MimeTree::new();
        let ids = names.iter().map(|n| tree.push_top(leaf(n))).collect();
        (AttachmentContext::new(tree, ComposeConfig::default()), ids)
    }

    pub(crate) fn shape(ctx: &AttachmentContext) -> Vec<(String, usize)> {
        ctx.entries()
            .iter()
            .map(|e| (ctx.tree()[e.node].label(), e.level))
            .collect()
    }

    pub(crate) fn s(label: &str, level: usize) -> (String, usize) {
        (label.to_string(), level)
    }

    #[test]
    fn test_new_flattens_tree() {
        let mut tree = MimeTree::new();
        tree.push_top(leaf("a.txt"));
        let alt = tree.push_top(AttachmentNode::multipart("alternative").with_description("alt"));
        tree.push_child(alt, leaf("b.txt"));
        tree.push_child(alt, leaf("c.html"));
        let ctx = AttachmentContext::new(tree, ComposeConfig::default());
        assert_eq!(
            shape(&ctx),
            vec![s("a.txt", 0), s("alt", 0), s("b.txt", 1), s("c.html", 1)]
        );
        assert_eq!(ctx.entries()[2].parent_subtype.as_deref(), Some("alternative"));
        ctx.verify().unwrap();
    }

    #[test]
    fn test_new_unwraps_mixed_root() {
        let mut tree = MimeTree::new();
        let mixed = tree.push_top(AttachmentNode::multipart("mixed"));
        tree.push_child(mixed, leaf("body.txt"));
        tree.push_child(mixed, leaf("photo.jpg"));
        let ctx = AttachmentContext::new(tree, ComposeConfig::default());
        assert_eq!(shape(&ctx), vec![s("body.txt", 0), s("photo.jpg", 0)]);
        assert!(!ctx.tree().contains(mixed));
        ctx.verify().unwrap();
    }

    #[test]
    fn test_opaque_container_is_one_entry() {
        let mut tree = MimeTree::new();
        let enc = tree.push_top(AttachmentNode::multipart("encrypted").with_description("sealed"));
        tree.push_child(enc, leaf("version.asc"));
        tree.push_child(enc, leaf("data.asc"));
        let ctx = AttachmentContext::new(tree, ComposeConfig::default());
        assert_eq!(shape(&ctx), vec![s("sealed", 0)]);
        ctx.verify().unwrap();
    }

    #[test]
    fn test_tagging_counts() {
        let (mut ctx, _) = flat_ctx(&["a", "b", "c"]);
        assert!(ctx.toggle_tag(1).unwrap());
        ctx.set_tag(2, true).unwrap();
        ctx.set_tag(2, true).unwrap();
        assert_eq!(ctx.tagged_count(), 2);
        assert!(!ctx.toggle_tag(1).unwrap());
        assert_eq!(ctx.tagged_count(), 1);
        ctx.untag_all();
        assert_eq!(ctx.tagged_count(), 0);
        assert!(matches!(
            ctx.set_tag(7, true),
            Err(ComposeError::InvalidPosition { position: 7, len: 3 })
        ));
    }

    #[test]
    fn test_tags_set_through_node_mut_are_counted() {
        let (mut ctx, _) = flat_ctx(&["a", "b", "c"]);
        ctx.node_mut(1).unwrap().tagged = true;
        assert_eq!(ctx.tagged_count(), 1);
        ctx.set_tag(1, false).unwrap();
        ctx.set_tag(1, false).unwrap();
        assert_eq!(ctx.tagged_count(), 0);
    }

    #[test]
    fn test_collapse_hides_descendants() {
        let mut tree = MimeTree::new();
        tree.push_top(leaf("a"));
        let alt = tree.push_top(AttachmentNode::multipart("alternative"));
        tree.push_child(alt, leaf("b"));
        tree.push_child(alt, leaf("c"));
        tree.push_top(leaf("d"));
        let mut ctx = AttachmentContext::new(tree, ComposeConfig::default());
        assert_eq!(ctx.vcount(), 5);

        assert!(ctx.toggle_collapse(1).unwrap());
        assert_eq!(ctx.vcount(), 3);
        assert_eq!(ctx.resolve(2).unwrap(), 4);
        assert_eq!(ctx.node(2).unwrap().label(), "d");
        assert_eq!(ctx.len(), 5);

        assert!(!ctx.toggle_collapse(1).unwrap());
        assert_eq!(ctx.vcount(), 5);
        assert!(matches!(ctx.toggle_collapse(0), Err(ComposeError::NotAContainer)));
    }

    #[test]
    fn test_regenerate_keeps_flags() {
        let (mut ctx, ids) = flat_ctx(&["a", "b"]);
        assert!(ctx.mark_unowned(ids[1]));
        ctx.regenerate();
        assert!(ctx.entries()[1].unowned);
        assert!(!ctx.entries()[0].unowned);
        ctx.verify().unwrap();
    }

    #[test]
    fn test_finish_returns_tree_rooted_at_first_entry() {
        let (ctx, ids) = flat_ctx(&["a", "b"]);
        let tree = ctx.finish();
        assert_eq!(tree.root(), Some(ids[0]));
        assert_eq!(tree.chain(tree.root()).count(), 2);
    }

    #[test]
    fn test_empty_context() {
        let ctx = AttachmentContext::new(MimeTree::new(), ComposeConfig::default());
        assert!(ctx.is_empty());
        assert!(matches!(ctx.resolve(0), Err(ComposeError::NoAttachments)));
        ctx.verify().unwrap();
    }
}
