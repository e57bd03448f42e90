//! Structural edits: attach, insert, delete, reorder.

use tracing::debug;

use super::AttachmentContext;
use crate::error::{ComposeError, Result};
use crate::model::node::AttachmentNode;
use crate::model::tree::{Link, NodeId};

impl AttachmentContext {
    /// Attach a part after the last entry; returns its view position.
    pub fn attach(&mut self, node: AttachmentNode) -> usize {
        let id = self.tree.insert(node);
        self.append_existing(id, false)
    }

    /// Attach a file the user owns. It is never unlinked by this session.
    pub fn attach_unowned(&mut self, mut node: AttachmentNode) -> usize {
        node.unlink = false;
        let id = self.tree.insert(node);
        self.append_existing(id, true)
    }

    /// Link an already-stored, unlinked node (and its children) after the
    /// last entry, at the last entry's depth.
    pub(crate) fn append_existing(&mut self, id: NodeId, unowned: bool) -> usize {
        let (link, level, parent) = match self.idx.last() {
            Some(last) => (
                Link::Next(last.node),
                last.level,
                last.parent_subtype.clone(),
            ),
            None => (Link::Root, 0, None),
        };
        let next = self.tree.link_target(link);
        self.tree.set_next(id, next);
        self.tree.set_link(link, Some(id));

        let at = self.idx.len();
        let mut entries = self.flatten_subtree(id, level, parent.as_deref());
        entries[0].unowned = unowned;
        self.idx.extend(entries);
        self.refresh();
        self.current = self.view_of(at);
        debug!(
            entry = at + 1,
            level,
            label = %self.tree[id].label(),
            "Attached part"
        );
        self.current
    }

    /// Insert a part before view position `view` at nesting depth `level`.
    ///
    /// `view == vcount()` appends after the last entry. Returns the view
    /// position of the new entry.
    pub fn insert_at(&mut self, view: usize, node: AttachmentNode, level: usize) -> Result<usize> {
        let vcount = self.vcount();
        let invalid = ComposeError::InvalidPosition {
            position: view,
            len: vcount,
        };
        if view > vcount {
            return Err(invalid);
        }
        let r = self.v2r.get(view).copied().unwrap_or(self.idx.len());
        if self.idx.get(r).is_some_and(|e| e.level > level) {
            return Err(invalid);
        }
        let Some((link, parent)) = self.insertion_link(r, level) else {
            return Err(invalid);
        };

        let id = self.tree.insert(node);
        let next = self.tree.link_target(link);
        self.tree.set_next(id, next);
        self.tree.set_link(link, Some(id));

        let entries = self.flatten_subtree(id, level, parent.as_deref());
        self.idx.splice(r..r, entries);
        self.refresh();
        self.current = self.view_of(r);
        debug!(entry = r + 1, level, "Inserted part");
        Ok(self.current)
    }

    /// Link that a node inserted at storage position `r` with depth `level`
    /// must hang from, plus the subtype of its parent.
    fn insertion_link(&self, r: usize, level: usize) -> Option<(Link, Option<String>)> {
        for e in self.idx[..r].iter().rev() {
            if e.level == level {
                return Some((Link::Next(e.node), e.parent_subtype.clone()));
            }
            if e.level < level {
                if e.level + 1 == level && self.is_expanded(e.node) {
                    let subtype = self.tree[e.node].subtype.clone();
                    return Some((Link::FirstChild(e.node), Some(subtype)));
                }
                return None;
            }
        }
        (level == 0).then_some((Link::Root, None))
    }

    /// Remove the entry at `view` together with everything below it.
    pub fn delete(&mut self, view: usize) -> Result<()> {
        let r = self.resolve(view)?;
        let end = self.span_end(r);
        let id = self.idx[r].node;

        if r == 0 && end == self.idx.len() {
            self.tree[id].tagged = false;
            return Err(ComposeError::DeleteSoleAttachment);
        }

        for e in &self.idx[r..end] {
            if e.unowned {
                self.tree[e.node].unlink = false;
            }
        }
        self.tree.detach(id).ok_or_else(|| {
            ComposeError::Inconsistent(format!("entry {} is not linked", r + 1))
        })?;
        let label = self.tree[id].label();
        self.tree.release(id);
        self.idx.drain(r..end);
        self.refresh();
        self.current = view.min(self.vcount().saturating_sub(1));
        debug!(entry = r + 1, removed = end - r, label = %label, "Deleted part");
        Ok(())
    }

    /// Exchange the entries at view positions `view` and `view + 1`.
    ///
    /// Both must be siblings at the same depth. Display numbers stay with
    /// the positions, so the two entries trade numbers.
    pub fn swap(&mut self, view: usize) -> Result<()> {
        if self.idx.is_empty() {
            return Err(ComposeError::NoAttachments);
        }
        if view == 0 {
            return Err(ComposeError::FundamentalPart);
        }
        if view + 1 >= self.vcount() {
            return Err(ComposeError::AlreadyAtBottom);
        }
        let (ra, rb) = (self.v2r[view], self.v2r[view + 1]);
        if self.idx[ra].level != self.idx[rb].level {
            return Err(ComposeError::DepthMismatch);
        }
        let (a, b) = (self.idx[ra].node, self.idx[rb].node);
        if self.tree[a].next() != Some(b) {
            return Err(ComposeError::Inconsistent(format!(
                "entries {} and {} are not siblings",
                ra + 1,
                rb + 1
            )));
        }
        let link = self
            .tree
            .find_link(a)
            .ok_or_else(|| ComposeError::Inconsistent(format!("entry {} is not linked", ra + 1)))?;

        let after = self.tree[b].next();
        self.tree.set_link(link, Some(b));
        self.tree.set_next(b, Some(a));
        self.tree.set_next(a, after);

        let eb = self.span_end(rb);
        self.idx[ra..eb].rotate_left(rb - ra);
        self.refresh();
        debug!(first = ra + 1, second = rb + 1, "Swapped parts");
        Ok(())
    }

    /// Move the entry at `view` one place up; returns its new view position.
    pub fn move_up(&mut self, view: usize) -> Result<usize> {
        let id = self.node_id(view)?;
        match view {
            0 => Err(ComposeError::AlreadyAtTop),
            1 => Err(ComposeError::FundamentalPart),
            _ => {
                self.swap(view - 1)?;
                self.current = self.view_position(id).unwrap_or(view - 1);
                Ok(self.current)
            }
        }
    }

    /// Move the entry at `view` one place down; returns its new view position.
    pub fn move_down(&mut self, view: usize) -> Result<usize> {
        let id = self.node_id(view)?;
        if view + 1 >= self.vcount() {
            return Err(ComposeError::AlreadyAtBottom);
        }
        if view == 0 {
            return Err(ComposeError::FundamentalPart);
        }
        self.swap(view)?;
        self.current = self.view_position(id).unwrap_or(view + 1);
        Ok(self.current)
    }
}
