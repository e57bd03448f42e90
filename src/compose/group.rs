//! Grouping tagged parts into `multipart/alternative` and
//! `multipart/multilingual` containers.

use std::collections::HashSet;

use tracing::{debug, info};

use super::{AttachmentContext, AttachmentIndex};
use crate::error::{ComposeError, Result};
use crate::model::node::{AttachmentNode, Disposition};
use crate::model::tree::NodeId;
use crate::prompt::{Answer, Prompt};

const LANGUAGE_QUESTION: &str = "Not all parts have 'Content-Language' set, continue?";

impl AttachmentContext {
    /// Move every tagged part into a new `multipart/alternative`.
    ///
    /// The group takes the place of the first tagged part. Returns the
    /// group's view position.
    pub fn group_alternatives(&mut self) -> Result<usize> {
        let members = self.group_members("alternatives")?;
        let first = members[0];
        let level = self.idx[first].level;
        let parent = self.idx[first].parent_subtype.clone();
        let first_node = self.idx[first].node;
        let anchor = self.tree.find_link(first_node).ok_or_else(|| {
            ComposeError::Inconsistent(format!("entry {} is not linked", first + 1))
        })?;

        let description = group_description("Alternatives for", &self.tree[first_node])
            .unwrap_or_else(|| "unknown alternative group".to_string());
        let group = self
            .tree
            .insert(AttachmentNode::multipart("alternative").with_description(description));
        let nodes = self.adopt_members(group, &members);

        // Every member is gone from the chains, so the anchor now points at
        // whatever followed them.
        let next = self.tree.link_target(anchor);
        self.tree.set_next(group, next);
        self.tree.set_link(anchor, Some(group));

        let unowned = self.remove_entries(&members);
        let mut entries = Vec::with_capacity(nodes.len() + 1);
        entries.push(AttachmentIndex::new(group, level, parent));
        entries.extend(nodes.iter().map(|&id| {
            let mut e = AttachmentIndex::new(id, level + 1, Some("alternative".to_string()));
            e.unowned = unowned.contains(&id);
            e
        }));
        self.idx.splice(first..first, entries);
        self.refresh();
        self.current = self.view_of(first);
        info!(parts = nodes.len(), entry = first + 1, "Grouped alternatives");
        Ok(self.current)
    }

    /// Move every tagged part into a new `multipart/multilingual` appended
    /// after the last entry.
    ///
    /// If some part has no `Content-Language`, `prompt` decides whether to go
    /// on. Returns the group's view position.
    pub fn group_multilingual(&mut self, prompt: &mut dyn Prompt) -> Result<usize> {
        let members = self.group_members("multilingual")?;
        let all_tagged_with_language = members
            .iter()
            .all(|&r| self.tree[self.idx[r].node].has_language());
        if !all_tagged_with_language {
            match prompt.ask(LANGUAGE_QUESTION, Answer::Yes) {
                Answer::Yes => {}
                Answer::No => return Err(ComposeError::Declined),
                Answer::Abort => return Err(ComposeError::Cancelled),
            }
        }

        let first_node = self.idx[members[0]].node;
        let description = group_description("Multilingual part for", &self.tree[first_node])
            .unwrap_or_else(|| "unknown multilingual group".to_string());
        let group = self
            .tree
            .insert(AttachmentNode::multipart("multilingual").with_description(description));
        let nodes = self.adopt_members(group, &members);
        let unowned = self.remove_entries(&members);

        let view = self.append_existing(group, false);
        for e in &mut self.idx {
            if unowned.contains(&e.node) {
                e.unowned = true;
            }
        }
        info!(parts = nodes.len(), "Grouped multilingual parts");
        Ok(view)
    }

    /// Storage positions of the tagged, non-container entries.
    fn group_members(&self, kind: &'static str) -> Result<Vec<usize>> {
        let members: Vec<usize> = self
            .idx
            .iter()
            .enumerate()
            .filter(|(_, e)| self.tree[e.node].tagged && !self.is_expanded(e.node))
            .map(|(i, _)| i)
            .collect();
        if members.len() < 2 {
            return Err(ComposeError::NotEnoughTagged(kind));
        }
        Ok(members)
    }

    /// Unhook each member from its chain and hang it under `group`, in order.
    fn adopt_members(&mut self, group: NodeId, members: &[usize]) -> Vec<NodeId> {
        let nodes: Vec<NodeId> = members.iter().map(|&r| self.idx[r].node).collect();
        let mut tail: Option<NodeId> = None;
        for &id in &nodes {
            self.tree.detach(id);
            let node = &mut self.tree[id];
            node.tagged = false;
            node.disposition = Disposition::Inline;
            match tail {
                Some(prev) => self.tree.set_next(prev, Some(id)),
                None => self.tree.set_first_child(group, Some(id)),
            }
            tail = Some(id);
            debug!(node = id.index(), "Moved part into group");
        }
        nodes
    }

    /// Drop the entries at `positions` (ascending); returns the nodes of the
    /// removed entries that were marked unowned.
    fn remove_entries(&mut self, positions: &[usize]) -> HashSet<NodeId> {
        let mut unowned = HashSet::new();
        for &r in positions.iter().rev() {
            let e = self.idx.remove(r);
            if e.unowned {
                unowned.insert(e.node);
            }
        }
        unowned
    }
}

fn group_description(prefix: &str, first: &AttachmentNode) -> Option<String> {
    let name = first
        .description
        .clone()
        .filter(|d| !d.is_empty())
        .or_else(|| first.filename())?;
    Some(format!("{prefix} \"{name}\""))
}
