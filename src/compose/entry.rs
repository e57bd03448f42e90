//! One row of the flattened attachment list.

use serde::Serialize;

use crate::model::tree::{FlatPart, NodeId};

/// Display-side wrapper around a node of the MIME tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentIndex {
    /// The part this entry shows.
    pub node: NodeId,
    /// Nesting depth; 0 for the top-level chain.
    pub level: usize,
    /// Subtype of the enclosing multipart (`None` at top level).
    pub parent_subtype: Option<String>,
    /// Display order (0-based, dense).
    pub num: usize,
    /// The backing file belongs to the user and must never be unlinked.
    pub unowned: bool,
    /// Descendants are hidden from the view.
    pub collapsed: bool,
}

impl AttachmentIndex {
    pub(crate) fn from_flat(part: FlatPart) -> Self {
        Self {
            node: part.node,
            level: part.level,
            parent_subtype: part.parent_subtype,
            num: 0,
            unowned: false,
            collapsed: false,
        }
    }

    pub(crate) fn new(node: NodeId, level: usize, parent_subtype: Option<String>) -> Self {
        Self {
            node,
            level,
            parent_subtype,
            num: 0,
            unowned: false,
            collapsed: false,
        }
    }
}
