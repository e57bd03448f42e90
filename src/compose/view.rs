//! Read-only rows for displaying the attachment list.

use serde::Serialize;

use super::AttachmentContext;
use crate::content::encoding::encoded_size;
use crate::model::node::{Disposition, Encoding, NodeKind};

/// One visible line of the attachment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewRow {
    /// 1-based display number.
    pub number: usize,
    pub depth: usize,
    /// Tree glyph prefix, e.g. `"| |->"`. Empty at top level.
    pub tree: String,
    pub kind: NodeKind,
    pub content_type: String,
    /// Description, display filename, or file name.
    pub label: String,
    pub tagged: bool,
    pub disposition: Disposition,
    pub encoding: Encoding,
    pub language: Option<String>,
    pub unlink: bool,
    pub unowned: bool,
    pub collapsed: bool,
    /// Estimated encoded size, if the part has been classified.
    pub size: Option<u64>,
}

impl AttachmentContext {
    /// Rows for every visible entry, in view order.
    pub fn view(&self) -> Vec<ViewRow> {
        let prefixes = self.tree_prefixes();
        self.v2r
            .iter()
            .map(|&r| {
                let e = &self.idx[r];
                let node = &self.tree[e.node];
                ViewRow {
                    number: e.num + 1,
                    depth: e.level,
                    tree: prefixes[r].clone(),
                    kind: node.kind(),
                    content_type: node.content_type(),
                    label: node.label(),
                    tagged: node.tagged,
                    disposition: node.disposition,
                    encoding: node.encoding,
                    language: node.language.clone(),
                    unlink: node.unlink,
                    unowned: e.unowned,
                    collapsed: e.collapsed,
                    size: node
                        .content
                        .filter(|_| !node.is_multipart())
                        .map(|info| encoded_size(&info, node.encoding)),
                }
            })
            .collect()
    }

    /// Glyph prefix for every stored entry.
    fn tree_prefixes(&self) -> Vec<String> {
        // more[l]: the current ancestor at depth l has a later sibling
        let mut more: Vec<bool> = Vec::new();
        let mut out = Vec::with_capacity(self.idx.len());
        for e in &self.idx {
            let has_next = self.tree[e.node].next().is_some();
            more.truncate(e.level);
            let mut prefix = String::new();
            if e.level > 0 {
                for &m in more.iter().skip(1) {
                    prefix.push_str(if m { "| " } else { "  " });
                }
                prefix.push_str(if has_next { "|->" } else { "`->" });
            }
            more.push(has_next);
            out.push(prefix);
        }
        out
    }
}
