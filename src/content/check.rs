//! Validation run before the message is sent or postponed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::encoding;
use crate::compose::AttachmentContext;
use crate::error::{ComposeError, Result};
use crate::prompt::{Answer, Prompt};

/// Outcome of [`AttachmentContext::check_attachments`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    /// Number of file-backed parts examined.
    pub checked: usize,
    /// 1-based numbers of parts whose encoding was recomputed.
    pub updated: Vec<usize>,
    /// 1-based numbers of modified parts the user chose to leave alone.
    pub stale_kept: Vec<usize>,
}

impl AttachmentContext {
    /// Make sure every backing file still exists and offer to refresh the
    /// encoding of files modified since they were classified.
    ///
    /// Nothing is changed unless the whole list passes: a missing file or an
    /// "abort" answer leaves every part as it was.
    pub fn check_attachments(&mut self, prompt: &mut dyn Prompt) -> Result<CheckReport> {
        let mut report = CheckReport::default();
        let mut to_update = Vec::new();

        for (i, e) in self.idx.iter().enumerate() {
            let node = &self.tree[e.node];
            let Some(path) = node.path() else {
                continue;
            };
            report.checked += 1;
            let meta = std::fs::metadata(path).map_err(|err| {
                warn!(entry = i + 1, path = %path.display(), error = %err, "Attachment is gone");
                ComposeError::AttachmentMissing {
                    number: i + 1,
                    path: path.to_path_buf(),
                }
            })?;
            let modified = meta.modified().ok().map(DateTime::<Utc>::from);
            let stale = match node.stamp {
                None => true,
                Some(stamp) => modified.is_some_and(|m| m > stamp),
            };
            if !stale {
                continue;
            }
            let question = format!(
                "Attachment #{} modified. Update encoding for {}?",
                i + 1,
                path.display()
            );
            match prompt.ask(&question, Answer::Yes) {
                Answer::Yes => to_update.push(i),
                Answer::No => report.stale_kept.push(i + 1),
                Answer::Abort => return Err(ComposeError::Cancelled),
            }
        }

        // Rescan everything before writing anything back
        let mut refreshed = Vec::with_capacity(to_update.len());
        for i in to_update {
            let (info, enc) = encoding::classify(&self.tree[self.idx[i].node], &self.settings)?;
            refreshed.push((i, info, enc));
        }
        for (i, info, enc) in refreshed {
            let id = self.idx[i].node;
            encoding::apply_classification(&mut self.tree[id], info, enc);
            debug!(entry = i + 1, "Refreshed modified attachment");
            report.updated.push(i + 1);
        }
        info!(
            checked = report.checked,
            updated = report.updated.len(),
            "Attachment check passed"
        );
        Ok(report)
    }
}
