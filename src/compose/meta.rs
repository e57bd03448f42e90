//! Per-part metadata edits.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, warn};

use super::AttachmentContext;
use crate::content::encoding;
use crate::error::{ComposeError, Result};
use crate::model::node::{Disposition, Encoding, NodeBody, NodeKind};

impl AttachmentContext {
    /// Set or clear (`""`) the `Content-Description`.
    pub fn set_description(&mut self, view: usize, description: &str) -> Result<()> {
        let node = self.node_mut(view)?;
        node.description = non_empty(description);
        debug!(entry = view + 1, "Changed description");
        Ok(())
    }

    /// Set or clear (`""`) the `Content-Language`.
    pub fn set_language(&mut self, view: usize, language: &str) -> Result<()> {
        let node = self.node_mut(view)?;
        node.language = non_empty(language);
        debug!(entry = view + 1, language, "Changed language");
        Ok(())
    }

    /// Set or clear (`""`) the filename announced to the recipient.
    pub fn rename(&mut self, view: usize, filename: &str) -> Result<()> {
        let node = self.node_mut(view)?;
        if node.is_multipart() {
            return Err(ComposeError::NotALeaf);
        }
        node.display_filename = non_empty(filename);
        debug!(entry = view + 1, filename, "Changed display filename");
        Ok(())
    }

    /// Move the backing file of a part to `new_path` and point the part at it.
    ///
    /// An existing file at `new_path` is never replaced. The stamp is renewed
    /// so the move does not count as a modification.
    pub fn rename_file(&mut self, view: usize, new_path: &Path) -> Result<()> {
        let node = self.node_mut(view)?;
        let NodeBody::File { path } = &mut node.body else {
            return Err(ComposeError::NotALeaf);
        };
        if new_path.exists() {
            return Err(ComposeError::io(
                new_path,
                std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            ));
        }
        std::fs::rename(&*path, new_path).map_err(|e| ComposeError::io(&*path, e))?;
        debug!(
            entry = view + 1,
            from = %path.display(),
            to = %new_path.display(),
            "Moved attachment file"
        );
        *path = new_path.to_path_buf();
        node.stamp = Some(Utc::now());
        Ok(())
    }

    /// Set the transfer encoding from its name.
    pub fn set_encoding(&mut self, view: usize, name: &str) -> Result<Encoding> {
        let encoding = Encoding::parse_editable(name)?;
        let node = self.node_mut(view)?;
        node.encoding = encoding;
        debug!(entry = view + 1, %encoding, "Changed encoding");
        Ok(encoding)
    }

    /// Change the MIME type of a part.
    ///
    /// Containers can only become other multiparts and leaves can never
    /// become multiparts. Leaves get a fresh encoding for the new type.
    pub fn set_content_type(&mut self, view: usize, content_type: &str) -> Result<()> {
        let invalid = || ComposeError::InvalidContentType(content_type.to_string());
        let (main, sub) = content_type.trim().split_once('/').ok_or_else(invalid)?;
        let valid_token = |s: &str| {
            !s.is_empty()
                && s.bytes()
                    .all(|b| b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?=".contains(&b))
        };
        if !valid_token(main) || !valid_token(sub) {
            return Err(invalid());
        }
        let (main, sub) = (main.to_ascii_lowercase(), sub.to_ascii_lowercase());

        let r = self.resolve(view)?;
        let id = self.idx[r].node;
        let was_container = self.tree[id].is_multipart();
        if was_container != (main == "multipart") {
            return Err(invalid());
        }
        let was_expanded = self.is_expanded(id);

        let settings = self.settings.clone();
        let node = &mut self.tree[id];
        node.main_type = main;
        node.subtype = sub;
        debug!(entry = view + 1, content_type = %node.content_type(), "Changed content type");
        if was_container {
            if was_expanded != self.is_expanded(id) {
                // The part switched between opaque and expanded
                self.regenerate();
            } else {
                let subtype = self.tree[id].subtype.clone();
                let end = self.span_end(r);
                let child_level = self.idx[r].level + 1;
                for e in &mut self.idx[r + 1..end] {
                    if e.level == child_level {
                        e.parent_subtype = Some(subtype.clone());
                    }
                }
            }
            return Ok(());
        }
        node.content = None;
        if let Err(err) = encoding::update_encoding(node, &settings) {
            warn!(entry = view + 1, error = %err, "Could not re-examine part after type change");
        }
        Ok(())
    }

    /// Flip between `inline` and `attachment`; returns the new value.
    pub fn toggle_disposition(&mut self, view: usize) -> Result<Disposition> {
        let node = self.node_mut(view)?;
        node.disposition = node.disposition.toggled();
        Ok(node.disposition)
    }

    /// Flip whether the backing file is deleted when the part is released.
    ///
    /// Returns the new value. User-owned files cannot be flagged.
    pub fn toggle_unlink(&mut self, view: usize) -> Result<bool> {
        let r = self.resolve(view)?;
        let unowned = self.idx[r].unowned;
        let node = &mut self.tree[self.idx[r].node];
        if node.kind() != NodeKind::File {
            return Err(ComposeError::NotALeaf);
        }
        node.unlink = !node.unlink && !unowned;
        debug!(entry = view + 1, unlink = node.unlink, "Toggled unlink");
        Ok(node.unlink)
    }

    /// Flip whether a text part is sent without charset conversion.
    pub fn toggle_recode(&mut self, view: usize) -> Result<bool> {
        let node = self.node_mut(view)?;
        if !node.is_text() {
            return Err(ComposeError::NotTextPart);
        }
        node.noconv = !node.noconv;
        Ok(!node.noconv)
    }

    /// Rescan one part's file and choose its encoding again.
    pub fn update_encoding_at(&mut self, view: usize) -> Result<Encoding> {
        let settings = self.settings.clone();
        let node = self.node_mut(view)?;
        encoding::update_encoding(node, &settings)?;
        Ok(node.encoding)
    }

    /// Rescan every tagged leaf. Returns how many parts were updated.
    ///
    /// Either every tagged part is updated or, if one cannot be read, none is.
    pub fn update_tagged_encodings(&mut self) -> Result<usize> {
        let mut refreshed = Vec::new();
        for e in &self.idx {
            let node = &self.tree[e.node];
            if !node.tagged || node.is_multipart() {
                continue;
            }
            let (info, enc) = encoding::classify(node, &self.settings)?;
            refreshed.push((e.node, info, enc));
        }
        let updated = refreshed.len();
        for (id, info, enc) in refreshed {
            encoding::apply_classification(&mut self.tree[id], info, enc);
        }
        Ok(updated)
    }

    /// Forget the cached classification of a part so it is rescanned on next use.
    pub fn invalidate_content(&mut self, view: usize) -> Result<()> {
        let node = self.node_mut(view)?;
        node.content = None;
        Ok(())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}
