//! Seed a compose session from a saved draft (`.eml`).
//!
//! Every leaf of the draft is decoded and written to a spool file that the
//! session owns. Multiparts become containers; nested `message/rfc822` parts
//! become embedded-message leaves whose parsed content lives in the returned
//! [`MessageStore`].

use std::path::{Path, PathBuf};

use mail_parser::{HeaderValue, Message, MessageParser, MessagePart, MimeHeaders, PartType};
use tracing::{debug, info, warn};

use crate::config::ComposeConfig;
use crate::content::encoding;
use crate::error::{ComposeError, Result};
use crate::model::message::{EmbeddedMessage, MessageStore, PartSummary};
use crate::model::node::{generate_boundary, AttachmentNode, Disposition};
use crate::model::tree::{MimeTree, NodeId};

/// Maximum multipart nesting accepted from a draft.
const MAX_DEPTH: usize = 10;

/// Parse the draft at `path` into a tree, spooling leaves under `spool_dir`.
pub fn load_draft(
    path: &Path,
    spool_dir: &Path,
    settings: &ComposeConfig,
) -> Result<(MimeTree, MessageStore)> {
    let data = std::fs::read(path).map_err(|e| ComposeError::io(path, e))?;
    let msg = MessageParser::default()
        .parse(skip_from_line(&data))
        .ok_or_else(|| ComposeError::Draft {
            path: path.to_path_buf(),
            reason: "not an RFC 5322 message".to_string(),
        })?;
    std::fs::create_dir_all(spool_dir).map_err(|e| ComposeError::io(spool_dir, e))?;

    let mut loader = DraftLoader {
        draft: path,
        spool_dir,
        settings,
        prefix: generate_boundary()[..8].to_string(),
        spooled: 0,
        tree: MimeTree::new(),
        store: MessageStore::new(),
    };
    let root = loader.build(&msg, 0, 0)?;
    loader.tree.set_root(Some(root));
    info!(
        path = %path.display(),
        parts = loader.tree.len(),
        spooled = loader.spooled,
        "Loaded draft"
    );
    Ok((loader.tree, loader.store))
}

/// Parse a message file for attaching as `message/rfc822`.
pub fn load_message(path: &Path) -> Result<EmbeddedMessage> {
    let data = std::fs::read(path).map_err(|e| ComposeError::io(path, e))?;
    let msg = MessageParser::default()
        .parse(skip_from_line(&data))
        .ok_or_else(|| ComposeError::Draft {
            path: path.to_path_buf(),
            reason: "not an RFC 5322 message".to_string(),
        })?;
    Ok(summarize(&msg))
}

struct DraftLoader<'a> {
    draft: &'a Path,
    spool_dir: &'a Path,
    settings: &'a ComposeConfig,
    prefix: String,
    spooled: usize,
    tree: MimeTree,
    store: MessageStore,
}

impl DraftLoader<'_> {
    fn build(&mut self, msg: &Message<'_>, part_id: usize, depth: usize) -> Result<NodeId> {
        if depth > MAX_DEPTH {
            return Err(self.error(format!("parts nested deeper than {MAX_DEPTH} levels")));
        }
        let part = msg
            .parts
            .get(part_id)
            .ok_or_else(|| self.error(format!("missing part {part_id}")))?;
        let (main, sub) = content_type_of(part);

        let id = match &part.body {
            PartType::Multipart(children) => {
                let mut node = AttachmentNode::multipart(&sub);
                if let Some(boundary) = part.content_type().and_then(|ct| ct.attribute("boundary")) {
                    node.boundary = Some(boundary.to_string());
                }
                apply_headers(&mut node, part);
                let id = self.tree.insert(node);
                let mut tail: Option<NodeId> = None;
                for &child in children {
                    let child_id = match self.build(msg, child, depth + 1) {
                        Ok(child_id) => child_id,
                        Err(err) => {
                            // Drops the spool files of the children built so far
                            self.tree.release(id);
                            return Err(err);
                        }
                    };
                    match tail {
                        Some(prev) => self.tree.set_next(prev, Some(child_id)),
                        None => self.tree.set_first_child(id, Some(child_id)),
                    }
                    tail = Some(child_id);
                }
                id
            }
            PartType::Message(nested) => {
                let path = self.spool(part, "eml")?;
                let rc = self.store.add(summarize(nested));
                let mut node = AttachmentNode::message(path, &rc);
                node.unlink = true;
                apply_headers(&mut node, part);
                self.classify(&mut node);
                self.tree.insert(node)
            }
            PartType::Text(_) | PartType::Html(_) | PartType::Binary(_) | PartType::InlineBinary(_) => {
                let ext = mime_guess::get_mime_extensions_str(&format!("{main}/{sub}"))
                    .and_then(|exts| exts.first().copied())
                    .unwrap_or("bin");
                let path = self.spool(part, ext)?;
                let mut node = AttachmentNode::file(path).with_type(&main, &sub);
                node.unlink = true;
                node.disposition = match part.content_disposition() {
                    Some(d) if d.ctype().eq_ignore_ascii_case("attachment") => Disposition::Attachment,
                    Some(_) => Disposition::Inline,
                    None if node.is_text() => Disposition::Inline,
                    None => Disposition::Attachment,
                };
                node.display_filename = part.attachment_name().map(str::to_string);
                apply_headers(&mut node, part);
                self.classify(&mut node);
                self.tree.insert(node)
            }
        };
        debug!(part = part_id, depth, content_type = %format!("{main}/{sub}"), "Loaded draft part");
        Ok(id)
    }

    /// Write the decoded body of `part` to a new spool file.
    fn spool(&mut self, part: &MessagePart<'_>, ext: &str) -> Result<PathBuf> {
        self.spooled += 1;
        let name = part
            .attachment_name()
            .and_then(|n| Path::new(n).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("part.{ext}"));
        let path = self
            .spool_dir
            .join(format!("{}-{:02}-{name}", self.prefix, self.spooled));
        std::fs::write(&path, part.contents()).map_err(|e| ComposeError::io(&path, e))?;
        Ok(path)
    }

    fn classify(&self, node: &mut AttachmentNode) {
        if let Err(err) = encoding::update_encoding(node, self.settings) {
            warn!(error = %err, "Could not classify spooled part");
        }
    }

    fn error(&self, reason: String) -> ComposeError {
        ComposeError::Draft {
            path: self.draft.to_path_buf(),
            reason,
        }
    }
}

fn content_type_of(part: &MessagePart<'_>) -> (String, String) {
    if let Some(ct) = part.content_type() {
        if let Some(sub) = ct.subtype() {
            return (ct.ctype().to_ascii_lowercase(), sub.to_ascii_lowercase());
        }
    }
    let (main, sub) = match part.body {
        PartType::Text(_) => ("text", "plain"),
        PartType::Html(_) => ("text", "html"),
        PartType::Message(_) => ("message", "rfc822"),
        PartType::Multipart(_) => ("multipart", "mixed"),
        PartType::Binary(_) | PartType::InlineBinary(_) => ("application", "octet-stream"),
    };
    (main.to_string(), sub.to_string())
}

fn apply_headers(node: &mut AttachmentNode, part: &MessagePart<'_>) {
    if let Some(desc) = part.content_description() {
        node.description = Some(desc.to_string());
    }
    node.language = match part.content_language() {
        HeaderValue::Text(lang) => Some(lang.to_string()),
        HeaderValue::TextList(langs) => Some(langs.join(", ")),
        _ => node.language.take(),
    };
}

fn summarize(msg: &Message<'_>) -> EmbeddedMessage {
    let from = msg.from().and_then(|a| a.first()).map(|addr| {
        match (addr.name.as_deref(), addr.address.as_deref()) {
            (Some(name), Some(email)) => format!("{name} <{email}>"),
            (None, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        }
    });
    let parts = msg
        .parts
        .iter()
        .filter(|p| !matches!(p.body, PartType::Multipart(_)))
        .map(|p| {
            let (main, sub) = content_type_of(p);
            PartSummary {
                content_type: format!("{main}/{sub}"),
                size: p.contents().len() as u64,
            }
        })
        .collect();
    EmbeddedMessage {
        subject: msg.subject().map(str::to_string),
        from,
        message_id: msg.message_id().map(str::to_string),
        parts,
    }
}

/// Skip an mbox `From ` separator line if the file starts with one.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);
    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::NodeKind;

    const DRAFT: &str = "From: Alice <alice@example.com>\r\n\
To: bob@example.com\r\n\
Subject: Report\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
Content-Language: en\r\n\
\r\n\
Hello Bob\r\n\
--inner\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Hello Bob</p>\r\n\
--inner--\r\n\
--outer\r\n\
Content-Type: application/pdf\r\n\
Content-Disposition: attachment; filename=\"report.pdf\"\r\n\
Content-Description: Quarterly numbers\r\n\
Content-Transfer-Encoding: base64\r\n\
\r\n\
JVBERi0xLjQK\r\n\
--outer\r\n\
Content-Type: message/rfc822\r\n\
\r\n\
From: carol@example.com\r\n\
Subject: Forwarded\r\n\
Message-ID: <fwd@example.com>\r\n\
\r\n\
Inner body\r\n\
--outer--\r\n";

    #[test]
    fn test_load_draft_builds_tree() {
        let dir = tempfile::tempdir().unwrap();
        let draft = dir.path().join("draft.eml");
        std::fs::write(&draft, DRAFT).unwrap();
        let spool = dir.path().join("spool");

        let (tree, store) = load_draft(&draft, &spool, &ComposeConfig::default()).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(tree[root].content_type(), "multipart/mixed");
        assert_eq!(tree[root].boundary.as_deref(), Some("outer"));

        let top: Vec<NodeId> = tree.children(root).collect();
        assert_eq!(top.len(), 3);
        assert_eq!(tree[top[0]].content_type(), "multipart/alternative");
        let alt: Vec<NodeId> = tree.children(top[0]).collect();
        assert_eq!(tree[alt[0]].content_type(), "text/plain");
        assert_eq!(tree[alt[0]].language.as_deref(), Some("en"));
        assert_eq!(tree[alt[1]].content_type(), "text/html");

        let pdf = &tree[top[1]];
        assert_eq!(pdf.display_filename.as_deref(), Some("report.pdf"));
        assert_eq!(pdf.description.as_deref(), Some("Quarterly numbers"));
        assert_eq!(pdf.disposition, Disposition::Attachment);
        assert!(pdf.unlink);
        assert_eq!(std::fs::read(pdf.path().unwrap()).unwrap(), b"%PDF-1.4\n");

        let fwd = &tree[top[2]];
        assert_eq!(fwd.kind(), NodeKind::Message);
        let embedded = fwd.embedded_message().unwrap();
        assert_eq!(embedded.subject.as_deref(), Some("Forwarded"));
        assert_eq!(embedded.message_id.as_deref(), Some("fwd@example.com"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_release_removes_spool_files_but_keeps_messages() {
        let dir = tempfile::tempdir().unwrap();
        let draft = dir.path().join("draft.eml");
        std::fs::write(&draft, DRAFT).unwrap();
        let spool = dir.path().join("spool");

        let (mut tree, store) = load_draft(&draft, &spool, &ComposeConfig::default()).unwrap();
        let root = tree.root().unwrap();
        let fwd = tree.children(root).nth(2).unwrap();
        assert!(tree[fwd].unlink);
        assert!(tree[fwd].path().unwrap().exists());

        tree.release_all();
        assert_eq!(std::fs::read_dir(&spool).unwrap().count(), 0);
        let kept = store.iter().next().unwrap();
        assert_eq!(kept.subject.as_deref(), Some("Forwarded"));
    }

    #[test]
    fn test_too_deep_draft_leaves_no_spool_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut body = "Content-Type: text/plain\r\n\r\nbottom\r\n".to_string();
        for level in (0..=MAX_DEPTH + 1).rev() {
            body = format!(
                "Content-Type: multipart/mixed; boundary=\"b{level}z\"\r\n\r\n\
                 --b{level}z\r\nContent-Type: text/plain\r\n\r\nleaf {level}\r\n\
                 --b{level}z\r\n{body}\r\n--b{level}z--\r\n"
            );
        }
        let draft = dir.path().join("deep.eml");
        std::fs::write(&draft, format!("Subject: deep\r\nMIME-Version: 1.0\r\n{body}")).unwrap();
        let spool = dir.path().join("spool");

        let err = load_draft(&draft, &spool, &ComposeConfig::default()).unwrap_err();
        assert!(matches!(err, ComposeError::Draft { .. }));
        assert_eq!(std::fs::read_dir(&spool).unwrap().count(), 0);
    }

    #[test]
    fn test_load_draft_single_part() {
        let dir = tempfile::tempdir().unwrap();
        let draft = dir.path().join("note.eml");
        std::fs::write(&draft, "Subject: hi\n\nJust text\n").unwrap();
        let (tree, store) = load_draft(&draft, dir.path(), &ComposeConfig::default()).unwrap();
        let root = tree.root().unwrap();
        assert_eq!(tree[root].content_type(), "text/plain");
        assert_eq!(tree[root].disposition, Disposition::Inline);
        assert!(tree[root].content.is_some());
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_draft_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_draft(&dir.path().join("nope.eml"), dir.path(), &ComposeConfig::default())
            .unwrap_err();
        assert!(matches!(err, ComposeError::Io { .. }));
    }

    #[test]
    fn test_load_message_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fwd.eml");
        std::fs::write(
            &path,
            "From: Carol <carol@example.com>\nSubject: Minutes\nMessage-ID: <m1@x>\n\nBody\n",
        )
        .unwrap();
        let msg = load_message(&path).unwrap();
        assert_eq!(msg.subject.as_deref(), Some("Minutes"));
        assert_eq!(msg.from.as_deref(), Some("Carol <carol@example.com>"));
        assert_eq!(msg.parts.len(), 1);
        assert_eq!(msg.parts[0].content_type, "text/plain");
    }

    #[test]
    fn test_skip_from_line() {
        assert_eq!(skip_from_line(b"From a@b Mon\nSubject: x\n"), b"Subject: x\n");
        assert_eq!(skip_from_line(b"Subject: x\n"), b"Subject: x\n");
    }
}
