//! Seed a compose session from a TOML manifest.
//!
//! ```toml
//! [[part]]
//! path = "body.txt"
//! language = "en"
//!
//! [[part]]
//! group = "alternative"
//! description = "Greeting"
//!
//!   [[part.part]]
//!   path = "hello.txt"
//!
//!   [[part.part]]
//!   path = "hello.html"
//!
//! [[part]]
//! message = "forwarded.eml"
//! ```
//!
//! Relative paths are resolved against the manifest's directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use super::draft::load_message;
use crate::compose::AttachmentContext;
use crate::config::ComposeConfig;
use crate::content::encoding;
use crate::error::{ComposeError, Result};
use crate::model::message::MessageStore;
use crate::model::node::{AttachmentNode, Disposition, Encoding};
use crate::model::tree::{MimeTree, NodeId};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    #[serde(default, rename = "part")]
    parts: Vec<PartSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PartSpec {
    path: Option<PathBuf>,
    message: Option<PathBuf>,
    group: Option<String>,
    #[serde(rename = "type")]
    content_type: Option<String>,
    description: Option<String>,
    language: Option<String>,
    filename: Option<String>,
    disposition: Option<Disposition>,
    encoding: Option<Encoding>,
    unowned: bool,
    unlink: bool,
    tagged: bool,
    #[serde(rename = "part")]
    parts: Vec<PartSpec>,
}

/// A session described by a manifest, ready to be turned into a context.
#[derive(Debug)]
pub struct Manifest {
    pub tree: MimeTree,
    pub store: MessageStore,
    /// Nodes whose files belong to the user.
    pub unowned: Vec<NodeId>,
}

impl Manifest {
    /// Read and build the manifest at `path`.
    pub fn load(path: &Path, settings: &ComposeConfig) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ComposeError::io(path, e))?;
        let base = path.parent().unwrap_or(Path::new("."));
        let manifest = Self::parse(&text, base, settings).map_err(|reason| ComposeError::Manifest {
            path: path.to_path_buf(),
            reason,
        })?;
        info!(
            path = %path.display(),
            parts = manifest.tree.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Build a manifest from TOML text; relative paths are taken from `base`.
    pub fn parse(
        text: &str,
        base: &Path,
        settings: &ComposeConfig,
    ) -> std::result::Result<Self, String> {
        let file: ManifestFile = toml::from_str(text).map_err(|e| e.to_string())?;
        let mut builder = Builder {
            base,
            settings,
            manifest: Manifest {
                tree: MimeTree::new(),
                store: MessageStore::new(),
                unowned: Vec::new(),
            },
        };
        let top = builder.build_chain(&file.parts, "part")?;
        builder.manifest.tree.set_root(top);
        Ok(builder.manifest)
    }

    /// Start a session on this manifest.
    pub fn into_context(self, settings: ComposeConfig) -> (AttachmentContext, MessageStore) {
        let mut ctx = AttachmentContext::new(self.tree, settings);
        for id in self.unowned {
            ctx.mark_unowned(id);
        }
        (ctx, self.store)
    }
}

struct Builder<'a> {
    base: &'a Path,
    settings: &'a ComposeConfig,
    manifest: Manifest,
}

impl Builder<'_> {
    /// Build a sibling chain; returns its first node.
    fn build_chain(
        &mut self,
        specs: &[PartSpec],
        at: &str,
    ) -> std::result::Result<Option<NodeId>, String> {
        let mut first = None;
        let mut tail: Option<NodeId> = None;
        for (i, spec) in specs.iter().enumerate() {
            let id = self.build(spec, &format!("{at}[{i}]"))?;
            match tail {
                Some(prev) => self.manifest.tree.set_next(prev, Some(id)),
                None => first = Some(id),
            }
            tail = Some(id);
        }
        Ok(first)
    }

    fn build(&mut self, spec: &PartSpec, at: &str) -> std::result::Result<NodeId, String> {
        let sources = [spec.path.is_some(), spec.message.is_some(), spec.group.is_some()];
        if sources.iter().filter(|&&s| s).count() != 1 {
            return Err(format!("{at}: exactly one of 'path', 'message' or 'group' is required"));
        }
        if spec.group.is_none() && !spec.parts.is_empty() {
            return Err(format!("{at}: nested parts need 'group'"));
        }

        let mut node = if let Some(path) = &spec.path {
            let mut node = AttachmentNode::file(self.resolve(path));
            node.unlink = spec.unlink && !spec.unowned;
            node
        } else if let Some(path) = &spec.message {
            let path = self.resolve(path);
            let msg = load_message(&path).map_err(|e| format!("{at}: {e}"))?;
            let rc = self.manifest.store.add(msg);
            AttachmentNode::message(path, &rc)
        } else {
            let subtype = spec.group.as_deref().unwrap_or("mixed");
            if spec.parts.is_empty() {
                return Err(format!("{at}: group '{subtype}' has no parts"));
            }
            AttachmentNode::multipart(subtype)
        };

        if let Some(ct) = &spec.content_type {
            let (main, sub) = ct
                .split_once('/')
                .filter(|(m, s)| !m.is_empty() && !s.is_empty())
                .ok_or_else(|| format!("{at}: invalid type '{ct}'"))?;
            if node.is_multipart() != main.eq_ignore_ascii_case("multipart") {
                return Err(format!("{at}: type '{ct}' does not fit this part"));
            }
            node = node.with_type(main, sub);
        }
        if !node.is_multipart() {
            match spec.encoding {
                Some(enc) => node.encoding = enc,
                None => {
                    if let Err(err) = encoding::update_encoding(&mut node, self.settings) {
                        warn!(part = at, error = %err, "Could not classify part");
                    }
                }
            }
        }
        node.description = spec.description.clone().or(node.description);
        node.language = spec.language.clone();
        node.display_filename = spec.filename.clone();
        if let Some(disposition) = spec.disposition {
            node.disposition = disposition;
        }
        node.tagged = spec.tagged;

        let id = self.manifest.tree.insert(node);
        if spec.unowned {
            self.manifest.unowned.push(id);
        }
        if !spec.parts.is_empty() {
            let children = self.build_chain(&spec.parts, &format!("{at}.part"))?;
            self.manifest.tree.set_first_child(id, children);
        }
        Ok(id)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }
}
