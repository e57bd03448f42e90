//! A single MIME body part in the outgoing message.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::message::EmbeddedMessage;
use super::tree::NodeId;
use crate::content::info::ContentInfo;
use crate::error::ComposeError;

/// What a node carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// A leaf backed by a file on disk.
    File,
    /// A leaf wrapping a whole message owned by someone else.
    Message,
    /// A container of child parts.
    Multipart,
}

/// `Content-Disposition` of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    pub fn toggled(self) -> Self {
        match self {
            Self::Inline => Self::Attachment,
            Self::Attachment => Self::Inline,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => f.write_str("inline"),
            Self::Attachment => f.write_str("attachment"),
        }
    }
}

/// `Content-Transfer-Encoding` of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Encoding {
    SevenBit,
    EightBit,
    Binary,
    QuotedPrintable,
    Base64,
    UuEncoded,
}

impl Encoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::QuotedPrintable => "quoted-printable",
            Self::Base64 => "base64",
            Self::UuEncoded => "x-uuencode",
        }
    }

    /// Parse a user-supplied encoding, refusing the ones a part may not be set to.
    pub fn parse_editable(s: &str) -> Result<Self, ComposeError> {
        match s.parse::<Self>()? {
            Self::UuEncoded => Err(ComposeError::InvalidEncoding(s.to_string())),
            enc => Ok(enc),
        }
    }
}

impl FromStr for Encoding {
    type Err = ComposeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "7bit" => Ok(Self::SevenBit),
            "8bit" => Ok(Self::EightBit),
            "binary" => Ok(Self::Binary),
            "quoted-printable" => Ok(Self::QuotedPrintable),
            "base64" => Ok(Self::Base64),
            "x-uuencode" | "x-uue" | "uuencode" => Ok(Self::UuEncoded),
            _ => Err(ComposeError::InvalidEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = ComposeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Encoding> for String {
    fn from(enc: Encoding) -> Self {
        enc.as_str().to_string()
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a node.
#[derive(Debug, Clone)]
pub enum NodeBody {
    /// Content lives in a file this session may own.
    File { path: PathBuf },
    /// A copy of an embedded message sits in `path`; the parsed message itself
    /// belongs to whoever holds the strong reference.
    Message {
        path: PathBuf,
        message: Weak<EmbeddedMessage>,
    },
    /// Container; children hang off `first_child` via next-sibling links.
    Multipart { first_child: Option<NodeId> },
}

/// A MIME body part.
///
/// Tree links (`next`, `first_child`) are managed by [`MimeTree`](super::tree::MimeTree)
/// and cannot be set from outside the model.
#[derive(Debug, Clone)]
pub struct AttachmentNode {
    /// Major type (`text`, `image`, `multipart`, ...).
    pub main_type: String,
    /// Subtype (`plain`, `alternative`, ...).
    pub subtype: String,
    pub(crate) body: NodeBody,
    pub disposition: Disposition,
    pub encoding: Encoding,
    /// `Content-Language` tag.
    pub language: Option<String>,
    /// `Content-Description`.
    pub description: Option<String>,
    /// Filename announced to the recipient, overriding the backing file name.
    pub display_filename: Option<String>,
    /// Multipart boundary token (composites only).
    pub boundary: Option<String>,
    /// Cached byte classification of the backing file.
    pub content: Option<ContentInfo>,
    /// When the encoding was last computed from the file.
    pub stamp: Option<DateTime<Utc>>,
    /// User selection marker.
    pub tagged: bool,
    /// Remove the backing file when the node is released.
    pub unlink: bool,
    /// Send text without charset conversion.
    pub noconv: bool,
    pub(crate) next: Option<NodeId>,
}

impl AttachmentNode {
    fn with_body(main_type: &str, subtype: &str, body: NodeBody) -> Self {
        Self {
            main_type: main_type.to_string(),
            subtype: subtype.to_string(),
            body,
            disposition: Disposition::Attachment,
            encoding: Encoding::SevenBit,
            language: None,
            description: None,
            display_filename: None,
            boundary: None,
            content: None,
            stamp: None,
            tagged: false,
            unlink: false,
            noconv: false,
            next: None,
        }
    }

    /// A leaf backed by `path`. The MIME type is guessed from the extension.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let guess = mime_guess::from_path(&path).first_or_octet_stream();
        let mut node = Self::with_body(
            guess.type_().as_str(),
            guess.subtype().as_str(),
            NodeBody::File { path },
        );
        node.stamp = Some(Utc::now());
        node
    }

    /// A `message/rfc822` leaf whose copy lives at `path`.
    pub fn message(path: impl Into<PathBuf>, message: &Rc<EmbeddedMessage>) -> Self {
        let mut node = Self::with_body(
            "message",
            "rfc822",
            NodeBody::Message {
                path: path.into(),
                message: Rc::downgrade(message),
            },
        );
        node.disposition = Disposition::Inline;
        node.description = message.subject.clone();
        node.stamp = Some(Utc::now());
        node
    }

    /// An empty `multipart/<subtype>` container with a fresh boundary.
    pub fn multipart(subtype: &str) -> Self {
        let mut node = Self::with_body(
            "multipart",
            subtype,
            NodeBody::Multipart { first_child: None },
        );
        node.disposition = Disposition::Inline;
        node.boundary = Some(generate_boundary());
        node
    }

    pub fn with_type(mut self, main_type: &str, subtype: &str) -> Self {
        self.main_type = main_type.to_ascii_lowercase();
        self.subtype = subtype.to_ascii_lowercase();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::File { .. } => NodeKind::File,
            NodeBody::Message { .. } => NodeKind::Message,
            NodeBody::Multipart { .. } => NodeKind::Multipart,
        }
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, NodeBody::Multipart { .. })
    }

    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// `type/subtype` string.
    pub fn content_type(&self) -> String {
        format!("{}/{}", self.main_type, self.subtype)
    }

    /// Backing file of a leaf; `None` for containers.
    pub fn path(&self) -> Option<&Path> {
        match &self.body {
            NodeBody::File { path } | NodeBody::Message { path, .. } => Some(path),
            NodeBody::Multipart { .. } => None,
        }
    }

    /// The embedded message, if this is a message leaf and it is still alive.
    pub fn embedded_message(&self) -> Option<Rc<EmbeddedMessage>> {
        match &self.body {
            NodeBody::Message { message, .. } => message.upgrade(),
            _ => None,
        }
    }

    pub fn body(&self) -> &NodeBody {
        &self.body
    }

    pub fn next(&self) -> Option<NodeId> {
        self.next
    }

    pub fn first_child(&self) -> Option<NodeId> {
        match self.body {
            NodeBody::Multipart { first_child } => first_child,
            _ => None,
        }
    }

    /// Name shown to the user: description, then display filename, then file name.
    pub fn label(&self) -> String {
        if let Some(d) = self.description.as_deref().filter(|d| !d.is_empty()) {
            return d.to_string();
        }
        self.filename().unwrap_or_default()
    }

    /// Display filename, falling back to the backing file's name.
    pub fn filename(&self) -> Option<String> {
        if let Some(name) = self.display_filename.as_deref().filter(|n| !n.is_empty()) {
            return Some(name.to_string());
        }
        self.path()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }

    pub fn has_language(&self) -> bool {
        self.language.as_deref().is_some_and(|l| !l.is_empty())
    }
}

/// Generate a multipart boundary token unique within this process.
pub fn generate_boundary() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(COUNTER.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    let digest = hasher.finalize();
    digest[..12].iter().map(|b| format!("{b:02x}")).collect()
}
