//! Centralized error types for mimecompose.

use std::path::PathBuf;
use thiserror::Error;

/// Broad classes of failure, used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The edit was rejected before anything changed.
    PreconditionRejected,
    /// A finalize check failed; the session itself is still usable.
    ValidationFailed,
    /// The user answered "no" or "abort" to a question.
    UserDeclined,
    /// I/O, parsing, or an internal inconsistency.
    Internal,
}

/// All errors produced by the mimecompose library.
#[derive(Error, Debug)]
pub enum ComposeError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The session has no attachments at all.
    #[error("There are no attachments")]
    NoAttachments,

    /// Deleting would leave the message without any part.
    #[error("You may not delete the only attachment")]
    DeleteSoleAttachment,

    /// The first part of the message can never be moved.
    #[error("The fundamental part can't be moved")]
    FundamentalPart,

    #[error("Attachment is already at top")]
    AlreadyAtTop,

    #[error("Attachment is already at bottom")]
    AlreadyAtBottom,

    /// Only siblings at the same nesting level can be exchanged.
    #[error("Attachments at different levels can't be swapped")]
    DepthMismatch,

    /// Grouping needs at least two tagged leaf parts.
    #[error("Grouping '{0}' requires at least 2 tagged messages")]
    NotEnoughTagged(&'static str),

    /// A position outside the view, or incompatible with its neighbours.
    #[error("Invalid position {position} (view has {len} entries)")]
    InvalidPosition { position: usize, len: usize },

    /// The operation needs a part backed by a file.
    #[error("Operation not supported on multipart containers")]
    NotALeaf,

    /// Collapsing needs an expanded multipart container.
    #[error("Only multipart containers can be collapsed")]
    NotAContainer,

    #[error("Recoding only affects text attachments")]
    NotTextPart,

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Content-Type is of the form base/sub: {0}")]
    InvalidContentType(String),

    /// A backing file vanished before the message was finalized.
    #[error("Attachment #{number} no longer exists: {path}")]
    AttachmentMissing { number: usize, path: PathBuf },

    /// The user chose "abort".
    #[error("Operation cancelled by user")]
    Cancelled,

    /// The user answered "no" to a confirmation.
    #[error("Operation declined by user")]
    Declined,

    /// A draft message could not be parsed into parts.
    #[error("Draft error in '{path}': {reason}")]
    Draft { path: PathBuf, reason: String },

    /// A session manifest could not be read.
    #[error("Manifest error in '{path}': {reason}")]
    Manifest { path: PathBuf, reason: String },

    /// An edit script line could not be parsed.
    #[error("Script error at line {line}: {reason}")]
    Script { line: usize, reason: String },

    /// The tree and the index disagree. Always a bug.
    #[error("Attachment index is inconsistent: {0}")]
    Inconsistent(String),
}

/// Convenience alias for `Result<T, ComposeError>`.
pub type Result<T> = std::result::Result<T, ComposeError>;

impl ComposeError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Which class of failure this is.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoAttachments
            | Self::DeleteSoleAttachment
            | Self::FundamentalPart
            | Self::AlreadyAtTop
            | Self::AlreadyAtBottom
            | Self::DepthMismatch
            | Self::NotEnoughTagged(_)
            | Self::InvalidPosition { .. }
            | Self::NotALeaf
            | Self::NotAContainer
            | Self::NotTextPart
            | Self::InvalidEncoding(_)
            | Self::InvalidContentType(_) => ErrorCategory::PreconditionRejected,
            Self::AttachmentMissing { .. } => ErrorCategory::ValidationFailed,
            Self::Cancelled | Self::Declined => ErrorCategory::UserDeclined,
            Self::Io { .. }
            | Self::Draft { .. }
            | Self::Manifest { .. }
            | Self::Script { .. }
            | Self::Inconsistent(_) => ErrorCategory::Internal,
        }
    }
}
