//! Whole messages embedded as `message/rfc822` parts.
//!
//! The parsed message is owned by a [`MessageStore`] (or whatever collaborator
//! produced it). Nodes only keep a weak reference, so removing a part from the
//! compose tree can never free the message it points at.

use std::rc::Rc;

/// Summary of one part of an embedded message.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PartSummary {
    /// MIME content type (e.g. `"text/plain"`).
    pub content_type: String,
    /// Decoded size in bytes.
    pub size: u64,
}

/// A message attached to the one being composed.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EmbeddedMessage {
    /// Decoded `Subject:`.
    pub subject: Option<String>,
    /// First `From:` address, as `Name <addr>` or a bare address.
    pub from: Option<String>,
    /// The `Message-ID` header value.
    pub message_id: Option<String>,
    /// Non-container parts of the message, in document order.
    pub parts: Vec<PartSummary>,
}

/// Keeps embedded messages alive for the duration of a compose session.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Vec<Rc<EmbeddedMessage>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a message and hand back a shared handle to it.
    pub fn add(&mut self, message: EmbeddedMessage) -> Rc<EmbeddedMessage> {
        let rc = Rc::new(message);
        self.messages.push(Rc::clone(&rc));
        rc
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<EmbeddedMessage>> {
        self.messages.iter()
    }
}
