//! `mimecompose`: the attachment list of a message being composed.
//!
//! This crate keeps a MIME part tree and a flattened, numbered view of it in
//! step while parts are attached, deleted, reordered, grouped into
//! `multipart/alternative` or `multipart/multilingual` containers, and
//! validated before sending.

pub mod compose;
pub mod config;
pub mod content;
pub mod error;
pub mod model;
pub mod parser;
pub mod prompt;
