//! Core data model: MIME parts, the tree that links them, and embedded messages.

pub mod message;
pub mod node;
pub mod tree;
