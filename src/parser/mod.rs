//! Seeding a compose session from drafts or manifests, and edit scripts.

pub mod draft;
pub mod manifest;
pub mod script;
