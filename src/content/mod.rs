//! Content classification, transfer-encoding choice, and the pre-send check.

pub mod check;
pub mod encoding;
pub mod info;
