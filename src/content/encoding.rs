//! Transfer-encoding choice and encoded-size estimation.

use chrono::Utc;
use tracing::debug;

use super::info::ContentInfo;
use crate::config::ComposeConfig;
use crate::error::{ComposeError, Result};
use crate::model::node::{AttachmentNode, Encoding};

/// RFC 5322 line length limit, minus room for the terminator.
const MAX_LINE_LENGTH: u64 = 990;

/// Estimated size of the part once `encoding` has been applied.
pub fn encoded_size(info: &ContentInfo, encoding: Encoding) -> u64 {
    match encoding {
        Encoding::QuotedPrintable => 3 * (info.hibin + info.lobin) + info.ascii + info.crlf,
        Encoding::Base64 => (4 * info.total()).div_ceil(3),
        _ => info.total(),
    }
}

/// Pick a transfer encoding for a part of type `main_type/subtype`.
pub fn choose_encoding(node: &AttachmentNode, info: &ContentInfo, cfg: &ComposeConfig) -> Encoding {
    if node.is_text() {
        if info.lobin > 0 || info.linemax > MAX_LINE_LENGTH || (info.from && cfg.encode_from) {
            Encoding::QuotedPrintable
        } else if info.hibin > 0 {
            if cfg.allow_8bit {
                Encoding::EightBit
            } else {
                Encoding::QuotedPrintable
            }
        } else {
            Encoding::SevenBit
        }
    } else if node.main_type.eq_ignore_ascii_case("message") {
        if info.hibin > 0 {
            Encoding::EightBit
        } else {
            Encoding::SevenBit
        }
    } else if info.lobin > 0 || info.hibin > 0 {
        if cfg.allow_8bit && info.lobin == 0 {
            Encoding::EightBit
        } else {
            Encoding::Base64
        }
    } else {
        Encoding::SevenBit
    }
}

/// Return the node's content classification, scanning the file on first use.
pub fn ensure_content_info(node: &mut AttachmentNode) -> Result<ContentInfo> {
    if let Some(info) = node.content {
        return Ok(info);
    }
    let path = node.path().ok_or(ComposeError::NotALeaf)?;
    let info = ContentInfo::from_file(path)?;
    node.content = Some(info);
    Ok(info)
}

/// Scan the backing file and pick an encoding, leaving the node untouched.
pub fn classify(node: &AttachmentNode, cfg: &ComposeConfig) -> Result<(ContentInfo, Encoding)> {
    let path = node.path().ok_or(ComposeError::NotALeaf)?;
    let info = ContentInfo::from_file(path)?;
    Ok((info, choose_encoding(node, &info, cfg)))
}

/// Store a result of [`classify`] on the node and restamp it.
pub fn apply_classification(node: &mut AttachmentNode, info: ContentInfo, encoding: Encoding) {
    debug!(
        path = %node.path().map(|p| p.display().to_string()).unwrap_or_default(),
        old = %node.encoding,
        new = %encoding,
        "Updated attachment encoding"
    );
    node.content = Some(info);
    node.encoding = encoding;
    node.stamp = Some(Utc::now());
}

/// Rescan the backing file, choose a new encoding, and restamp the node.
pub fn update_encoding(node: &mut AttachmentNode, cfg: &ComposeConfig) -> Result<()> {
    let (info, encoding) = classify(node, cfg)?;
    apply_classification(node, info, encoding);
    Ok(())
}

/// Estimated encoded size of one part, if it can be classified.
pub fn estimate_node(node: &mut AttachmentNode) -> Result<u64> {
    let info = ensure_content_info(node)?;
    Ok(encoded_size(&info, node.encoding))
}
