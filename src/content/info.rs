//! Byte-level classification of attachment content.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use serde::Serialize;
use tracing::debug;

use crate::error::{ComposeError, Result};

/// Counts gathered from one pass over a part's bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentInfo {
    /// Bytes with the high bit set.
    pub hibin: u64,
    /// Control bytes other than tab, form feed and line terminators (NUL included).
    pub lobin: u64,
    /// NUL bytes.
    pub nulbin: u64,
    /// Line terminators: `\n`, `\r` and `\r\n` each count once.
    pub crlf: u64,
    /// Printable ASCII, tab and form feed.
    pub ascii: u64,
    /// Longest line, terminators excluded.
    pub linemax: u64,
    /// Some line ends in whitespace.
    pub space: bool,
    /// A bare `\r` not followed by `\n` was seen.
    pub binary: bool,
    /// Some line starts with `From `.
    pub from: bool,
    /// Some line consists of a single `.`.
    pub dot: bool,
    /// The content uses `\r` line terminators.
    pub cr: bool,
}

impl ContentInfo {
    /// Classify a byte buffer.
    pub fn scan(bytes: &[u8]) -> Self {
        let mut info = Self::default();
        let mut linelen: u64 = 0;
        let mut trailing_ws = false;
        let mut was_cr = false;
        let mut from_state: usize = 0;
        let mut dot = false;

        for &ch in bytes {
            if was_cr {
                was_cr = false;
                if ch == b'\n' {
                    // CRLF: the terminator was counted at the CR
                    continue;
                }
                info.binary = true;
            }

            // Track "From " at the start of a line
            if from_state < 5 {
                if linelen as usize == from_state && ch == b"From "[from_state] {
                    from_state += 1;
                    if from_state == 5 {
                        info.from = true;
                    }
                } else {
                    from_state = 5;
                }
            }

            match ch {
                b'\n' | b'\r' => {
                    info.crlf += 1;
                    if ch == b'\r' {
                        info.cr = true;
                        was_cr = true;
                    }
                    if trailing_ws {
                        info.space = true;
                    }
                    if dot && linelen == 1 {
                        info.dot = true;
                    }
                    info.linemax = info.linemax.max(linelen);
                    linelen = 0;
                    trailing_ws = false;
                    from_state = 0;
                    dot = false;
                    continue;
                }
                _ if ch & 0x80 != 0 => info.hibin += 1,
                b'\t' | 0x0c => {
                    info.ascii += 1;
                    trailing_ws = true;
                    linelen += 1;
                    continue;
                }
                0 => {
                    info.nulbin += 1;
                    info.lobin += 1;
                }
                _ if ch < 32 || ch == 127 => info.lobin += 1,
                _ => {
                    info.ascii += 1;
                    if linelen == 0 && ch == b'.' {
                        dot = true;
                    }
                }
            }
            trailing_ws = ch == b' ';
            linelen += 1;
        }

        info.linemax = info.linemax.max(linelen);
        if trailing_ws {
            info.space = true;
        }
        if dot && linelen == 1 {
            info.dot = true;
        }
        info
    }

    /// Classify the contents of a file.
    ///
    /// The file is memory-mapped rather than read, so large attachments are
    /// not copied into memory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| ComposeError::io(path, e))?;
        let len = file
            .metadata()
            .map_err(|e| ComposeError::io(path, e))?
            .len();
        if len == 0 {
            return Ok(Self::default());
        }
        // SAFETY: the map is read-only and dropped before returning. A
        // concurrent truncation by another process is the usual mmap caveat.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| ComposeError::io(path, e))?;
        let info = Self::scan(&map);
        debug!(path = %path.display(), bytes = len, "Scanned attachment content");
        Ok(info)
    }

    /// Total number of bytes classified (a CRLF pair counts once).
    pub fn total(&self) -> u64 {
        self.hibin + self.lobin + self.ascii + self.crlf
    }
}
