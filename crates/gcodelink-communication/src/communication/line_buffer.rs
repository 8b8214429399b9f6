//! Inbound line assembly
//!
//! Controllers answer with `\n` or `\r\n` terminated lines that may arrive
//! split across reads, or several to a read.

use tracing::warn;

/// Longest line kept before the buffer is flushed as garbage.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Accumulates bytes and yields complete lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add bytes and return every line they complete
    ///
    /// Lines are returned without their terminator; empty lines are
    /// dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                let line = String::from_utf8_lossy(&self.buf);
                let line = line.trim_end_matches('\r').trim();
                if !line.is_empty() {
                    lines.push(line.to_string());
                }
                self.buf.clear();
            } else {
                self.buf.push(b);
                if self.buf.len() > MAX_LINE_LENGTH {
                    warn!("Discarding {} bytes without a line terminator", self.buf.len());
                    self.buf.clear();
                }
            }
        }
        lines
    }

    /// Bytes waiting for a terminator
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
