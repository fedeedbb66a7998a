//! Newline framing for streamed response bodies.

use bytes::BytesMut;

/// Longest partial line kept before the buffer reports an overflow
pub const DEFAULT_MAX_LINE_LEN: usize = 1024 * 1024;

/// Accumulates body chunks and yields complete lines.
///
/// Both `\n` and `\r\n` terminate a line. Blank lines are keep-alives and are
/// dropped. A partial line is kept until the chunk that completes it arrives.
#[derive(Debug)]
pub struct LineBuffer {
    pending: BytesMut,
    /// Leading bytes of `pending` already known to hold no newline
    scanned: usize,
    max_line_len: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line_len(DEFAULT_MAX_LINE_LEN)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_len(max_line_len: usize) -> Self {
        Self {
            pending: BytesMut::new(),
            scanned: 0,
            max_line_len,
        }
    }

    /// Feed one chunk, returning every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending[self.scanned..].iter().position(|b| *b == b'\n') {
            let raw = self.pending.split_to(self.scanned + pos + 1);
            self.scanned = 0;
            if let Some(line) = decode_line(&raw) {
                lines.push(line);
            }
        }
        self.scanned = self.pending.len();
        lines
    }

    /// Whether the unterminated tail has grown past the line length cap
    pub fn is_overflowing(&self) -> bool {
        self.pending.len() > self.max_line_len
    }

    pub fn max_line_len(&self) -> usize {
        self.max_line_len
    }

    /// Number of buffered bytes not yet terminated by a newline
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Take whatever partial line is left, e.g. when the body ends
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        let raw = self.pending.split();
        decode_line(&raw)
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_end_matches(['\r', '\n']).trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
