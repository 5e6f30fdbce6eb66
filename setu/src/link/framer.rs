//! Bounded newline framing for the inbound byte stream.
//!
//! Reads from the transport arrive in arbitrary chunks; a status line may be
//! split across any number of them. The framer keeps the unterminated tail
//! between pushes and never holds more than `max_line_len` bytes: an
//! over-long line is discarded up to its delimiter.

/// Line delimiter on the wire
pub const DELIMITER: u8 = b'\n';

/// Incremental line decoder
#[derive(Debug)]
pub struct LineFramer {
    pending: Vec<u8>,
    max_line_len: usize,
    /// Inside an over-long line; bytes are dropped until the next delimiter
    discarding: bool,
    oversized: u64,
}

impl LineFramer {
    pub fn new(max_line_len: usize) -> Self {
        Self {
            pending: Vec::with_capacity(max_line_len.min(256)),
            max_line_len,
            discarding: false,
            oversized: 0,
        }
    }

    /// Feed a chunk, returning every line it completes.
    ///
    /// Lines come back without the delimiter or a trailing `\r`; empty lines
    /// are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == DELIMITER) {
            self.append(&rest[..pos]);
            if let Some(line) = self.finish_line() {
                lines.push(line);
            }
            rest = &rest[pos + 1..];
        }
        self.append(rest);

        lines
    }

    /// Bytes held for the current unterminated line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Lines dropped for exceeding the length bound
    pub fn oversized_lines(&self) -> u64 {
        self.oversized
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.discarding || bytes.is_empty() {
            return;
        }
        // A trailing '\r' is stripped at the delimiter, so it doesn't count
        let limit = if bytes.last() == Some(&b'\r') {
            self.max_line_len + 1
        } else {
            self.max_line_len
        };
        if self.pending.len() + bytes.len() > limit {
            self.pending.clear();
            self.discarding = true;
            self.oversized += 1;
            tracing::warn!(
                "Dropping inbound line longer than {} bytes",
                self.max_line_len
            );
            return;
        }
        self.pending.extend_from_slice(bytes);
    }

    fn finish_line(&mut self) -> Option<Vec<u8>> {
        if self.discarding {
            self.discarding = false;
            return None;
        }
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.pending))
    }
}
