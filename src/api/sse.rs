//! Incremental Server-Sent Events decoder.
//!
//! Only `data:` fields matter for the job stream. Bytes are buffered until
//! a full line is available, so frames split across network chunks (even
//! inside a multi-byte character) decode correctly.

use tracing::warn;

/// Longest line kept while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Accumulates raw bytes and yields one string per dispatched event.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to contain no newline.
    scanned: usize,
    data: Vec<String>,
    max_line: usize,
    /// Skipping the tail of a line that outgrew `max_line`.
    skipping_line: bool,
    /// Skipping the rest of the event that line belonged to.
    dropping_event: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            data: Vec::new(),
            max_line,
            skipping_line: false,
            dropping_event: false,
        }
    }

    /// Feed a chunk; returns the payloads of every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut dispatched = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + offset;
            self.scanned = end + 1;

            let mut line = &self.buffer[start..end];
            start = end + 1;
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }

            if self.skipping_line {
                self.skipping_line = false;
                continue;
            }

            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(payload) = self.process_line(&line) {
                dispatched.push(payload);
            }
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > self.max_line {
            warn!(limit = self.max_line, "Dropping oversized stream event");
            self.buffer.clear();
            self.scanned = 0;
            self.data.clear();
            self.skipping_line = true;
            self.dropping_event = true;
        }

        dispatched
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if std::mem::take(&mut self.dropping_event) || self.data.is_empty() {
                self.data.clear();
                return None;
            }
            let payload = self.data.join("\n");
            self.data.clear();
            return Some(payload);
        }

        // Comment line, used by some servers as a keep-alive.
        if line.starts_with(':') || self.dropping_event {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}
