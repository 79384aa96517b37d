//! Line framing for server-sent event bodies.
//!
//! Response bodies arrive in arbitrary byte chunks. `LineBuffer` keeps the
//! unterminated tail between reads so a line (and any multi-byte UTF-8
//! sequence inside it) is only decoded once it is complete.

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }

    /// Flush whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
        Some(line)
    }
}

/// Extract the payload of a `data:` line.
///
/// Returns `None` for blank lines, `:` comments, and other SSE fields.
pub fn data_payload(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    line.strip_prefix("data:").map(str::trim)
}

/// Terminal sentinel used by OpenAI-compatible streams.
pub const DONE_SENTINEL: &str = "[DONE]";
