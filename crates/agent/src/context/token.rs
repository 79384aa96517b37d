//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 bytes per token, rounded up.
//! Deterministic and monotonic in the input length, which is all budget
//! accounting needs.

use mindrelay_core::message::Message;

/// Per-message framing cost (role name, delimiters).
pub const DEFAULT_MESSAGE_OVERHEAD: usize = 4;

/// Estimate the token count for a string.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// Estimate tokens for a single message including per-message overhead.
pub fn estimate_message_tokens(message: &Message, overhead: usize) -> usize {
    overhead + estimate_tokens(&message.content)
}

/// Estimate tokens for a slice of messages.
pub fn estimate_messages_tokens(messages: &[Message], overhead: usize) -> usize {
    messages
        .iter()
        .map(|m| estimate_message_tokens(m, overhead))
        .sum()
}
