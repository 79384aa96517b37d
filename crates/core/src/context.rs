//! Conversation memory types: caller input, long-term facts, and the
//! token-budgeted view built for each turn.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A finalized session summary produced by an external summarizer.
///
/// The memory manager consumes it opaquely as a long-term "fact".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
}

/// Everything the caller supplies for one turn.
///
/// The history is owned so a turn can append to it without copying.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub system_prompt: String,
    #[serde(default)]
    pub facts: Vec<SessionSummary>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub history: Vec<Message>,
}

impl ConversationContext {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_facts(mut self, facts: Vec<SessionSummary>) -> Self {
        self.facts = facts;
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }
}

/// Token breakdown of a [`CognitiveContext`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCount {
    pub system: usize,
    pub facts: usize,
    pub summary: usize,
    pub chat: usize,
    /// Always `system + facts + summary + chat`.
    pub total: usize,
}

impl TokenCount {
    pub fn new(system: usize, facts: usize, summary: usize, chat: usize) -> Self {
        Self {
            system,
            facts,
            summary,
            chat,
            total: system + facts + summary + chat,
        }
    }
}

/// Transient, per-turn view of the conversation. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveContext {
    pub system_prompt: String,
    pub facts: Vec<String>,
    pub long_term_summary: String,
    /// A suffix of the full history.
    pub active_messages: Vec<Message>,
    pub token_count: TokenCount,
}
