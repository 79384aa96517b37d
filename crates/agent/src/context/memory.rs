//! Memory manager - packs unbounded conversation state into a
//! token-budgeted [`CognitiveContext`] and signals when compaction is due.
//!
//! It never summarizes anything itself. Deciding *what* to fold into a new
//! fact or summary is left to an external summarizer; this module only
//! says *when* and hands over the candidate messages.

use mindrelay_config::MemoryConfig;
use mindrelay_core::context::{CognitiveContext, SessionSummary, TokenCount};
use mindrelay_core::message::Message;

use crate::context::token::{estimate_messages_tokens, estimate_tokens};

#[derive(Debug, Clone, Default)]
pub struct MemoryManager {
    config: MemoryConfig,
}

impl MemoryManager {
    pub fn new(config: MemoryConfig) -> Self {
        Self { config }
    }

    /// Number of trailing messages kept verbatim.
    pub fn window_size(&self) -> usize {
        self.config.window_size
    }

    /// Render one fact as a single line.
    pub fn render_fact(fact: &SessionSummary) -> String {
        let theme = fact
            .theme
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("General");
        format!(
            "[{} - {}]: {} (Insights: {})",
            fact.date,
            theme,
            fact.summary,
            fact.key_insights.join(", ")
        )
    }

    /// The trailing window of `history` sent to the model.
    pub fn active_window<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        let start = history.len().saturating_sub(self.config.window_size);
        &history[start..]
    }

    /// Build the per-turn view. Only the active window is cloned, so the
    /// cost is bounded by the window size rather than the history length.
    pub fn build_context(
        &self,
        system_prompt: &str,
        facts: &[SessionSummary],
        summary: &str,
        history: &[Message],
    ) -> CognitiveContext {
        let rendered: Vec<String> = facts.iter().map(Self::render_fact).collect();
        let facts_text = rendered.join("\n");

        let active_messages = self.active_window(history).to_vec();
        let overhead = self.config.message_overhead;

        let token_count = TokenCount::new(
            estimate_tokens(system_prompt),
            estimate_tokens(&facts_text),
            estimate_tokens(summary),
            estimate_messages_tokens(&active_messages, overhead),
        );

        CognitiveContext {
            system_prompt: system_prompt.to_string(),
            facts: rendered,
            long_term_summary: summary.to_string(),
            active_messages,
            token_count,
        }
    }

    /// True iff the context exceeds `threshold * limit` (strictly).
    /// `limit` falls back to the configured maximum.
    pub fn needs_consolidation(&self, context: &CognitiveContext, limit: Option<usize>) -> bool {
        let limit = limit.unwrap_or(self.config.max_total_tokens);
        context.token_count.total as f64 > limit as f64 * self.config.compression_threshold
    }

    /// Messages that have fallen out of the active window, oldest first.
    pub fn messages_for_consolidation<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        let end = history.len().saturating_sub(self.config.window_size);
        &history[..end]
    }
}
