//! The conversational core of MindRelay.
//!
//! A turn flows through three pieces:
//!
//! 1. **Memory manager** packs the history into a token-budgeted context
//! 2. **Orchestrator** sends it to the active vendor and walks the
//!    fallback ladder (economy model → alternate vendors → placeholder)
//! 3. **Chat agent** ties both together behind `initialize()` / `chat()`
//!
//! The ladder itself is a pure function in [`ladder`], so every rung is
//! testable without a network.

pub mod chat_agent;
pub mod context;
pub mod ladder;
pub mod orchestrator;
pub mod placeholder;
pub mod preferences;
pub mod stream_event;

#[cfg(test)]
mod test_support;

pub use chat_agent::{ChatAgent, ChatOutcome, render_system_prompt};
pub use context::MemoryManager;
pub use ladder::{Ladder, MAX_ATTEMPTS, ModelChoice, Next, Outcome, transition};
pub use orchestrator::{ChunkSink, Orchestrator};
pub use preferences::{FilePreferences, MemoryPreferences, PREFERRED_MODEL_KEY, PreferenceStore};
pub use stream_event::StreamEvent;
