//! The chat agent is the single entry point a host application talks to.
//!
//! One turn:
//! 1. Append the user message to the caller's history
//! 2. Build the token-budgeted context (active window only)
//! 3. Render the system prompt with facts and the long-term summary
//! 4. Hand the request to the orchestrator (which owns retries and fallback)
//! 5. Append the reply and return the grown history

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mindrelay_config::AppConfig;
use mindrelay_core::context::{CognitiveContext, ConversationContext, TokenCount};
use mindrelay_core::error::{Error, Result};
use mindrelay_core::message::Message;
use mindrelay_core::state::{OrchestratorState, Vendor};
use mindrelay_providers::ModelCatalog;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::MemoryManager;
use crate::orchestrator::{ChunkSink, Orchestrator};
use crate::preferences::{PREFERRED_MODEL_KEY, PreferenceStore};

const INSTRUCTION: &str = "Use the conversation history below to stay consistent with what was \
already said, and avoid repeating questions you asked recently.";

/// Result of one [`ChatAgent::chat`] call.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub response_text: String,
    /// Caller's history plus this turn's user and assistant messages.
    pub updated_history: Vec<Message>,
    /// The context crossed the consolidation threshold; the caller should
    /// summarize `MemoryManager::messages_for_consolidation` soon.
    pub needs_consolidation: bool,
    pub token_count: TokenCount,
}

pub struct ChatAgent {
    config: AppConfig,
    catalog: Arc<ModelCatalog>,
    orchestrator: Orchestrator,
    memory: MemoryManager,
    preferences: Option<Arc<dyn PreferenceStore>>,
    initialized: AtomicBool,
}

impl ChatAgent {
    pub fn new(config: AppConfig, catalog: Arc<ModelCatalog>) -> Result<Self> {
        let orchestrator = Orchestrator::new(config.clone(), Arc::clone(&catalog))?;
        Ok(Self::with_orchestrator(config, catalog, orchestrator))
    }

    /// Assemble an agent around an existing orchestrator.
    pub fn with_orchestrator(
        config: AppConfig,
        catalog: Arc<ModelCatalog>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            memory: MemoryManager::new(config.memory.clone()),
            config,
            catalog,
            orchestrator,
            preferences: None,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_preferences(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(store);
        self
    }

    /// Refresh the catalog and restore persisted preferences.
    ///
    /// Neither step can fail the agent: a refresh failure keeps whatever
    /// the catalog already held and is only logged.
    pub async fn initialize(&self) -> Result<()> {
        if !self.config.mock_mode {
            if let Some(key) = self.config.credential(Vendor::OpenRouter) {
                match self.catalog.refresh(key).await {
                    Ok(models) => debug!(count = models.len(), "Catalog ready"),
                    Err(e) => warn!(error = %e, "Catalog refresh failed, continuing"),
                }
            }
        }

        if let Some(store) = &self.preferences {
            match store.get_item(PREFERRED_MODEL_KEY).await {
                Ok(Some(model)) if !model.trim().is_empty() => {
                    info!(model = %model, "Restoring preferred model");
                    self.orchestrator.set_preferred_model(model);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Could not read preferences"),
            }
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Run one conversational turn.
    pub async fn chat(
        &self,
        user_text: &str,
        context: ConversationContext,
        sink: Option<&ChunkSink>,
    ) -> Result<ChatOutcome> {
        if !self.is_initialized() {
            return Err(Error::NotInitialized);
        }

        let ConversationContext {
            system_prompt,
            facts,
            summary,
            mut history,
        } = context;
        history.push(Message::user(user_text));

        let persona = if system_prompt.trim().is_empty() {
            self.config.persona.system_prompt.as_str()
        } else {
            system_prompt.as_str()
        };

        let cognitive = self.memory.build_context(persona, &facts, &summary, &history);
        let needs_consolidation = self.memory.needs_consolidation(&cognitive, None);
        if needs_consolidation {
            info!(
                total = cognitive.token_count.total,
                candidates = self.memory.messages_for_consolidation(&history).len(),
                "Context over consolidation threshold"
            );
        }

        let token_count = cognitive.token_count;
        let request = request_messages(cognitive);

        let response_text = self.orchestrator.send_message(&request, sink).await?;
        history.push(Message::assistant(response_text.clone()));

        Ok(ChatOutcome {
            response_text,
            updated_history: history,
            needs_consolidation,
            token_count,
        })
    }

    /// Switch models now and persist the choice when a store is attached.
    pub async fn set_preferred_model(&self, model_id: &str) -> Result<()> {
        self.orchestrator.set_preferred_model(model_id);
        if let Some(store) = &self.preferences {
            store.set_item(PREFERRED_MODEL_KEY, model_id).await?;
        }
        Ok(())
    }

    pub fn orchestrator_state(&self) -> OrchestratorState {
        self.orchestrator.get_state()
    }

    /// Climb back to the initial model and vendor.
    pub fn reset(&self) {
        self.orchestrator.reset();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.orchestrator.cancellation_token()
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    pub fn catalog(&self) -> &Arc<ModelCatalog> {
        &self.catalog
    }
}

/// System message followed by the active window.
fn request_messages(cognitive: CognitiveContext) -> Vec<Message> {
    let system = render_system_prompt(&cognitive);
    let mut messages = Vec::with_capacity(cognitive.active_messages.len() + 1);
    messages.push(Message::system(system));
    messages.extend(cognitive.active_messages);
    messages
}

/// Persona prompt plus the memory block the model sees.
pub fn render_system_prompt(ctx: &CognitiveContext) -> String {
    let insights = if ctx.facts.is_empty() {
        "None yet.".to_string()
    } else {
        ctx.facts
            .iter()
            .map(|f| format!("- {f}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let summary = if ctx.long_term_summary.trim().is_empty() {
        "New conversation."
    } else {
        ctx.long_term_summary.as_str()
    };

    format!(
        "{}\n\n[MEMORY CONTEXT]\nUSER INSIGHTS:\n{insights}\n\nLONG-TERM SUMMARY:\n{summary}\n\n[INSTRUCTION]\n{INSTRUCTION}",
        ctx.system_prompt.trim()
    )
}
