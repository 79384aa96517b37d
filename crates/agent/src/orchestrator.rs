//! Request orchestrator - runs one chat turn against the active vendor and
//! walks the fallback ladder on failure.
//!
//! Turns are serialized by an async lock, so two concurrent `send_message`
//! calls on the same session never race on the failure counter. The state
//! itself lives behind a plain mutex that is never held across an `.await`.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mindrelay_config::AppConfig;
use mindrelay_core::error::{Error, ProviderError, Result};
use mindrelay_core::message::{Message, last_user_content};
use mindrelay_core::model::ModelTier;
use mindrelay_core::provider::{ChatRequest, Provider};
use mindrelay_core::state::{OrchestratorState, Vendor};
use mindrelay_providers::{ModelCatalog, ModelResolver, VendorRegistry, build_from_config};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ladder::{Ladder, MAX_ATTEMPTS, ModelChoice, Next, Outcome, transition};
use crate::placeholder;
use crate::stream_event::StreamEvent;

/// Receives the turn's stream events in order. Each delta is sent once; a
/// [`StreamEvent::Restart`] marks text from a failed attempt as void.
pub type ChunkSink = mpsc::UnboundedSender<StreamEvent>;

pub struct Orchestrator {
    session_id: Uuid,
    config: AppConfig,
    catalog: Arc<ModelCatalog>,
    registry: VendorRegistry,
    xai_resolver: ModelResolver,
    initial: Mutex<OrchestratorState>,
    state: Mutex<OrchestratorState>,
    turn_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    attempt_timeout: Duration,
}

impl Orchestrator {
    /// Build an orchestrator with a client for every credentialed vendor.
    pub fn new(config: AppConfig, catalog: Arc<ModelCatalog>) -> Result<Self> {
        let registry = build_from_config(&config);
        Self::with_registry(config, catalog, registry)
    }

    /// Build an orchestrator over an explicit set of vendor clients.
    pub fn with_registry(
        config: AppConfig,
        catalog: Arc<ModelCatalog>,
        registry: VendorRegistry,
    ) -> Result<Self> {
        let vendor = if config.mock_mode {
            Vendor::Mock
        } else {
            registry.vendors().first().copied().ok_or_else(|| Error::Config {
                message: "no API key configured for any vendor and mock mode is off; \
                          set OPENROUTER_API_KEY, XAI_API_KEY or GOOGLE_API_KEY"
                    .into(),
            })?
        };

        let model = config
            .preferred_model
            .clone()
            .unwrap_or_else(|| config.vendor_model(vendor));

        let mut initial = OrchestratorState::new(model, vendor);
        initial.auto_scaling_enabled = config.fallback.auto_scaling;

        let attempt_timeout = Duration::from_secs(config.fallback.attempt_timeout_secs);
        let xai_resolver = ModelResolver::new(
            config.fallback.xai_model_priority.clone(),
            config.vendor_model(Vendor::Xai),
        )
        .with_timeout(attempt_timeout);
        let session_id = Uuid::new_v4();

        info!(
            session = %session_id,
            vendor = %initial.active_vendor,
            model = %initial.active_model_id,
            "Orchestrator ready"
        );

        Ok(Self {
            session_id,
            config,
            catalog,
            registry,
            xai_resolver,
            state: Mutex::new(initial.clone()),
            initial: Mutex::new(initial),
            turn_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            attempt_timeout,
        })
    }

    /// Override the per-attempt timeout. Vendor model listings share it.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self.xai_resolver = self.xai_resolver.with_timeout(timeout);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Read-only snapshot for diagnostics.
    pub fn get_state(&self) -> OrchestratorState {
        self.lock_state().clone()
    }

    /// Restore the initial model, vendor and tier.
    pub fn reset(&self) {
        let initial = lock(&self.initial).clone();
        info!(session = %self.session_id, model = %initial.active_model_id, "Orchestrator reset");
        *self.lock_state() = initial;
    }

    /// Switch to `model_id` now and make it the reset target.
    pub fn set_preferred_model(&self, model_id: impl Into<String>) {
        let model_id = model_id.into();
        let tier = self
            .catalog
            .find(&model_id)
            .map(|m| m.tier)
            .unwrap_or(ModelTier::SReasoning);

        for slot in [&self.initial, &self.state] {
            let mut state = lock(slot);
            if state.active_vendor == Vendor::Mock {
                continue;
            }
            state.active_model_id = model_id.clone();
            state.current_tier = tier;
        }
        debug!(session = %self.session_id, model = %model_id, "Preferred model applied");
    }

    /// Cancelling this token aborts the in-flight turn and every later one.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one turn. Transport failures are absorbed by the ladder; the only
    /// errors returned are cancellation and misconfiguration.
    pub async fn send_message(&self, messages: &[Message], sink: Option<&ChunkSink>) -> Result<String> {
        let _turn = self.turn_lock.lock().await;

        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if self.config.mock_mode {
            return Ok(self.emit_placeholder(placeholder::reply_for(last_user(messages)), sink));
        }

        for attempt in 1..=MAX_ATTEMPTS {
            let state = self.get_state();
            debug!(
                session = %self.session_id,
                attempt,
                vendor = %state.active_vendor,
                model = %state.active_model_id,
                "Attempting request"
            );

            let mut forwarded = false;
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                r = self.attempt(&state, messages, sink, &mut forwarded) => r,
            };

            match result {
                Ok(text) => {
                    let mut guard = self.lock_state();
                    let (next, _) = transition(&guard, Outcome::Success, &Ladder::default());
                    *guard = next;
                    return Ok(text);
                }
                Err(e) => {
                    warn!(
                        session = %self.session_id,
                        attempt,
                        vendor = %state.active_vendor,
                        model = %state.active_model_id,
                        error = %e,
                        "Attempt failed"
                    );

                    if forwarded {
                        if let Some(sink) = sink {
                            let _ = sink.send(StreamEvent::Restart);
                        }
                    }

                    let failures = state.consecutive_failures.saturating_add(1);
                    let ladder = tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        ladder = self.ladder(failures) => ladder,
                    };

                    let step = {
                        let mut guard = self.lock_state();
                        let (next, step) = transition(&guard, Outcome::Failure, &ladder);
                        if next.active_model_id != guard.active_model_id
                            || next.active_vendor != guard.active_vendor
                        {
                            info!(
                                session = %self.session_id,
                                failures = next.consecutive_failures,
                                vendor = %next.active_vendor,
                                model = %next.active_model_id,
                                tier = %next.current_tier,
                                "Falling back"
                            );
                        }
                        *guard = next;
                        step
                    };

                    if step == Next::Exhausted {
                        break;
                    }
                }
            }
        }

        warn!(session = %self.session_id, "Fallback ladder exhausted, returning placeholder");
        Ok(self.emit_placeholder(placeholder::exhausted_reply(last_user(messages)), sink))
    }

    /// One network attempt, bounded by the attempt timeout.
    async fn attempt(
        &self,
        state: &OrchestratorState,
        messages: &[Message],
        sink: Option<&ChunkSink>,
        forwarded: &mut bool,
    ) -> std::result::Result<String, ProviderError> {
        let provider = self
            .registry
            .get(state.active_vendor)
            .ok_or_else(|| ProviderError::NotConfigured(state.active_vendor.to_string()))?;

        let request = ChatRequest::new(state.active_model_id.clone(), messages.to_vec());

        match tokio::time::timeout(self.attempt_timeout, call(provider.as_ref(), request, sink, forwarded)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "no complete response within {}s",
                self.attempt_timeout.as_secs()
            ))),
        }
    }

    /// Gather rung targets for the failure count about to be recorded.
    ///
    /// The xAI listing is bounded by the attempt timeout inside the resolver.
    async fn ladder(&self, failures: u32) -> Ladder {
        let mut ladder = Ladder::default();

        if self.registry.contains(Vendor::OpenRouter) {
            ladder.economy = self
                .catalog
                .best_model(ModelTier::BEconomy)
                .map(|m| ModelChoice::new(m.id, m.tier));
            ladder.fast_model = self
                .catalog
                .find(&self.config.fallback.fast_model)
                .map(|m| ModelChoice::new(m.id, m.tier));
        }

        // Only hit the xAI listing once the ladder can actually reach it.
        if failures > 2 && ladder.fast_model.is_none() {
            if let Some(xai) = self.registry.get(Vendor::Xai) {
                ladder.xai_model = Some(self.xai_resolver.resolve(xai.as_ref()).await);
            }
        }

        if self.registry.contains(Vendor::Google) {
            ladder.google_model = Some(self.config.vendor_model(Vendor::Google));
        }

        ladder
    }

    fn emit_placeholder(&self, text: String, sink: Option<&ChunkSink>) -> String {
        if let Some(sink) = sink {
            for chunk in placeholder::chunk_text(&text, placeholder::CHUNK_CHARS) {
                if sink.send(StreamEvent::Delta(chunk)).is_err() {
                    break;
                }
            }
        }
        text
    }

    fn lock_state(&self) -> MutexGuard<'_, OrchestratorState> {
        lock(&self.state)
    }
}

fn lock(m: &Mutex<OrchestratorState>) -> MutexGuard<'_, OrchestratorState> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

fn last_user(messages: &[Message]) -> &str {
    last_user_content(messages).unwrap_or_default()
}

/// Issue the request, streaming when a sink is present. `forwarded` is set
/// once any delta has reached the sink.
async fn call(
    provider: &dyn Provider,
    request: ChatRequest,
    sink: Option<&ChunkSink>,
    forwarded: &mut bool,
) -> std::result::Result<String, ProviderError> {
    let Some(sink) = sink else {
        let response = provider.complete(request).await?;
        if response.content.trim().is_empty() {
            return Err(ProviderError::EmptyResponse);
        }
        return Ok(response.content);
    };

    let mut rx = provider.stream(request.streaming()).await?;
    let mut text = String::new();

    // `rx` is dropped on every exit path, which stops the decoder task.
    while let Some(item) = rx.recv().await {
        let chunk = item?;
        if let Some(delta) = chunk.content.filter(|d| !d.is_empty()) {
            text.push_str(&delta);
            // A closed sink only means nobody is watching.
            let _ = sink.send(StreamEvent::Delta(delta));
            *forwarded = true;
        }
        if chunk.done {
            break;
        }
    }

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyStream);
    }
    Ok(text)
}
