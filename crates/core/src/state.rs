//! Orchestrator session state and vendor identities.

use serde::{Deserialize, Serialize};

use crate::model::ModelTier;

/// A backend vendor the orchestrator can route a turn through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// The model aggregator (primary path, also the catalog source)
    OpenRouter,
    /// First alternate vendor, reached through its own endpoint
    Xai,
    /// Second alternate vendor, native Gemini API
    Google,
    /// Network-free placeholder backend
    Mock,
}

impl Vendor {
    /// Vendors with a real backend, in fallback priority order.
    pub const NETWORKED: [Vendor; 3] = [Vendor::OpenRouter, Vendor::Xai, Vendor::Google];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenRouter => "openrouter",
            Vendor::Xai => "xai",
            Vendor::Google => "google",
            Vendor::Mock => "mock",
        }
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable routing state of one conversation session.
///
/// Owned and mutated only by the orchestrator; everyone else receives a
/// cloned snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub active_model_id: String,
    pub current_tier: ModelTier,
    /// Resets to 0 on any successful call, otherwise only grows.
    pub consecutive_failures: u32,
    pub active_vendor: Vendor,
    pub auto_scaling_enabled: bool,
}

impl OrchestratorState {
    pub fn new(active_model_id: impl Into<String>, active_vendor: Vendor) -> Self {
        Self {
            active_model_id: active_model_id.into(),
            current_tier: ModelTier::SReasoning,
            consecutive_failures: 0,
            active_vendor,
            auto_scaling_enabled: true,
        }
    }
}
