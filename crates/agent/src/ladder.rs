//! The fallback ladder as a pure state transition.
//!
//! `transition` never performs I/O. The orchestrator gathers what the ladder
//! may switch to (a [`Ladder`]) and threads one [`OrchestratorState`] through
//! successive calls, so every rung can be tested without a network.
//!
//! Rungs, by consecutive failure count `f` after the failure is recorded:
//!
//! | `f`  | effect                                                        |
//! |------|---------------------------------------------------------------|
//! | ≤ 1  | retry unchanged                                               |
//! | > 1  | best economy model on the aggregator                          |
//! | > 2  | fast alternate-vendor model from the catalog, else xAI native |
//! | > 3  | Google native, when credentialed                              |
//! | ≥ 5  | exhausted                                                     |
//!
//! The highest rung whose target is available wins, so re-applying a rung
//! is idempotent and nothing changes below its threshold.

use mindrelay_core::model::ModelTier;
use mindrelay_core::state::{OrchestratorState, Vendor};

/// Hard cap on attempts within one turn, and the failure count at which the
/// ladder gives up.
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// The turn succeeded.
    Done,
    /// Try again with the returned state.
    Retry,
    /// Stop and synthesize the placeholder reply.
    Exhausted,
}

/// A model the ladder may switch to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    pub id: String,
    pub tier: ModelTier,
}

impl ModelChoice {
    pub fn new(id: impl Into<String>, tier: ModelTier) -> Self {
        Self { id: id.into(), tier }
    }
}

/// Rung targets available right now. `None` means the rung is skipped.
#[derive(Debug, Clone, Default)]
pub struct Ladder {
    /// Best `BEconomy` model in the catalog.
    pub economy: Option<ModelChoice>,
    /// The named fast model, when the catalog holds it.
    pub fast_model: Option<ModelChoice>,
    /// xAI model id, when an xAI credential exists.
    pub xai_model: Option<String>,
    /// Gemini model id, when a Google credential exists.
    pub google_model: Option<String>,
}

pub fn transition(
    state: &OrchestratorState,
    outcome: Outcome,
    ladder: &Ladder,
) -> (OrchestratorState, Next) {
    let mut next = state.clone();

    if outcome == Outcome::Success {
        next.consecutive_failures = 0;
        return (next, Next::Done);
    }

    next.consecutive_failures = state.consecutive_failures.saturating_add(1);
    let failures = next.consecutive_failures;

    if state.auto_scaling_enabled {
        if let Some((vendor, model, tier)) = rung(failures, ladder) {
            next.active_vendor = vendor;
            next.active_model_id = model;
            next.current_tier = next.current_tier.degrade_to(tier);
        }
    }

    let step = if failures < MAX_ATTEMPTS {
        Next::Retry
    } else {
        Next::Exhausted
    };
    (next, step)
}

/// Highest applicable rung for a failure count.
fn rung(failures: u32, ladder: &Ladder) -> Option<(Vendor, String, ModelTier)> {
    if failures > 3 {
        if let Some(model) = &ladder.google_model {
            return Some((Vendor::Google, model.clone(), ModelTier::CEmergency));
        }
    }

    if failures > 2 {
        if let Some(fast) = &ladder.fast_model {
            return Some((Vendor::OpenRouter, fast.id.clone(), fast.tier));
        }
        if let Some(model) = &ladder.xai_model {
            return Some((Vendor::Xai, model.clone(), ModelTier::CEmergency));
        }
    }

    if failures > 1 {
        if let Some(economy) = &ladder.economy {
            return Some((Vendor::OpenRouter, economy.id.clone(), economy.tier));
        }
    }

    None
}
