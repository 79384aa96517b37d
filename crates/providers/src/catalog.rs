//! Model catalog - discovers the models an aggregator exposes and sorts
//! them into quality/cost tiers.
//!
//! The catalog is shared process-wide behind an `Arc`. Readers take a cheap
//! snapshot (`Arc<Vec<_>>`); a refresh builds a fresh vector and swaps it in,
//! so a reader never observes a half-populated list.

use mindrelay_core::error::CatalogError;
use mindrelay_core::model::{ModelMetadata, ModelTier, Pricing};
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::http::build_client;

/// Substring tables used by [`classify`].
#[derive(Debug, Clone, Copy)]
pub struct Markers<'a> {
    pub free: &'a [&'a str],
    pub reasoning: &'a [&'a str],
}

pub const DEFAULT_MARKERS: Markers<'static> = Markers {
    free: &[":free"],
    reasoning: &["r1", "o1", "reasoning", "thinking"],
};

/// Classify a model id. Returns `(is_free, is_reasoning, tier)`.
///
/// Case-sensitive substring matching. Anything reasoning-flagged lands in
/// `SReasoning` regardless of cost; only paid non-reasoning models are
/// `BEconomy`.
pub fn classify(id: &str, markers: &Markers<'_>) -> (bool, bool, ModelTier) {
    let is_free = markers.free.iter().any(|m| id.contains(m));
    let is_reasoning = markers.reasoning.iter().any(|m| id.contains(m));

    let tier = match (is_reasoning, is_free) {
        (true, _) => ModelTier::SReasoning,
        (false, true) => ModelTier::AStandard,
        (false, false) => ModelTier::BEconomy,
    };

    (is_free, is_reasoning, tier)
}

/// Build catalog metadata for a raw id.
pub fn metadata_for(
    id: &str,
    display_name: &str,
    context_length: u64,
    pricing: Pricing,
) -> ModelMetadata {
    let (is_free, is_reasoning, tier) = classify(id, &DEFAULT_MARKERS);
    ModelMetadata {
        id: id.to_string(),
        display_name: if display_name.is_empty() {
            id.to_string()
        } else {
            display_name.to_string()
        },
        vendor_id: id.split('/').next().unwrap_or(id).to_string(),
        context_length,
        pricing,
        tier,
        is_free,
        is_reasoning,
    }
}

pub struct ModelCatalog {
    models_url: String,
    client: reqwest::Client,
    snapshot: RwLock<Arc<Vec<ModelMetadata>>>,
}

impl ModelCatalog {
    /// A catalog fed from `{base_url}/models`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            models_url: format!("{}/models", base_url.trim_end_matches('/')),
            client: build_client(),
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Catalog backed by the OpenRouter listing.
    pub fn openrouter() -> Self {
        Self::new("https://openrouter.ai/api/v1")
    }

    /// Seed the catalog without a network round trip.
    pub fn with_models(self, models: Vec<ModelMetadata>) -> Self {
        self.swap(models);
        self
    }

    /// Re-fetch the listing. On any failure the previous snapshot stays.
    pub async fn refresh(&self, api_key: &str) -> Result<Arc<Vec<ModelMetadata>>, CatalogError> {
        match self.fetch(api_key).await {
            Ok(models) => {
                info!(count = models.len(), "Model catalog refreshed");
                Ok(self.swap(models))
            }
            Err(e) => {
                warn!(error = %e, "Model catalog refresh failed; keeping previous snapshot");
                Err(e)
            }
        }
    }

    async fn fetch(&self, api_key: &str) -> Result<Vec<ModelMetadata>, CatalogError> {
        debug!(url = %self.models_url, "Fetching model listing");

        let response = self
            .client
            .get(&self.models_url)
            .header("Authorization", format!("Bearer {api_key}"))
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status_code: status.as_u16(),
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        parse_listing(body)
    }

    fn swap(&self, models: Vec<ModelMetadata>) -> Arc<Vec<ModelMetadata>> {
        let fresh = Arc::new(models);
        let mut guard = self.snapshot.write().unwrap_or_else(|p| p.into_inner());
        *guard = Arc::clone(&fresh);
        fresh
    }

    /// The current model list.
    pub fn snapshot(&self) -> Arc<Vec<ModelMetadata>> {
        let guard = self.snapshot.read().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&guard)
    }

    /// Models in `tier`, in catalog order.
    pub fn by_tier(&self, tier: ModelTier) -> Vec<ModelMetadata> {
        self.snapshot()
            .iter()
            .filter(|m| m.tier == tier)
            .cloned()
            .collect()
    }

    /// Best model of a tier: reasoning first, then the largest context
    /// window. Ties keep catalog order.
    pub fn best_model(&self, tier: ModelTier) -> Option<ModelMetadata> {
        let mut candidates = self.by_tier(tier);
        // sort_by is stable
        candidates.sort_by(|a, b| {
            b.is_reasoning
                .cmp(&a.is_reasoning)
                .then(b.context_length.cmp(&a.context_length))
        });
        candidates.into_iter().next()
    }

    pub fn find(&self, id: &str) -> Option<ModelMetadata> {
        self.snapshot().iter().find(|m| m.id == id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().iter().any(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

impl std::fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("models_url", &self.models_url)
            .field("len", &self.len())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct RawModel {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    context_length: Option<u64>,
    #[serde(default)]
    pricing: Option<RawPricing>,
}

#[derive(Debug, Deserialize)]
struct RawPricing {
    #[serde(default)]
    prompt: serde_json::Value,
    #[serde(default)]
    completion: serde_json::Value,
}

// Prices arrive as strings from OpenRouter but as numbers from some mirrors.
fn price_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Accept either a bare array or the `{ "data": [...] }` wrapper.
fn parse_listing(body: serde_json::Value) -> Result<Vec<ModelMetadata>, CatalogError> {
    let entries = match body {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(items)) => items,
            _ => return Err(CatalogError::Parse("missing `data` array".into())),
        },
        _ => return Err(CatalogError::Parse("unexpected listing shape".into())),
    };

    let raw: Vec<RawModel> = entries
        .into_iter()
        .map(serde_json::from_value)
        .collect::<Result<_, _>>()
        .map_err(|e| CatalogError::Parse(e.to_string()))?;

    Ok(raw
        .into_iter()
        .map(|m| {
            let pricing = m
                .pricing
                .map(|p| Pricing {
                    prompt: price_text(&p.prompt),
                    completion: price_text(&p.completion),
                })
                .unwrap_or_default();
            metadata_for(&m.id, &m.name, m.context_length.unwrap_or(0), pricing)
        })
        .collect())
}
