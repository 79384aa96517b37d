//! Resolve which xAI model to call.
//!
//! xAI renames and retires models often, so the concrete id is picked from
//! the live listing the first time it is needed and then reused.

use std::time::Duration;

use mindrelay_core::{Provider, ProviderError};
use tokio::sync::OnceCell;
use tracing::{info, warn};

const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ModelResolver {
    priority: Vec<String>,
    default_model: String,
    list_timeout: Duration,
    resolved: OnceCell<String>,
}

impl ModelResolver {
    pub fn new(priority: Vec<String>, default_model: impl Into<String>) -> Self {
        Self {
            priority,
            default_model: default_model.into(),
            list_timeout: DEFAULT_LIST_TIMEOUT,
            resolved: OnceCell::new(),
        }
    }

    /// Bound how long a single listing request may take.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.list_timeout = limit;
        self
    }

    /// Pick a model from `provider`'s listing.
    ///
    /// First match in the priority list wins, then the first listed model.
    /// A failed, empty or timed-out listing yields the default without
    /// caching it, so a later call may still resolve.
    pub async fn resolve(&self, provider: &dyn Provider) -> String {
        let resolved = self
            .resolved
            .get_or_try_init(|| async {
                let models = tokio::time::timeout(self.list_timeout, provider.list_models())
                    .await
                    .map_err(|_| {
                        ProviderError::Timeout(format!(
                            "model listing took longer than {}s",
                            self.list_timeout.as_secs()
                        ))
                    })??;
                match pick(&self.priority, &models) {
                    Some(model) => {
                        info!(provider = provider.name(), model = %model, "Resolved model");
                        Ok(model)
                    }
                    None => Err(ProviderError::EmptyResponse),
                }
            })
            .await;

        match resolved {
            Ok(model) => model.clone(),
            Err(e) => {
                warn!(provider = provider.name(), error = %e, "Model listing unavailable, using default");
                self.default_model.clone()
            }
        }
    }

    /// The cached choice, if resolution already succeeded.
    pub fn cached(&self) -> Option<&str> {
        self.resolved.get().map(String::as_str)
    }
}

fn pick(priority: &[String], available: &[String]) -> Option<String> {
    priority
        .iter()
        .find(|p| available.contains(p))
        .or_else(|| available.first())
        .cloned()
}
