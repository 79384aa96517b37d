//! Vendor registry - maps each configured vendor to its provider client.

use std::collections::HashMap;
use std::sync::Arc;

use mindrelay_config::AppConfig;
use mindrelay_core::provider::Provider;
use mindrelay_core::state::Vendor;
use tracing::debug;

use crate::gemini::GeminiProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes requests to the provider for a vendor.
#[derive(Default, Clone)]
pub struct VendorRegistry {
    providers: HashMap<Vendor, Arc<dyn Provider>>,
}

impl VendorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider for a vendor.
    pub fn register(&mut self, vendor: Vendor, provider: Arc<dyn Provider>) {
        self.providers.insert(vendor, provider);
    }

    pub fn with(mut self, vendor: Vendor, provider: Arc<dyn Provider>) -> Self {
        self.register(vendor, provider);
        self
    }

    pub fn get(&self, vendor: Vendor) -> Option<Arc<dyn Provider>> {
        self.providers.get(&vendor).cloned()
    }

    pub fn contains(&self, vendor: Vendor) -> bool {
        self.providers.contains_key(&vendor)
    }

    /// Registered vendors in fallback priority order.
    pub fn vendors(&self) -> Vec<Vendor> {
        Vendor::NETWORKED
            .into_iter()
            .filter(|v| self.providers.contains_key(v))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for VendorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorRegistry")
            .field("vendors", &self.vendors())
            .finish()
    }
}

/// Build a provider for every vendor that has a credential.
pub fn build_from_config(config: &AppConfig) -> VendorRegistry {
    let mut registry = VendorRegistry::new();

    for vendor in config.credentialed_vendors() {
        let Some(api_key) = config.credential(vendor) else {
            continue;
        };
        let base_url = config.base_url(vendor);

        let provider: Arc<dyn Provider> = match vendor {
            Vendor::OpenRouter => {
                let referer = config
                    .persona
                    .app_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost".to_string());
                Arc::new(
                    OpenAiCompatProvider::new("openrouter", &base_url, api_key)
                        .with_header("HTTP-Referer", referer)
                        .with_header("X-Title", config.persona.app_title.clone()),
                )
            }
            Vendor::Xai => Arc::new(OpenAiCompatProvider::new("xai", &base_url, api_key)),
            Vendor::Google => Arc::new(GeminiProvider::new(api_key).with_base_url(&base_url)),
            Vendor::Mock => continue,
        };

        debug!(vendor = %vendor, base_url = %base_url, "Registered vendor");
        registry.register(vendor, provider);
    }

    registry
}
