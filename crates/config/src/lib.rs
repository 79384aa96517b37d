//! Configuration loading, validation, and management for MindRelay.
//!
//! Loads configuration from `~/.mindrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use mindrelay_core::state::Vendor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mindrelay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Override for the initial model (otherwise the vendor default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<String>,

    /// Short-circuit every call to the placeholder backend (no network I/O)
    #[serde(default)]
    pub mock_mode: bool,

    /// Per-vendor credentials and endpoints
    #[serde(default)]
    pub vendors: VendorsConfig,

    /// Memory manager budgets
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Fallback ladder behavior
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// Persona and request identification
    #[serde(default)]
    pub persona: PersonaConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorsConfig {
    #[serde(default)]
    pub openrouter: VendorConfig,

    #[serde(default)]
    pub xai: VendorConfig,

    #[serde(default)]
    pub google: VendorConfig,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl VendorConfig {
    /// A credential counts only when it is non-blank.
    pub fn has_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

impl std::fmt::Debug for VendorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Get the default base URL for a vendor.
pub fn default_base_url(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::OpenRouter => "https://openrouter.ai/api/v1",
        Vendor::Xai => "https://api.x.ai/v1",
        Vendor::Google => "https://generativelanguage.googleapis.com/v1beta",
        Vendor::Mock => "",
    }
}

/// Get the default chat model for a vendor.
pub fn default_vendor_model(vendor: Vendor) -> &'static str {
    match vendor {
        Vendor::OpenRouter => "deepseek/deepseek-chat",
        Vendor::Xai => "grok-3",
        Vendor::Google => "gemini-1.5-flash",
        Vendor::Mock => "mock",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Number of most recent messages kept verbatim (15 turns)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Framing cost added to every message
    #[serde(default = "default_message_overhead")]
    pub message_overhead: usize,

    /// Fraction of the token limit that triggers consolidation
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: f64,

    /// Token limit used when the caller does not supply one
    #[serde(default = "default_max_total_tokens")]
    pub max_total_tokens: usize,
}

fn default_window_size() -> usize {
    30
}
fn default_message_overhead() -> usize {
    4
}
fn default_compression_threshold() -> f64 {
    0.8
}
fn default_max_total_tokens() -> usize {
    128_000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            message_overhead: default_message_overhead(),
            compression_threshold: default_compression_threshold(),
            max_total_tokens: default_max_total_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Allow the ladder to switch models and vendors (retries still happen when off)
    #[serde(default = "default_true")]
    pub auto_scaling: bool,

    /// Upper bound for one network attempt, including stream draining
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Aggregator id of the fast alternate-vendor model tried at the third failure
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    /// Preferred xAI models, most preferred first
    #[serde(default = "default_xai_priority")]
    pub xai_model_priority: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_attempt_timeout() -> u64 {
    120
}
fn default_fast_model() -> String {
    "x-ai/grok-4-fast".into()
}
fn default_xai_priority() -> Vec<String> {
    vec![
        "grok-3".into(),
        "grok-2-latest".into(),
        "grok-2".into(),
        "grok-beta".into(),
    ]
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            auto_scaling: true,
            attempt_timeout_secs: default_attempt_timeout(),
            fast_model: default_fast_model(),
            xai_model_priority: default_xai_priority(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Base system prompt placed above the memory context
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Sent to the aggregator as `X-Title`
    #[serde(default = "default_app_title")]
    pub app_title: String,

    /// Sent to the aggregator as `HTTP-Referer`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_url: Option<String>,
}

fn default_system_prompt() -> String {
    "You are a warm, patient listener. Create a calm, non-judgmental space, \
     validate feelings, and ask gentle open questions. Avoid clinical jargon."
        .into()
}
fn default_app_title() -> String {
    "MindRelay".into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            app_title: default_app_title(),
            app_url: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mindrelay/config.toml).
    ///
    /// Environment variables override the file:
    /// - `OPENROUTER_API_KEY`
    /// - `XAI_API_KEY` (or `GROK_API_KEY`)
    /// - `GOOGLE_API_KEY` (or `GEMINI_API_KEY`)
    /// - `MINDRELAY_MODEL`, `MINDRELAY_MOCK`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Keys already present in the file win for credentials; model and mock
    /// overrides always apply.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| keys.iter().find_map(|k| lookup(*k)).filter(|v| !v.is_empty());

        if !self.vendors.openrouter.has_key() {
            self.vendors.openrouter.api_key = first(&["OPENROUTER_API_KEY"]);
        }
        if !self.vendors.xai.has_key() {
            self.vendors.xai.api_key = first(&["XAI_API_KEY", "GROK_API_KEY"]);
        }
        if !self.vendors.google.has_key() {
            self.vendors.google.api_key = first(&["GOOGLE_API_KEY", "GEMINI_API_KEY"]);
        }

        if let Some(model) = first(&["MINDRELAY_MODEL"]) {
            self.preferred_model = Some(model);
        }

        if let Some(mock) = first(&["MINDRELAY_MOCK"]) {
            self.mock_mode = matches!(mock.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mindrelay")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.memory.compression_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "memory.compression_threshold must be in (0.0, 1.0]".into(),
            ));
        }

        if self.memory.window_size == 0 {
            return Err(ConfigError::ValidationError(
                "memory.window_size must be at least 1".into(),
            ));
        }

        if self.memory.max_total_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_total_tokens must be > 0".into(),
            ));
        }

        if self.fallback.attempt_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "fallback.attempt_timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// The vendor section for a networked vendor.
    pub fn vendor(&self, vendor: Vendor) -> Option<&VendorConfig> {
        match vendor {
            Vendor::OpenRouter => Some(&self.vendors.openrouter),
            Vendor::Xai => Some(&self.vendors.xai),
            Vendor::Google => Some(&self.vendors.google),
            Vendor::Mock => None,
        }
    }

    /// Base URL for a vendor (config override or well-known default).
    pub fn base_url(&self, vendor: Vendor) -> String {
        self.vendor(vendor)
            .and_then(|v| v.api_url.clone())
            .unwrap_or_else(|| default_base_url(vendor).to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// Chat model used when the ladder routes a turn to this vendor.
    pub fn vendor_model(&self, vendor: Vendor) -> String {
        self.vendor(vendor)
            .and_then(|v| v.default_model.clone())
            .unwrap_or_else(|| default_vendor_model(vendor).to_string())
    }

    /// The credential for a vendor, if one is configured.
    pub fn credential(&self, vendor: Vendor) -> Option<&str> {
        self.vendor(vendor)
            .filter(|v| v.has_key())
            .and_then(|v| v.api_key.as_deref())
    }

    /// Networked vendors with a credential, in fallback priority order.
    pub fn credentialed_vendors(&self) -> Vec<Vendor> {
        Vendor::NETWORKED
            .into_iter()
            .filter(|v| self.credential(*v).is_some())
            .collect()
    }

    /// Check if any vendor credential is available.
    pub fn has_any_credential(&self) -> bool {
        !self.credentialed_vendors().is_empty()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preferred_model: None,
            mock_mode: false,
            vendors: VendorsConfig::default(),
            memory: MemoryConfig::default(),
            fallback: FallbackConfig::default(),
            persona: PersonaConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for mindrelay_core::Error {
    fn from(err: ConfigError) -> Self {
        mindrelay_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.window_size, 30);
        assert_eq!(config.memory.message_overhead, 4);
        assert!(config.fallback.auto_scaling);
        assert!(!config.has_any_credential());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.vendor_model(Vendor::Xai), "grok-3");
        assert_eq!(parsed.memory.max_total_tokens, 128_000);
    }

    #[test]
    fn invalid_threshold_rejected() {
        let mut config = AppConfig::default();
        config.memory.compression_threshold = 1.5;
        assert!(config.validate().is_err());
        config.memory.compression_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_window_rejected() {
        let mut config = AppConfig::default();
        config.memory.window_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(!config.mock_mode);
        assert!(config.preferred_model.is_none());
    }

    #[test]
    fn load_from_file_with_partial_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
preferred_model = "deepseek/deepseek-r1"

[vendors.xai]
api_key = "xai-test"
api_url = "http://localhost:9999/v1"
default_model = "grok-2"

[memory]
window_size = 10
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.preferred_model.as_deref(), Some("deepseek/deepseek-r1"));
        assert_eq!(config.credential(Vendor::Xai), Some("xai-test"));
        assert_eq!(config.memory.window_size, 10);
        assert_eq!(config.memory.message_overhead, 4);
        assert_eq!(config.vendor_model(Vendor::Xai), "grok-2");
        assert_eq!(config.base_url(Vendor::Xai), "http://localhost:9999/v1");
        assert!(config.base_url(Vendor::OpenRouter).contains("openrouter.ai"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "mock_mode = \"not a bool").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_supplies_missing_credentials() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("OPENROUTER_API_KEY", "sk-or-test"),
            ("GROK_API_KEY", "xai-test"),
            ("MINDRELAY_MOCK", "true"),
        ]));
        assert_eq!(config.credential(Vendor::OpenRouter), Some("sk-or-test"));
        assert_eq!(config.credential(Vendor::Xai), Some("xai-test"));
        assert_eq!(config.credential(Vendor::Google), None);
        assert!(config.mock_mode);
        assert_eq!(
            config.credentialed_vendors(),
            vec![Vendor::OpenRouter, Vendor::Xai]
        );
    }

    #[test]
    fn file_credentials_win_over_env() {
        let mut config = AppConfig::default();
        config.vendors.google.api_key = Some("from-file".into());
        config.apply_env(env(&[("GOOGLE_API_KEY", "from-env")]));
        assert_eq!(config.credential(Vendor::Google), Some("from-file"));
    }

    #[test]
    fn partial_vendor_section_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
[vendors.google]
api_key = "g-key"
api_url = "http://localhost:1234/v1beta/"
"#,
        )
        .unwrap();
        assert_eq!(config.credential(Vendor::Google), Some("g-key"));
        assert_eq!(config.base_url(Vendor::Google), "http://localhost:1234/v1beta");
        assert_eq!(config.vendor_model(Vendor::Google), "gemini-1.5-flash");
    }

    #[test]
    fn blank_key_is_not_a_credential() {
        let mut config = AppConfig::default();
        config.vendors.openrouter.api_key = Some("   ".into());
        assert!(!config.has_any_credential());
        assert_eq!(config.credential(Vendor::Mock), None);
    }

    #[test]
    fn debug_output_redacts_keys() {
        let mut config = AppConfig::default();
        config.vendors.openrouter.api_key = Some("sk-or-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-or-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("x-ai/grok-4-fast"));
        assert!(toml_str.contains("window_size = 30"));
    }
}
