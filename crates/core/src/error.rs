//! Error types for the MindRelay domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all MindRelay operations.
///
/// Transport failures never reach callers of `ChatAgent::chat`: the
/// orchestrator recovers them through its fallback ladder. What remains here
/// is configuration trouble, cancellation, and contract violations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Catalog errors ---
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Contract violations ---
    #[error("Agent used before initialize() was called")]
    NotInitialized,

    #[error("Session cancelled")]
    Cancelled,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Stream ended without any content")]
    EmptyStream,

    #[error("Response contained no content")]
    EmptyResponse,

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures while refreshing the model catalog.
///
/// Always recoverable: the catalog keeps its previous snapshot.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Model listing request failed: {0}")]
    Network(String),

    #[error("Model listing returned status {status_code}")]
    Status { status_code: u16 },

    #[error("Model listing could not be parsed: {0}")]
    Parse(String),
}
