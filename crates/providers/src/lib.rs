//! LLM vendor implementations and the model catalog for MindRelay.
//!
//! All vendors implement the `mindrelay_core::Provider` trait.
//! `build_from_config` wires up a client for every credentialed vendor.

pub mod catalog;
pub mod gemini;
mod http;
pub mod openai_compat;
pub mod registry;
pub mod resolve;
pub mod sse;

pub use catalog::{DEFAULT_MARKERS, Markers, ModelCatalog, classify};
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use registry::{VendorRegistry, build_from_config};
pub use resolve::ModelResolver;
