//! # MindRelay Core
//!
//! Domain types, traits, and error definitions for the MindRelay chat
//! orchestration engine. This crate has **zero framework dependencies**: it
//! defines the domain model that the catalog, vendors, memory manager and
//! orchestrator all implement against.
//!
//! ## Design Philosophy
//!
//! Every LLM backend is reached through the [`Provider`] trait defined here.
//! Implementations live in `mindrelay-providers`. This enables:
//! - Swapping vendors at runtime when the fallback ladder degrades
//! - Easy testing with scripted/failing provider stubs
//! - Clean dependency graph (all crates depend inward on core)

pub mod context;
pub mod error;
pub mod message;
pub mod model;
pub mod provider;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use context::{CognitiveContext, ConversationContext, SessionSummary, TokenCount};
pub use error::{CatalogError, Error, ProviderError, Result};
pub use message::{Message, Role};
pub use model::{ModelMetadata, ModelTier, Pricing};
pub use provider::{ChatRequest, ChatResponse, ChunkReceiver, Provider, StreamChunk, Usage};
pub use state::{OrchestratorState, Vendor};
