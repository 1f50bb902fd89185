//! LLM Service Module
//!
//! Text-generation collaborator used by the assisted pipeline paths.
//!
//! # Architecture
//! ```text
//! ┌─────────────────┐
//! │  TextGenerator  │  ← Trait (generic interface)
//! └────────┬────────┘
//!          │
//!    ┌─────┴─────┐
//!    ▼           ▼
//! ┌──────┐  ┌──────────┐
//! │OpenAI│  │  Mocks   │
//! │Client│  │ (tests)  │
//! └──────┘  └──────────┘
//! ```
//!
//! # Supported Scenarios
//! - Plan extraction (function calling)
//! - SQL generation
//! - Relevance judgment

mod client;
mod models;
pub mod scenarios;
mod service;

// Re-exports for external use
pub use models::*;
pub use service::{LLMServiceImpl, TextGenerator};

#[cfg(test)]
mod tests;
