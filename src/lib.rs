//! NetProbe Insight Library
//!
//! Turns a free-text question about network probe measurements into a
//! bounded, read-only SQL query, runs it, and scores how far the query and
//! its result can be trusted.

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::{CommandLineArgs, Config};
pub use models::{QualityReport, QueryPlan, ResultSet};
pub use services::llm::{LLMError, LLMServiceImpl, TextGenerator};
pub use services::query_engine::{PipelineOutput, QueryExecutor, QueryPipeline};
pub use utils::{PipelineError, PipelineStage};

#[cfg(test)]
mod tests;
