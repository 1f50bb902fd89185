//! LLM Scenarios - one module per delegated sub-task

pub mod plan_extraction;
pub mod relevance;
pub mod sql_generation;
