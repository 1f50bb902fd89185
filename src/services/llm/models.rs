//! LLM Data Models
//!
//! Chat messages, structured-output declarations and replies exchanged with
//! the text-generation collaborator.

use serde::{Deserialize, Serialize};

// ============================================================================
// LLM Scenario Types
// ============================================================================

/// Sub-task delegated to the text-generation collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LLMScenario {
    /// Question -> QueryPlan via function calling
    PlanExtraction,
    /// QueryPlan -> free-form SQL
    SqlGeneration,
    /// Score how well a SQL statement answers the question
    RelevanceJudgment,
}

impl LLMScenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanExtraction => "plan_extraction",
            Self::SqlGeneration => "sql_generation",
            Self::RelevanceJudgment => "relevance_judgment",
        }
    }
}

// ============================================================================
// Chat Request / Reply
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// Declared function for structured output; `parameters` is a JSON schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Provider-independent chat request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub scenario: LLMScenario,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    /// When set, the collaborator is asked to answer by calling this function
    pub function: Option<FunctionSpec>,
    /// Ask for a bare JSON object in the content
    pub json_response: bool,
}

impl ChatRequest {
    pub fn new(scenario: LLMScenario, messages: Vec<ChatMessage>) -> Self {
        Self { scenario, messages, temperature: None, function: None, json_response: false }
    }

    pub fn with_function(mut self, function: FunctionSpec) -> Self {
        self.function = Some(function);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Structured payload returned through function calling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON text of the arguments object
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), function_call: None }
    }

    pub fn call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            function_call: Some(FunctionCall { name: name.into(), arguments: arguments.into() }),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("LLM response parsing error: {0}")]
    ParseError(String),

    #[error("LLM timeout after {0}s")]
    Timeout(u64),

    #[error("LLM rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("LLM service disabled")]
    Disabled,
}

impl LLMError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::RateLimited(_) | Self::ApiError(_))
    }
}
