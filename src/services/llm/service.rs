//! LLM Service Trait and Implementation
//!
//! Defines the generic text-generation interface and its HTTP-backed implementation.

use async_trait::async_trait;

use super::client::LLMClient;
use super::models::*;
use crate::config::LlmConfig;

// ============================================================================
// LLM Service Trait
// ============================================================================

/// Text-generation collaborator - the core abstraction for all LLM operations
///
/// Implementations are shared across requests and must be safe for
/// concurrent independent use.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Check if the collaborator is usable at all
    fn is_available(&self) -> bool {
        true
    }

    /// Send an ordered list of role-tagged messages, optionally with a declared function
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LLMError>;
}

// ============================================================================
// LLM Service Implementation
// ============================================================================

/// OpenAI-compatible text generator configured from `[llm]`
pub struct LLMServiceImpl {
    client: LLMClient,
    provider: LlmConfig,
}

impl LLMServiceImpl {
    pub fn new(provider: LlmConfig) -> Result<Self, LLMError> {
        let client = LLMClient::new(provider.timeout_secs)?;
        Ok(Self { client, provider })
    }

    pub fn model(&self) -> &str {
        &self.provider.model
    }
}

#[async_trait]
impl TextGenerator for LLMServiceImpl {
    fn is_available(&self) -> bool {
        !self.provider.api_base.trim().is_empty()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LLMError> {
        if !self.is_available() {
            return Err(LLMError::Disabled);
        }

        let started = std::time::Instant::now();
        let result = self.client.chat_completion(&self.provider, request).await;

        match &result {
            Ok(reply) => tracing::info!(
                "LLM {} completed in {}ms (structured: {})",
                request.scenario.as_str(),
                started.elapsed().as_millis(),
                reply.function_call.is_some()
            ),
            Err(e) => tracing::warn!(
                "LLM {} failed after {}ms: {} (retryable: {})",
                request.scenario.as_str(),
                started.elapsed().as_millis(),
                e,
                e.is_retryable()
            ),
        }

        result
    }
}
