//! LLM Client - HTTP client for OpenAI-compatible APIs
//!
//! Uses reqwest to call LLM APIs. Compatible with:
//! - OpenAI
//! - Azure OpenAI
//! - DeepSeek
//! - Other OpenAI-compatible APIs
//!
//! Structured output is requested through `tools`; replies in either the
//! `tool_calls` or the legacy `function_call` shape are accepted.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::models::*;
use crate::config::LlmConfig;

/// LLM HTTP Client
pub struct LLMClient {
    http_client: Client,
}

impl LLMClient {
    pub fn new(timeout_secs: u64) -> Result<Self, LLMError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LLMError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    /// Call chat completion API
    pub async fn chat_completion(
        &self,
        provider: &LlmConfig,
        request: &ChatRequest,
    ) -> Result<ChatReply, LLMError> {
        let chat_request = ChatCompletionRequest::from_request(provider, request);
        let url = format!("{}/chat/completions", provider.api_base.trim_end_matches('/'));

        tracing::debug!(
            "Calling LLM API: {} with model {} for {}",
            url,
            provider.model,
            request.scenario.as_str()
        );

        let mut builder = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(Duration::from_secs(provider.timeout_secs));
        if let Some(api_key) = &provider.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.json(&chat_request).send().await.map_err(|e| {
            if e.is_timeout() {
                LLMError::Timeout(provider.timeout_secs)
            } else if e.is_connect() {
                LLMError::ApiError(format!("Connection failed: {}", e))
            } else {
                LLMError::ApiError(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LLMError::RateLimited(retry_after));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(LLMError::ApiError("Invalid API key".to_string()));
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LLMError::ApiError(format!("API error {}: {}", status, error_text)));
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        if let Some(usage) = &chat_response.usage {
            tracing::debug!(
                "LLM usage: {} prompt tokens, {} completion tokens",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        chat_response.into_reply()
    }
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<serde_json::Value>,
}

impl ChatCompletionRequest {
    pub(crate) fn from_request(provider: &LlmConfig, request: &ChatRequest) -> Self {
        let tool_choice = request.function.as_ref().map(|f| {
            serde_json::json!({ "type": "function", "function": { "name": f.name } })
        });
        let tools = request
            .function
            .as_ref()
            .map(|f| vec![ToolSpec { r#type: "function".to_string(), function: f.clone() }]);
        let response_format = request
            .json_response
            .then(|| ResponseFormat { r#type: "json_object".to_string() });

        Self {
            model: provider.model.clone(),
            messages: request.messages.clone(),
            max_tokens: Some(provider.max_tokens),
            temperature: Some(request.temperature.unwrap_or(provider.temperature)),
            response_format,
            tools,
            tool_choice,
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct ToolSpec {
    r#type: String,
    function: FunctionSpec,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

impl ChatCompletionResponse {
    /// First choice as a provider-independent reply
    pub(crate) fn into_reply(self) -> Result<ChatReply, LLMError> {
        let message = self
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LLMError::ParseError("Empty response from LLM".to_string()))?;

        let function_call = message
            .tool_calls
            .into_iter()
            .flatten()
            .find(|call| call.r#type.as_deref().unwrap_or("function") == "function")
            .map(|call| call.function)
            .or(message.function_call);

        let content = message.content.unwrap_or_default();
        if content.is_empty() && function_call.is_none() {
            return Err(LLMError::ParseError("Empty response from LLM".to_string()));
        }

        Ok(ChatReply { content, function_call })
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    r#type: Option<String>,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: i32,
    completion_tokens: i32,
}
