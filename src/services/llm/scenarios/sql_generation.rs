//! SQL Generation Scenario - free-form SQL for a validated plan

use crate::models::QueryPlan;
use crate::services::llm::{ChatMessage, ChatReply, ChatRequest, LLMError, LLMScenario};

const PROMPT: &str = include_str!("sql_generation_prompt.md");

/// Everything the collaborator sees when writing SQL
#[derive(Debug, Clone)]
pub struct SqlGenerationInput<'a> {
    pub plan: &'a QueryPlan,
    pub start_ts: i64,
    pub end_ts: i64,
    pub table: &'a str,
    pub schema: &'a str,
}

pub fn build_request(input: &SqlGenerationInput<'_>) -> Result<ChatRequest, LLMError> {
    let plan_json = serde_json::to_string_pretty(input.plan)?;

    let user = format!(
        "## Question\n{}\n\n## Query plan\n{}\n\n## Time range\n{} -> timestamp >= {} AND timestamp <= {}\n\n## Table\n{}\n\n## Schema\n{}\n\nReturn the SQL only:",
        input.plan.original_query,
        plan_json,
        input.plan.filters.time_range,
        input.start_ts,
        input.end_ts,
        input.table,
        input.schema,
    );

    Ok(ChatRequest::new(
        LLMScenario::SqlGeneration,
        vec![ChatMessage::system(PROMPT), ChatMessage::user(user)],
    )
    .with_temperature(0.1))
}

/// Candidate SQL text; fences are stripped later by post-processing
pub fn parse_reply(reply: &ChatReply) -> Result<String, LLMError> {
    let sql = reply.content.trim();
    if sql.is_empty() {
        return Err(LLMError::ParseError("SQL generation returned no text".to_string()));
    }
    Ok(sql.to_string())
}
