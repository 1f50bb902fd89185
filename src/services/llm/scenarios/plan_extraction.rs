//! Plan Extraction Scenario - question to QueryPlan via function calling
//!
//! The declared function schema is generated once from the typed enums, and
//! replies are parsed against a strict payload type. Anything that does not
//! match exactly is an extraction failure.

use once_cell::sync::Lazy;
use serde::Deserialize;
use serde_json::json;

use crate::models::{Aggregation, ChartType, QUERY_ACTION, QueryFilters, QueryPlan};
use crate::services::llm::{ChatMessage, ChatReply, ChatRequest, FunctionSpec, LLMScenario};
use crate::utils::StringExt;
use crate::utils::error::ValidationError;

const PROMPT: &str = include_str!("plan_extraction_prompt.md");

pub const FUNCTION_NAME: &str = "generate_query_plan";

static FUNCTION_SPEC: Lazy<FunctionSpec> = Lazy::new(|| {
    let aggregations: Vec<&str> = Aggregation::ALL.iter().map(|a| a.as_str()).collect();
    let chart_types: Vec<&str> = ChartType::ALL.iter().map(|c| c.as_str()).collect();
    let string_list = |description: &str| {
        json!({ "type": "array", "items": { "type": "string" }, "description": description })
    };

    FunctionSpec {
        name: FUNCTION_NAME.to_string(),
        description: "Generate a structured query plan from the user's question".to_string(),
        parameters: json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "action": {
                    "type": "string",
                    "enum": [QUERY_ACTION],
                    "description": "Operation type, only query is supported"
                },
                "metrics": string_list("Metrics to query, e.g. avg_rtt, avg_lost"),
                "task_name": {
                    "type": "string",
                    "description": "Probe task filter, omit when not needed"
                },
                "filters": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "src_isp": string_list("Source carriers, e.g. chinatelecom, chinamobile"),
                        "src_province": string_list("Source provinces, e.g. liaoning, beijing"),
                        "target_node": string_list("Target nodes"),
                        "time_range": {
                            "type": "string",
                            "description": "last_30_min, last_1_hour, last_24_hour, between:start:end, or a day-anchored phrase"
                        }
                    },
                    "required": ["time_range"]
                },
                "aggregation": {
                    "type": "string",
                    "enum": aggregations,
                    "description": "Grouping strategy"
                },
                "need_chart": {
                    "type": "boolean",
                    "description": "Whether a chart is needed"
                },
                "chart_type": {
                    "type": "string",
                    "enum": chart_types,
                    "description": "Chart type, only when need_chart is true"
                }
            },
            "required": ["action", "metrics", "filters", "aggregation", "need_chart"]
        }),
    }
});

/// Declared output schema for plan extraction
pub fn function_spec() -> &'static FunctionSpec {
    &FUNCTION_SPEC
}

// ============================================================================
// Request
// ============================================================================

/// Build the extraction request; schema context goes in as a second system message
pub fn build_request(question: &str, schema_context: Option<&str>) -> ChatRequest {
    let mut messages = vec![ChatMessage::system(PROMPT)];
    if let Some(context) = schema_context.filter(|c| !c.trim().is_empty()) {
        messages.push(ChatMessage::system(format!("Dataset context:\n{}", context)));
    }
    messages.push(ChatMessage::user(question));

    ChatRequest::new(LLMScenario::PlanExtraction, messages)
        .with_function(function_spec().clone())
        .with_temperature(0.0)
}

// ============================================================================
// Response
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanPayload {
    action: String,
    metrics: Vec<String>,
    filters: FiltersPayload,
    #[serde(default)]
    task_name: Option<String>,
    aggregation: Aggregation,
    need_chart: bool,
    #[serde(default)]
    chart_type: Option<ChartType>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FiltersPayload {
    time_range: String,
    #[serde(default)]
    src_isp: Option<Vec<String>>,
    #[serde(default)]
    src_province: Option<Vec<String>>,
    #[serde(default)]
    target_node: Option<Vec<String>>,
}

/// Parse a reply into an unvalidated plan. The caller validates it.
pub fn parse_reply(reply: &ChatReply, question: &str) -> Result<QueryPlan, ValidationError> {
    let call = reply.function_call.as_ref().ok_or_else(|| {
        ValidationError::Extraction("reply carries no structured payload".to_string())
    })?;

    if call.name != FUNCTION_NAME {
        return Err(ValidationError::Extraction(format!(
            "expected function '{}', got '{}'",
            FUNCTION_NAME, call.name
        )));
    }

    let payload: PlanPayload = serde_json::from_str(&call.arguments).map_err(|e| {
        ValidationError::Extraction(format!("payload does not match the declared schema: {}", e))
    })?;

    Ok(QueryPlan {
        action: payload.action,
        metrics: payload.metrics,
        filters: QueryFilters {
            time_range: payload.filters.time_range,
            src_isp: payload.filters.src_isp.unwrap_or_default(),
            src_province: payload.filters.src_province.unwrap_or_default(),
            target_node: payload.filters.target_node.unwrap_or_default(),
        },
        task_name: payload.task_name.and_then(|t| t.clean()),
        aggregation: payload.aggregation,
        need_chart: payload.need_chart,
        chart_type: payload.chart_type,
        original_query: question.to_string(),
    })
}
