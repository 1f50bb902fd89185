//! LLM Service Unit Tests
//!
//! Tests for reply parsing, the declared plan schema and the scenario helpers.

use super::client::{ChatCompletionRequest, ChatCompletionResponse};
use super::scenarios::{plan_extraction, relevance, sql_generation};
use super::*;
use crate::config::LlmConfig;
use crate::models::{Aggregation, ChartType, QueryPlan};

fn provider() -> LlmConfig {
    LlmConfig {
        api_base: "http://localhost:8000/v1".to_string(),
        api_key: Some("sk-test".to_string()),
        ..Default::default()
    }
}

fn parse_response(json: &str) -> Result<ChatReply, LLMError> {
    let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
    response.into_reply()
}

// ============================================================================
// Client Tests
// ============================================================================

mod client_tests {
    use super::*;

    #[test]
    fn test_request_declares_tool_when_function_present() {
        let request = plan_extraction::build_request("丢包率", None);
        let body = serde_json::to_value(ChatCompletionRequest::from_request(&provider(), &request))
            .unwrap();

        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], plan_extraction::FUNCTION_NAME);
        assert_eq!(body["tool_choice"]["function"]["name"], plan_extraction::FUNCTION_NAME);
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_request_without_function_omits_tools() {
        let request = relevance::build_request("丢包率", "SELECT 1");
        let body = serde_json::to_value(ChatCompletionRequest::from_request(&provider(), &request))
            .unwrap();

        assert!(body.get("tools").is_none());
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["temperature"], 0.1);
    }

    #[test]
    fn test_reply_from_tool_calls() {
        let reply = parse_response(
            r#"{"choices":[{"message":{"content":null,"tool_calls":[{"id":"call_1","type":"function","function":{"name":"generate_query_plan","arguments":"{}"}}]}}],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#,
        )
        .unwrap();
        let call = reply.function_call.unwrap();
        assert_eq!(call.name, "generate_query_plan");
        assert_eq!(call.arguments, "{}");
        assert!(reply.content.is_empty());
    }

    #[test]
    fn test_reply_from_legacy_function_call() {
        let reply = parse_response(
            r#"{"choices":[{"message":{"content":"","function_call":{"name":"generate_query_plan","arguments":"{\"action\":\"query\"}"}}}]}"#,
        )
        .unwrap();
        assert_eq!(reply.function_call.unwrap().arguments, r#"{"action":"query"}"#);
    }

    #[test]
    fn test_reply_plain_text() {
        let reply =
            parse_response(r#"{"choices":[{"message":{"content":"SELECT 1"}}]}"#).unwrap();
        assert_eq!(reply.content, "SELECT 1");
        assert!(reply.function_call.is_none());
    }

    #[test]
    fn test_empty_reply_is_parse_error() {
        assert!(matches!(parse_response(r#"{"choices":[]}"#), Err(LLMError::ParseError(_))));
        assert!(matches!(
            parse_response(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(LLMError::ParseError(_))
        ));
    }
}

// ============================================================================
// Plan Extraction Tests
// ============================================================================

mod plan_extraction_tests {
    use super::*;

    const VALID_ARGS: &str = r#"{
        "action": "query",
        "metrics": ["avg_lost", "avg_rtt"],
        "filters": {"time_range": "last_24_hour", "src_isp": ["chinatelecom"], "src_province": null},
        "aggregation": "group_by_province_isp",
        "need_chart": true,
        "chart_type": "bar"
    }"#;

    #[test]
    fn test_function_schema_lists_every_enum_value() {
        let params = &plan_extraction::function_spec().parameters;
        let aggregations = params["properties"]["aggregation"]["enum"].as_array().unwrap();
        assert_eq!(aggregations.len(), Aggregation::ALL.len());
        assert!(aggregations.iter().any(|v| v == "group_by_target_node_province_isp"));

        let charts = params["properties"]["chart_type"]["enum"].as_array().unwrap();
        assert_eq!(charts.len(), ChartType::ALL.len());
    }

    #[test]
    fn test_schema_context_is_separate_system_message() {
        let request = plan_extraction::build_request("近1小时丢包", Some("avg_lost: loss ratio"));
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[1].role, ChatRole::System);
        assert!(request.messages[1].content.contains("avg_lost"));
        assert_eq!(request.messages[2].role, ChatRole::User);

        let request = plan_extraction::build_request("近1小时丢包", Some("  "));
        assert_eq!(request.messages.len(), 2);
    }

    #[test]
    fn test_parse_valid_payload() {
        let reply = ChatReply::call(plan_extraction::FUNCTION_NAME, VALID_ARGS);
        let plan: QueryPlan = plan_extraction::parse_reply(&reply, "各省运营商丢包对比").unwrap();

        assert_eq!(plan.metrics, vec!["avg_lost", "avg_rtt"]);
        assert_eq!(plan.filters.src_isp, vec!["chinatelecom"]);
        assert!(plan.filters.src_province.is_empty());
        assert_eq!(plan.aggregation, Aggregation::GroupByProvinceIsp);
        assert_eq!(plan.chart_type, Some(ChartType::Bar));
        assert_eq!(plan.original_query, "各省运营商丢包对比");
    }

    #[test]
    fn test_missing_payload_is_extraction_failure() {
        let reply = ChatReply::text("The packet loss is fine.");
        assert!(matches!(
            plan_extraction::parse_reply(&reply, "q"),
            Err(crate::utils::error::ValidationError::Extraction(_))
        ));
    }

    #[test]
    fn test_wrong_function_name_rejected() {
        let reply = ChatReply::call("run_sql", VALID_ARGS);
        let err = plan_extraction::parse_reply(&reply, "q").unwrap_err();
        assert!(err.to_string().contains("run_sql"));
    }

    #[test]
    fn test_non_conforming_payloads_rejected() {
        let cases = [
            // unknown aggregation
            r#"{"action":"query","metrics":["avg_lost"],"filters":{"time_range":"last_1_hour"},"aggregation":"group_by_city","need_chart":false}"#,
            // extra field
            r#"{"action":"query","metrics":["avg_lost"],"filters":{"time_range":"last_1_hour"},"aggregation":"none","need_chart":false,"limit":10}"#,
            // metrics not a string list
            r#"{"action":"query","metrics":[1,2],"filters":{"time_range":"last_1_hour"},"aggregation":"none","need_chart":false}"#,
            // missing time range
            r#"{"action":"query","metrics":["avg_lost"],"filters":{},"aggregation":"none","need_chart":false}"#,
            // not JSON
            "action=query",
        ];

        for args in cases {
            let reply = ChatReply::call(plan_extraction::FUNCTION_NAME, args);
            assert!(plan_extraction::parse_reply(&reply, "q").is_err(), "accepted: {}", args);
        }
    }
}

// ============================================================================
// SQL Generation / Relevance Tests
// ============================================================================

mod scenario_tests {
    use super::*;

    #[test]
    fn test_sql_generation_request_carries_bounds_and_schema() {
        let mut plan = QueryPlan::new("近1小时丢包率", "last_1_hour");
        plan.metrics.push("avg_lost".to_string());
        let input = sql_generation::SqlGenerationInput {
            plan: &plan,
            start_ts: 1_700_000_000,
            end_ts: 1_700_003_600,
            table: "detect.detect_ping_log",
            schema: "avg_lost Float64",
        };
        let request = sql_generation::build_request(&input).unwrap();
        let user = &request.messages[1].content;
        assert!(user.contains("timestamp >= 1700000000 AND timestamp <= 1700003600"));
        assert!(user.contains("detect.detect_ping_log"));
        assert!(user.contains("avg_lost Float64"));
        assert!(request.function.is_none());
    }

    #[test]
    fn test_sql_generation_rejects_empty_text() {
        assert!(sql_generation::parse_reply(&ChatReply::text("  \n")).is_err());
        assert_eq!(sql_generation::parse_reply(&ChatReply::text(" SELECT 1 \n")).unwrap(), "SELECT 1");
    }

    #[test]
    fn test_relevance_parses_fenced_json() {
        let reply = ChatReply::text(
            "```json\n{\"alignment_score\": 62, \"suggestions\": [\"group by carrier\"]}\n```",
        );
        let judgment = relevance::parse_reply(&reply).unwrap();
        assert_eq!(judgment.alignment_score, 62.0);
        assert_eq!(judgment.suggestions, vec!["group by carrier"]);
    }

    #[test]
    fn test_relevance_defaults_and_clamps_score() {
        let judgment = relevance::parse_reply(&ChatReply::text("{\"suggestions\": []}")).unwrap();
        assert_eq!(judgment.alignment_score, 50.0);

        let judgment =
            relevance::parse_reply(&ChatReply::text("{\"alignment_score\": 140}")).unwrap();
        assert_eq!(judgment.alignment_score, 100.0);

        assert!(relevance::parse_reply(&ChatReply::text("looks fine")).is_err());
    }
}

// ============================================================================
// Model Tests
// ============================================================================

mod model_tests {
    use super::*;

    #[test]
    fn test_llm_scenario_as_str() {
        assert_eq!(LLMScenario::PlanExtraction.as_str(), "plan_extraction");
        assert_eq!(LLMScenario::SqlGeneration.as_str(), "sql_generation");
        assert_eq!(LLMScenario::RelevanceJudgment.as_str(), "relevance_judgment");
    }

    #[test]
    fn test_llm_error_is_retryable() {
        assert!(LLMError::Timeout(30).is_retryable());
        assert!(LLMError::RateLimited(60).is_retryable());
        assert!(LLMError::ApiError("test".to_string()).is_retryable());
        assert!(!LLMError::Disabled.is_retryable());
        assert!(!LLMError::ParseError("bad".to_string()).is_retryable());
    }

    #[tokio::test]
    async fn test_service_without_endpoint_is_disabled() {
        let service = LLMServiceImpl::new(LlmConfig::default()).unwrap();
        assert!(!service.is_available());
        let request = relevance::build_request("q", "SELECT 1");
        assert!(matches!(service.chat(&request).await, Err(LLMError::Disabled)));
    }
}
