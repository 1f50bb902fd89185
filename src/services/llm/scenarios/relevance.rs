//! Relevance Judgment Scenario - how well a SQL statement answers the question

use serde::Deserialize;

use crate::services::llm::{
    ChatMessage, ChatReply, ChatRequest, LLMError, LLMScenario, TextGenerator,
};

const PROMPT: &str = include_str!("relevance_prompt.md");

/// Score used when the reply omits `alignment_score`
const MISSING_SCORE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelevanceJudgment {
    #[serde(default = "missing_score")]
    pub alignment_score: f64,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub field_appropriateness: Option<String>,
    #[serde(default)]
    pub aggregation_appropriateness: Option<String>,
    #[serde(default)]
    pub filter_completeness: Option<String>,
    #[serde(default)]
    pub result_relevance: Option<String>,
}

fn missing_score() -> f64 {
    MISSING_SCORE
}

impl RelevanceJudgment {
    /// Suggestions first, then each non-empty per-aspect assessment with its label
    pub fn findings(&self) -> Vec<String> {
        let assessments = [
            ("fields", &self.field_appropriateness),
            ("aggregation", &self.aggregation_appropriateness),
            ("filters", &self.filter_completeness),
            ("result", &self.result_relevance),
        ];

        let mut findings: Vec<String> = self
            .suggestions
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        for (label, text) in assessments {
            if let Some(text) = text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                findings.push(format!("{}: {}", label, text));
            }
        }
        findings
    }
}

pub fn build_request(question: &str, sql: &str) -> ChatRequest {
    ChatRequest::new(
        LLMScenario::RelevanceJudgment,
        vec![
            ChatMessage::system(PROMPT),
            ChatMessage::user(format!("Question: {}\n\nSQL:\n{}", question, sql)),
        ],
    )
    .with_temperature(0.1)
    .json()
}

/// Parse the JSON object out of the reply, tolerating surrounding prose or fences
pub fn parse_reply(reply: &ChatReply) -> Result<RelevanceJudgment, LLMError> {
    let content = reply.content.trim();
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => {
            return Err(LLMError::ParseError(format!(
                "relevance reply is not a JSON object: {}",
                content
            )));
        },
    };

    let mut judgment: RelevanceJudgment = serde_json::from_str(json)?;
    judgment.alignment_score = judgment.alignment_score.clamp(0.0, 100.0);
    Ok(judgment)
}

/// Ask the collaborator for a judgment
pub async fn judge(
    generator: &dyn TextGenerator,
    question: &str,
    sql: &str,
) -> Result<RelevanceJudgment, LLMError> {
    let reply = generator.chat(&build_request(question, sql)).await?;
    parse_reply(&reply)
}
