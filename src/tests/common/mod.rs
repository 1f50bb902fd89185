// Common test utilities and helpers

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;

use crate::config::Config;
use crate::models::{Cell, ResultSet};
use crate::services::llm::{ChatReply, ChatRequest, LLMError, LLMScenario, TextGenerator};
use crate::services::query_engine::{QueryExecutor, QueryPipeline};
use crate::utils::ExecutionError;

/// Text generator answering from per-scenario scripts.
/// An exhausted script answers with an API error.
#[derive(Default)]
pub struct MockTextGenerator {
    scripts: Mutex<HashMap<LLMScenario, VecDeque<Result<ChatReply, String>>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, scenario: LLMScenario, reply: ChatReply) -> Self {
        self.push(scenario, Ok(reply));
        self
    }

    pub fn fail(self, scenario: LLMScenario, message: &str) -> Self {
        self.push(scenario, Err(message.to_string()));
        self
    }

    fn push(&self, scenario: LLMScenario, entry: Result<ChatReply, String>) {
        self.scripts
            .lock()
            .expect("scripts lock")
            .entry(scenario)
            .or_default()
            .push_back(entry);
    }

    /// Requests seen for one scenario, in call order
    pub fn requests_for(&self, scenario: LLMScenario) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|r| r.scenario == scenario)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, LLMError> {
        self.requests.lock().expect("requests lock").push(request.clone());
        let next = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get_mut(&request.scenario)
            .and_then(|queue| queue.pop_front());

        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(LLMError::ApiError(message)),
            None => Err(LLMError::ApiError(format!(
                "no scripted reply for {}",
                request.scenario.as_str()
            ))),
        }
    }
}

/// Executor answering from a script and recording every statement it runs.
/// An exhausted script repeats the last answer.
pub struct MockExecutor {
    script: Mutex<VecDeque<Result<ResultSet, ExecutionError>>>,
    last: Mutex<Option<Result<ResultSet, ExecutionError>>>,
    executed: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new(script: Vec<Result<ResultSet, ExecutionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn returning(result: ResultSet) -> Self {
        Self::new(vec![Ok(result)])
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().expect("executed lock").clone()
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        self.executed.lock().expect("executed lock").push(sql.to_string());
        let next = self.script.lock().expect("script lock").pop_front();
        let mut last = self.last.lock().expect("last lock");
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone()
            .unwrap_or_else(|| Err(ExecutionError::Connectivity("no scripted result".to_string())))
    }
}

/// Twelve rows of per-carrier loss and latency with healthy spread
pub fn isp_result() -> ResultSet {
    let rows = (0..12)
        .map(|i| {
            vec![
                Cell::from(format!("isp{}", i).as_str()),
                Cell::Float(0.01 * (i + 1) as f64),
                Cell::Float(20.0 + 3.0 * i as f64),
                Cell::Int(100),
            ]
        })
        .collect();
    ResultSet::new(
        vec!["src_isp".into(), "avg_lost".into(), "avg_rtt".into(), "count".into()],
        rows,
    )
}

/// Single-row overall loss result
pub fn loss_result(values: &[f64]) -> ResultSet {
    let rows = values.iter().map(|v| vec![Cell::Float(*v), Cell::Int(100)]).collect();
    ResultSet::new(vec!["avg_lost".into(), "count".into()], rows)
}

/// Configuration with both assisted paths switched on and the relevance check off
pub fn assisted_config() -> Config {
    let mut config = Config::default();
    config.pipeline.assisted_planning = true;
    config.pipeline.assisted_sql = true;
    config.quality.relevance_check = false;
    config
}

pub fn build_pipeline(
    config: &Config,
    executor: Arc<MockExecutor>,
    generator: Option<Arc<MockTextGenerator>>,
) -> QueryPipeline {
    let generator = generator.map(|g| g as Arc<dyn TextGenerator>);
    QueryPipeline::with_collaborators(config, executor, generator).expect("pipeline from config")
}
