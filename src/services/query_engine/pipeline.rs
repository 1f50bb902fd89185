//! QueryPipeline - orchestrates one question end to end
//!
//! plan → synthesize → safety gate → execute → assess. Every collaborator is
//! injected at construction; nothing is looked up globally.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::models::{QualityReport, QueryPlan, ResultSet};
use crate::services::llm::{LLMServiceImpl, TextGenerator};
use crate::services::mysql_client::MySQLClient;
use crate::services::query_engine::executor::QueryExecutor;
use crate::services::query_engine::planner::{AssistedPlanner, Planner, PlanningMode, RulePlanner};
use crate::services::query_engine::quality_guard::{ExecutionOutcome, QualityGuard};
use crate::services::query_engine::safety::SafetyValidator;
use crate::services::query_engine::schema::SchemaCatalog;
use crate::services::query_engine::synthesizer::{SqlSynthesizer, SynthesisMode};
use crate::services::query_engine::time_range::TimeRangeResolver;
use crate::utils::{ExecutionError, PipelineError};

/// Core output handed to the explanation and chart layer
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub request_id: String,
    pub plan: QueryPlan,
    pub planning_mode: PlanningMode,
    pub sql: String,
    pub synthesis_mode: SynthesisMode,
    pub report: QualityReport,
    pub result: ResultSet,
}

pub struct QueryPipeline {
    planner: Planner,
    synthesizer: SqlSynthesizer,
    safety: SafetyValidator,
    guard: QualityGuard,
    executor: Arc<dyn QueryExecutor>,
    query_timeout: Duration,
}

impl QueryPipeline {
    pub fn new(
        planner: Planner,
        synthesizer: SqlSynthesizer,
        safety: SafetyValidator,
        guard: QualityGuard,
        executor: Arc<dyn QueryExecutor>,
        query_timeout: Duration,
    ) -> Self {
        Self { planner, synthesizer, safety, guard, executor, query_timeout }
    }

    /// Build the storage client and check that it answers; the LLM client is added when an endpoint is configured
    pub async fn from_config(config: &Config) -> Result<Self, anyhow::Error> {
        let client = MySQLClient::new(&config.storage)?;
        client.ping().await.map_err(|e| {
            anyhow::anyhow!(
                "storage at {}:{} is unreachable: {}",
                config.storage.host,
                config.storage.port,
                e
            )
        })?;
        tracing::info!("Storage connectivity verified");
        let executor: Arc<dyn QueryExecutor> = Arc::new(client);

        let generator: Option<Arc<dyn TextGenerator>> = if config.llm.api_base.trim().is_empty() {
            tracing::info!("LLM endpoint not configured, assisted paths disabled");
            None
        } else {
            let service = LLMServiceImpl::new(config.llm.clone())?;
            tracing::info!("LLM endpoint {} (model {})", config.llm.api_base, service.model());
            Some(Arc::new(service))
        };

        Self::with_collaborators(config, executor, generator)
    }

    /// Wire the pipeline from configuration around the given collaborators
    pub fn with_collaborators(
        config: &Config,
        executor: Arc<dyn QueryExecutor>,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Result<Self, anyhow::Error> {
        let pipeline_cfg = &config.pipeline;
        let resolver = TimeRangeResolver::new(pipeline_cfg.offset()?);
        let table = config.storage.full_table_name();

        let mut planner = Planner::new(RulePlanner::new(&pipeline_cfg.default_time_range), resolver);
        let mut synthesizer = SqlSynthesizer::new(&table, resolver);
        let mut guard = QualityGuard::new(config.quality.clone(), pipeline_cfg.max_rows);

        if let Some(generator) = generator {
            if pipeline_cfg.assisted_planning {
                let mut assisted = AssistedPlanner::new(generator.clone());
                if pipeline_cfg.schema_context {
                    assisted = assisted.with_schema_context(
                        SchemaCatalog::new(&table),
                        pipeline_cfg.schema_context_top_k,
                    );
                }
                planner = planner.with_assisted(assisted);
            }
            if pipeline_cfg.assisted_sql {
                synthesizer =
                    synthesizer.with_assisted(generator.clone(), pipeline_cfg.assisted_row_cap);
            }
            if config.quality.relevance_check {
                guard = guard.with_generator(generator);
            }
        }

        Ok(Self::new(
            planner,
            synthesizer,
            SafetyValidator::new(pipeline_cfg.max_rows),
            guard,
            executor,
            Duration::from_secs(pipeline_cfg.query_timeout_secs.max(1)),
        ))
    }

    /// Run one question through every stage
    pub async fn run(&self, question: &str) -> Result<PipelineOutput, PipelineError> {
        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("pipeline", request_id = %request_id);
        self.run_inner(question, request_id).instrument(span).await
    }

    async fn run_inner(
        &self,
        question: &str,
        request_id: String,
    ) -> Result<PipelineOutput, PipelineError> {
        let started = Instant::now();

        let planned = self.planner.plan_with_mode(question).await.map_err(|e| {
            tracing::error!("Planning failed: {}", e);
            PipelineError::from(e)
        })?;
        let plan = planned.plan;

        let synthesized = self.synthesizer.synthesize(&plan).await.map_err(|e| {
            tracing::error!("SQL synthesis failed: {}", e);
            PipelineError::from(e)
        })?;

        let (mut sql, mut synthesis_mode) = match self.safety.validate(&synthesized.sql) {
            Ok(sql) => (sql, synthesized.mode),
            Err(e) if synthesized.mode == SynthesisMode::Assisted => {
                tracing::warn!("Assisted SQL rejected by safety gate, using template: {}", e);
                (self.template_sql(&plan)?, SynthesisMode::Template)
            },
            Err(e) => {
                tracing::error!("Safety validation failed: {}", e);
                return Err(e.into());
            },
        };
        tracing::debug!("Executing SQL:\n{}", sql);

        let mut outcome = self.execute(&sql).await;
        if synthesis_mode == SynthesisMode::Assisted && matches!(outcome, ExecutionOutcome::Failed(_)) {
            tracing::warn!("Assisted SQL failed to execute, retrying once with template SQL");
            sql = self.template_sql(&plan)?;
            synthesis_mode = SynthesisMode::Template;
            outcome = self.execute(&sql).await;
        }

        let report = self.guard.assess(&plan, &sql, &outcome).await;

        match outcome {
            ExecutionOutcome::Completed { result, .. } => {
                tracing::info!(
                    "Pipeline finished in {}ms: {} rows, quality {:.1}",
                    started.elapsed().as_millis(),
                    result.row_count(),
                    report.overall_score
                );
                Ok(PipelineOutput {
                    request_id,
                    plan,
                    planning_mode: planned.mode,
                    sql,
                    synthesis_mode,
                    report,
                    result,
                })
            },
            ExecutionOutcome::Failed(source) => {
                tracing::error!("Execution failed: {}", source);
                Err(PipelineError::Execution { source, report: Box::new(report) })
            },
        }
    }

    /// Template SQL through the safety gate
    fn template_sql(&self, plan: &QueryPlan) -> Result<String, PipelineError> {
        let sql = self.synthesizer.template(plan)?;
        Ok(self.safety.validate(&sql)?)
    }

    async fn execute(&self, sql: &str) -> ExecutionOutcome {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.query_timeout, self.executor.execute(sql)).await
        {
            Ok(result) => result,
            Err(_) => Err(ExecutionError::Timeout(self.query_timeout.as_secs())),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(result) => {
                tracing::info!("Query returned {} rows in {}ms", result.row_count(), elapsed_ms);
                ExecutionOutcome::Completed { result, elapsed_ms }
            },
            Err(e) => {
                tracing::warn!("Query failed after {}ms: {}", elapsed_ms, e);
                ExecutionOutcome::Failed(e)
            },
        }
    }
}
