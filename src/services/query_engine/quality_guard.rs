//! QualityGuard - scores synthesis, execution and result quality
//!
//! ```text
//!   sql ──► complexity + shape + relevance ──► sql_generation stage
//!   outcome ──► row volume + columns ────────► execution stage
//!   result ──► completeness + domain + spread + plan alignment ──► result_quality stage
//!                                    │
//!                                    ▼
//!                weighted overall score (config weights)
//! ```
//!
//! Never fails: every finding becomes a deduction plus a textual issue.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use crate::config::QualityConfig;
use crate::models::{
    METRIC_AVG_LOST, METRIC_AVG_RTT, METRIC_MAX_RTT, METRIC_MIN_RTT, QualityReport, QueryPlan,
    ResultSet, StageReport,
};
use crate::services::llm::TextGenerator;
use crate::services::llm::scenarios::relevance;
use crate::services::query_engine::safety::{has_trailing_limit, limit_values, mask_literals};
use crate::services::query_engine::schema::TIME_COLUMN;
use crate::utils::{ExecutionError, coefficient_of_variation};

static JOIN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bjoin\b").unwrap());
static AGGREGATE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(count|sum|avg|min|max)\s*\(").unwrap());
static SELECT_STAR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bselect\s+(?:distinct\s+)?\*").unwrap());
static SUBQUERY_OPEN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\(\s*(select|with)\b").unwrap());
static TIME_FILTER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?is)\bwhere\b.*\b{}\b", TIME_COLUMN)).unwrap());

/// Result columns whose values are loss ratios
const LOSS_COLUMNS: &[&str] = &[METRIC_AVG_LOST];
/// Result columns whose values are latencies
const LATENCY_COLUMNS: &[&str] = &[METRIC_AVG_RTT, METRIC_MAX_RTT, METRIC_MIN_RTT];

/// What the storage collaborator returned for the final statement
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed { result: ResultSet, elapsed_ms: u64 },
    Failed(ExecutionError),
}

impl ExecutionOutcome {
    pub fn result(&self) -> Option<&ResultSet> {
        match self {
            Self::Completed { result, .. } => Some(result),
            Self::Failed(_) => None,
        }
    }
}

/// Running deduction tally for one stage
#[derive(Default)]
struct Tally {
    deductions: f64,
    issues: Vec<String>,
}

impl Tally {
    fn deduct(&mut self, points: f64, issue: String) {
        self.deductions += points.max(0.0);
        self.issues.push(issue);
    }
}

pub struct QualityGuard {
    config: QualityConfig,
    max_rows: u64,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl QualityGuard {
    pub fn new(config: QualityConfig, max_rows: u64) -> Self {
        Self { config, max_rows, generator: None }
    }

    /// Collaborator used for the relevance judgment
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    pub async fn assess(
        &self,
        plan: &QueryPlan,
        sql: &str,
        outcome: &ExecutionOutcome,
    ) -> QualityReport {
        let sql_generation = self.assess_sql(plan, sql).await;
        let execution = self.assess_execution(outcome);
        let result_quality = self.assess_result(plan, outcome);

        let report = QualityReport::assemble(
            sql_generation,
            execution,
            result_quality,
            &self.config.weights,
        );

        if report.overall_score < self.config.passing_score {
            tracing::warn!(
                "Quality {:.1} ({}), issues: {:?}",
                report.overall_score,
                report.grade.label(),
                report.all_issues().collect::<Vec<_>>()
            );
        } else {
            tracing::info!("Quality {:.1} ({})", report.overall_score, report.grade.label());
        }
        report
    }

    // ========================================================================
    // SQL generation stage
    // ========================================================================

    async fn assess_sql(&self, plan: &QueryPlan, sql: &str) -> StageReport {
        if sql.trim().is_empty() {
            return StageReport::failed("no SQL was produced");
        }

        let cfg = &self.config;
        let masked = mask_literals(sql);
        let mut tally = Tally::default();

        let joins = JOIN_REGEX.find_iter(&masked).count();
        if joins > cfg.max_joins {
            tally.deduct(cfg.join_penalty, format!("too many JOINs ({})", joins));
        }

        let depth = subquery_depth(&masked);
        if depth > cfg.max_subquery_depth {
            tally.deduct(cfg.subquery_penalty, format!("subqueries nested {} levels deep", depth));
        }

        let aggregates = AGGREGATE_REGEX.find_iter(&masked).count();
        if aggregates > cfg.max_aggregates {
            tally.deduct(
                cfg.aggregate_penalty,
                format!("too many aggregate functions ({})", aggregates),
            );
        }

        if !TIME_FILTER_REGEX.is_match(&masked) {
            tally.deduct(
                cfg.missing_time_filter_penalty,
                "no time filter, the query may scan the whole table".to_string(),
            );
        }

        if !has_trailing_limit(sql) {
            tally.deduct(cfg.missing_limit_penalty, "no row cap".to_string());
        } else if let Some(max) = limit_values(sql).into_iter().max().filter(|v| *v > self.max_rows) {
            tally.deduct(cfg.oversized_limit_penalty, format!("row cap {} is too large", max));
        }

        if SELECT_STAR_REGEX.is_match(&masked) {
            tally.deduct(cfg.select_star_penalty, "SELECT * instead of explicit columns".to_string());
        }

        if cfg.relevance_check {
            let (score, findings) = self.relevance(&plan.original_query, sql).await;
            // the judgment caps the stage score
            if score < 100.0 - tally.deductions {
                tally.deductions = 100.0 - score;
            }
            if score < cfg.relevance_issue_below {
                if findings.is_empty() {
                    tally.issues.push(format!("low relevance to the question ({:.0})", score));
                } else {
                    tally.issues.extend(findings);
                }
            }
        }

        StageReport::scored(tally.deductions, tally.issues, cfg.passing_score)
    }

    /// Relevance score and findings; neutral when no judgment is available
    async fn relevance(&self, question: &str, sql: &str) -> (f64, Vec<String>) {
        let neutral = (self.config.neutral_relevance, Vec::new());
        let Some(generator) = self.generator.as_ref().filter(|g| g.is_available()) else {
            return neutral;
        };

        match relevance::judge(generator.as_ref(), question, sql).await {
            Ok(judgment) => {
                let findings = judgment.findings();
                (judgment.alignment_score, findings)
            },
            Err(e) => {
                tracing::warn!("Relevance judgment unavailable: {}", e);
                neutral
            },
        }
    }

    // ========================================================================
    // Execution stage
    // ========================================================================

    fn assess_execution(&self, outcome: &ExecutionOutcome) -> StageReport {
        let cfg = &self.config;
        let (result, elapsed_ms) = match outcome {
            ExecutionOutcome::Failed(e) => {
                return StageReport::failed(format!("query failed ({}): {}", e.kind(), e));
            },
            ExecutionOutcome::Completed { result, elapsed_ms } => (result, *elapsed_ms),
        };

        if result.columns.is_empty() {
            return StageReport::failed("result carries no column information").with_elapsed(elapsed_ms);
        }

        let mut tally = Tally::default();
        let rows = result.row_count();
        if rows == 0 {
            tally.deduct(cfg.empty_rows_penalty, "query returned no rows".to_string());
        } else if rows < cfg.low_volume_rows {
            tally.deduct(cfg.volume_penalty, format!("only {} rows returned", rows));
        } else if rows > cfg.high_volume_rows {
            tally.deduct(
                cfg.volume_penalty,
                format!("{} rows returned, consider more aggregation", rows),
            );
        }

        StageReport::scored(tally.deductions, tally.issues, cfg.passing_score).with_elapsed(elapsed_ms)
    }

    // ========================================================================
    // Result quality stage
    // ========================================================================

    fn assess_result(&self, plan: &QueryPlan, outcome: &ExecutionOutcome) -> StageReport {
        let cfg = &self.config;
        let Some(result) = outcome.result() else {
            return StageReport::failed("no result to assess");
        };
        if result.columns.is_empty() {
            return StageReport::failed("result carries no columns");
        }

        let mut tally = Tally::default();
        if result.is_empty() {
            tally.deduct(cfg.empty_result_penalty, "result is empty".to_string());
        } else {
            self.check_completeness(result, &mut tally);
            self.check_domains(result, &mut tally);
            self.check_distribution(plan, result, &mut tally);
        }
        self.check_plan_alignment(plan, result, &mut tally);

        StageReport::scored(tally.deductions, tally.issues, cfg.passing_score)
    }

    fn check_completeness(&self, result: &ResultSet, tally: &mut Tally) {
        let cfg = &self.config;
        for (idx, column) in result.columns.iter().enumerate() {
            let rate = result.missing_rate(idx);
            if rate > cfg.missing_rate_high {
                tally.deduct(
                    cfg.missing_high_penalty,
                    format!("column {} is mostly missing ({:.1}%)", column, rate * 100.0),
                );
            } else if rate > cfg.missing_rate_moderate {
                tally.deduct(
                    cfg.missing_moderate_penalty,
                    format!("column {} has many missing values ({:.1}%)", column, rate * 100.0),
                );
            }
        }

        for field in &cfg.key_fields {
            if let Some(idx) = result.column_index(field) {
                let rate = result.missing_rate(idx);
                if rate > cfg.key_missing_rate {
                    tally.deduct(
                        cfg.key_missing_penalty,
                        format!("key field {} missing rate {:.1}%", field, rate * 100.0),
                    );
                }
            }
        }
    }

    fn check_domains(&self, result: &ResultSet, tally: &mut Tally) {
        let cfg = &self.config;
        let rows = result.row_count() as f64;

        for column in LOSS_COLUMNS {
            let Some(idx) = result.column_index(column) else { continue };
            let bad = result
                .numeric_values(idx)
                .into_iter()
                .filter(|v| !(0.0..=1.0).contains(v))
                .count();
            if bad > 0 {
                let rate = bad as f64 / rows;
                tally.deduct(
                    (rate * 100.0).min(cfg.loss_out_of_range_cap),
                    format!("{:.1}% of {} values fall outside [0, 1]", rate * 100.0, column),
                );
            }
        }

        for column in LATENCY_COLUMNS {
            let Some(idx) = result.column_index(column) else { continue };
            let bad = result.numeric_values(idx).into_iter().filter(|v| *v < 0.0).count();
            if bad > 0 {
                let rate = bad as f64 / rows;
                tally.deduct(
                    (rate * 100.0).min(cfg.negative_latency_cap),
                    format!("{:.1}% of {} values are negative", rate * 100.0, column),
                );
            }
        }
    }

    /// Spread of every numeric metric column, over in-domain values only
    fn check_distribution(&self, plan: &QueryPlan, result: &ResultSet, tally: &mut Tally) {
        let cfg = &self.config;
        let mut columns: Vec<&str> = LOSS_COLUMNS.iter().chain(LATENCY_COLUMNS).copied().collect();
        for metric in &plan.metrics {
            if !columns.contains(&metric.as_str()) {
                columns.push(metric);
            }
        }

        for column in columns {
            let Some(idx) = result.column_index(column) else { continue };
            let values: Vec<f64> = result
                .numeric_values(idx)
                .into_iter()
                .filter(|v| in_domain(column, *v))
                .collect();

            let Some(cv) = coefficient_of_variation(&values) else { continue };
            if cv < cfg.cv_low {
                tally.deduct(
                    cfg.cv_low_penalty,
                    format!("{} values are nearly constant (cv {:.3})", column, cv),
                );
            } else if cv > cfg.cv_high {
                tally.deduct(
                    cfg.cv_high_penalty,
                    format!("{} values vary widely (cv {:.2}), possible outliers", column, cv),
                );
            }
        }
    }

    fn check_plan_alignment(&self, plan: &QueryPlan, result: &ResultSet, tally: &mut Tally) {
        let cfg = &self.config;
        for metric in &plan.metrics {
            if !result.has_column(metric) {
                tally.deduct(cfg.missing_metric_penalty, format!("expected metric {} is missing", metric));
            }
        }
        for column in plan.aggregation.dimension_columns() {
            if !result.has_column(column) {
                tally.deduct(
                    cfg.missing_group_penalty,
                    format!("expected grouping column {} is missing", column),
                );
            }
        }
    }
}

fn in_domain(column: &str, value: f64) -> bool {
    if LOSS_COLUMNS.contains(&column) {
        (0.0..=1.0).contains(&value)
    } else if LATENCY_COLUMNS.contains(&column) {
        value >= 0.0
    } else {
        true
    }
}

/// Deepest nesting of parenthesised SELECT/WITH blocks
fn subquery_depth(masked_sql: &str) -> usize {
    let mut stack: Vec<bool> = Vec::new();
    let mut depth = 0;
    let mut max_depth = 0;

    for (idx, ch) in masked_sql.char_indices() {
        match ch {
            '(' => {
                let opens_query = SUBQUERY_OPEN_REGEX.is_match(&masked_sql[idx..]);
                if opens_query {
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                stack.push(opens_query);
            },
            ')' => {
                if stack.pop() == Some(true) {
                    depth -= 1;
                }
            },
            _ => {},
        }
    }
    max_depth
}
