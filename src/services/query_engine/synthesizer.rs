//! SqlSynthesizer - QueryPlan to candidate SQL
//!
//! Template mode is fully deterministic. Assisted mode asks the
//! text-generation collaborator for SQL and repairs its output; any failure
//! there falls back once to the template.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

use crate::models::{
    Aggregation, METRIC_AVG_LOST, METRIC_AVG_RTT, METRIC_DEVICE_COUNT, METRIC_MAX_RTT,
    METRIC_MIN_RTT, QueryPlan,
};
use crate::services::llm::TextGenerator;
use crate::services::llm::scenarios::sql_generation::{self, SqlGenerationInput};
use crate::services::query_engine::safety::{
    append_row_cap, has_trailing_limit, mask_literals, skip_leading_comments,
};
use crate::services::query_engine::schema::{SchemaCatalog, TIME_COLUMN};
use crate::services::query_engine::time_range::TimeRangeResolver;
use crate::utils::{SynthesisError, UnsafeQueryError, ValidationError, sql_quote, strip_code_fences};

const HOUR_BUCKET: &str = "toStartOfHour(toDateTime(timestamp))";

/// Window injected into assisted SQL that never bounds the time column
const FALLBACK_WINDOW_SECS: i64 = 3600;

static READ_ONLY_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(select|with)\b").unwrap());
static TIME_COLUMN_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{}\b", TIME_COLUMN)).unwrap());
static WHERE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bwhere\b").unwrap());
static FROM_TABLE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfrom\s+[`\w.]+").unwrap());
/// Clauses that end a WHERE condition at the same nesting level
static CLAUSE_END_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(group\s+by|having|order\s+by|limit|settings|union)\b").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    Template,
    Assisted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSql {
    pub sql: String,
    pub mode: SynthesisMode,
}

pub struct SqlSynthesizer {
    table: String,
    resolver: TimeRangeResolver,
    generator: Option<Arc<dyn TextGenerator>>,
    catalog: SchemaCatalog,
    assisted_row_cap: u64,
}

impl SqlSynthesizer {
    /// Template-only synthesizer over a fully qualified table
    pub fn new(table: impl Into<String>, resolver: TimeRangeResolver) -> Self {
        let table = table.into();
        Self {
            catalog: SchemaCatalog::new(table.clone()),
            table,
            resolver,
            generator: None,
            assisted_row_cap: 1_000_000,
        }
    }

    pub fn with_assisted(mut self, generator: Arc<dyn TextGenerator>, row_cap: u64) -> Self {
        self.generator = Some(generator);
        self.assisted_row_cap = row_cap.max(1);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub async fn synthesize(&self, plan: &QueryPlan) -> Result<SynthesizedSql, SynthesisError> {
        Self::check_required(plan)?;

        if let Some(generator) = self.generator.as_ref().filter(|g| g.is_available()) {
            match self.assisted(generator.as_ref(), plan).await {
                Ok(sql) => {
                    tracing::debug!("Assisted SQL:\n{}", sql);
                    return Ok(SynthesizedSql { sql, mode: SynthesisMode::Assisted });
                },
                Err(reason) => {
                    tracing::warn!("Assisted SQL generation failed, using template: {}", reason)
                },
            }
        }

        let sql = self.template(plan)?;
        tracing::debug!("Template SQL:\n{}", sql);
        Ok(SynthesizedSql { sql, mode: SynthesisMode::Template })
    }

    fn check_required(plan: &QueryPlan) -> Result<(), ValidationError> {
        if plan.metrics.is_empty() {
            return Err(ValidationError::MissingField("metrics"));
        }
        if plan.filters.time_range.trim().is_empty() {
            return Err(ValidationError::MissingField("filters.time_range"));
        }
        Ok(())
    }

    // ========================================================================
    // Template mode
    // ========================================================================

    /// Deterministic SQL for a plan. No row cap; the safety gate adds it.
    pub fn template(&self, plan: &QueryPlan) -> Result<String, SynthesisError> {
        Self::check_required(plan)?;
        let (start_ts, end_ts) = self.resolver.resolve(&plan.filters.time_range)?;

        let dimensions = Self::dimension_select(plan.aggregation);
        let mut select: Vec<String> = dimensions.iter().map(|d| d.to_string()).collect();
        select.extend(plan.metrics.iter().map(|m| Self::metric_select(m)));
        select.push("COUNT(*) AS count".to_string());

        let mut conditions = vec![
            format!("{} >= {}", TIME_COLUMN, start_ts),
            format!("{} <= {}", TIME_COLUMN, end_ts),
        ];
        if let Some(task) = &plan.task_name {
            conditions.push(format!("task_name = {}", sql_quote(task)));
        }
        for (column, values) in [
            ("src_isp", &plan.filters.src_isp),
            ("src_province", &plan.filters.src_province),
            ("target_node", &plan.filters.target_node),
        ] {
            if !values.is_empty() {
                let list: Vec<String> = values.iter().map(|v| sql_quote(v)).collect();
                conditions.push(format!("{} IN ({})", column, list.join(", ")));
            }
        }

        let mut sql = format!(
            "SELECT {}\nFROM {}\nWHERE {}",
            select.join(", "),
            self.table,
            conditions.join(" AND ")
        );

        let group_by = plan.aggregation.dimension_columns();
        if let Some(first) = group_by.first() {
            sql.push_str(&format!("\nGROUP BY {}", group_by.join(", ")));
            sql.push_str(&format!("\nORDER BY {}", first));
        }

        Ok(sql)
    }

    fn metric_select(metric: &str) -> String {
        match metric {
            METRIC_AVG_RTT => format!("AVG(avg_rtt) AS {}", METRIC_AVG_RTT),
            METRIC_AVG_LOST => format!("AVG(avg_lost) AS {}", METRIC_AVG_LOST),
            METRIC_MAX_RTT => format!("MAX(avg_rtt) AS {}", METRIC_MAX_RTT),
            METRIC_MIN_RTT => format!("MIN(avg_rtt) AS {}", METRIC_MIN_RTT),
            METRIC_DEVICE_COUNT => format!("COUNT(DISTINCT hostname) AS {}", METRIC_DEVICE_COUNT),
            other => format!("AVG({0}) AS {0}", other),
        }
    }

    /// SELECT expressions for the grouping columns
    fn dimension_select(aggregation: Aggregation) -> Vec<String> {
        match aggregation {
            Aggregation::GroupByTimeHour => vec![format!("{} AS hour", HOUR_BUCKET)],
            other => other.dimension_columns().iter().map(|c| c.to_string()).collect(),
        }
    }

    // ========================================================================
    // Assisted mode
    // ========================================================================

    async fn assisted(
        &self,
        generator: &dyn TextGenerator,
        plan: &QueryPlan,
    ) -> Result<String, String> {
        let (start_ts, end_ts) =
            self.resolver.resolve(&plan.filters.time_range).map_err(|e| e.to_string())?;
        let schema = self.catalog.describe();
        let input = SqlGenerationInput {
            plan,
            start_ts,
            end_ts,
            table: &self.table,
            schema: &schema,
        };

        let request = sql_generation::build_request(&input).map_err(|e| e.to_string())?;
        let reply = generator.chat(&request).await.map_err(|e| e.to_string())?;
        let raw = sql_generation::parse_reply(&reply).map_err(|e| e.to_string())?;

        self.post_process(&raw, self.resolver.now().timestamp())
            .map_err(|e| e.to_string())
    }

    /// Repair collaborator SQL: strip fences, require a read-only start,
    /// bound the time column, add a row cap
    pub fn post_process(&self, raw: &str, now_ts: i64) -> Result<String, UnsafeQueryError> {
        let mut sql = strip_code_fences(raw);
        let trimmed = sql.trim().trim_end_matches(';').trim_end();
        sql = trimmed.to_string();

        if sql.is_empty() {
            return Err(UnsafeQueryError::Empty);
        }
        let body = skip_leading_comments(&sql);
        if !READ_ONLY_START.is_match(body) {
            let word = body.split_whitespace().next().unwrap_or_default().to_lowercase();
            return Err(UnsafeQueryError::NotReadOnly(word));
        }

        if !TIME_COLUMN_REGEX.is_match(&sql) {
            sql = Self::inject_time_bound(&sql, now_ts - FALLBACK_WINDOW_SECS, now_ts);
        }

        if !has_trailing_limit(&sql) {
            tracing::info!("Assisted SQL carries no row cap, appending LIMIT {}", self.assisted_row_cap);
            sql = append_row_cap(&sql, self.assisted_row_cap);
        }

        Ok(sql)
    }

    fn inject_time_bound(sql: &str, start_ts: i64, end_ts: i64) -> String {
        let bound = format!(
            "{col} >= {} AND {col} <= {}",
            start_ts,
            end_ts,
            col = TIME_COLUMN
        );
        let masked = mask_literals(sql);

        if let Some(m) = WHERE_REGEX.find(&masked) {
            tracing::warn!("Assisted SQL has no time filter, injecting the last hour");
            // the original condition is wrapped so a top-level OR stays inside the bound
            let end = Self::condition_end(&masked, m.end());
            let condition = &sql[m.end()..end];
            let trailing = &condition[condition.trim_end().len()..];
            return format!(
                "{} {} AND ({}){}{}",
                &sql[..m.end()],
                bound,
                condition.trim(),
                trailing,
                &sql[end..]
            );
        }
        if let Some(m) = FROM_TABLE_REGEX.find(&masked) {
            tracing::warn!("Assisted SQL has no WHERE clause, adding one for the last hour");
            return format!("{} WHERE {}{}", &sql[..m.end()], bound, &sql[m.end()..]);
        }

        tracing::warn!("Assisted SQL has no FROM clause, time bound not injected");
        sql.to_string()
    }

    /// End of the WHERE condition starting at `from`: the next clause keyword at
    /// the same nesting level, the parenthesis closing that level, or the end
    fn condition_end(masked: &str, from: usize) -> usize {
        let bytes = masked.as_bytes();
        let mut depth = 0i32;

        for (idx, byte) in bytes.iter().enumerate().skip(from) {
            match *byte {
                b'(' => depth += 1,
                b')' if depth == 0 => return idx,
                b')' => depth -= 1,
                b if depth == 0 && b.is_ascii_alphabetic() => {
                    let at_word_start = idx == 0
                        || !(bytes[idx - 1].is_ascii_alphanumeric() || bytes[idx - 1] == b'_');
                    if at_word_start
                        && masked.is_char_boundary(idx)
                        && CLAUSE_END_REGEX.is_match(&masked[idx..])
                    {
                        return idx;
                    }
                },
                _ => {},
            }
        }
        masked.len()
    }
}
