//! QueryPlan - the structured, validated form of an analytic question

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::services::query_engine::time_range::TimeRangeResolver;
use crate::utils::error::ValidationError;

/// The only action a plan may carry
pub const QUERY_ACTION: &str = "query";

// Well-known metric identifiers
pub const METRIC_AVG_LOST: &str = "avg_lost";
pub const METRIC_AVG_RTT: &str = "avg_rtt";
pub const METRIC_MAX_RTT: &str = "max_rtt";
pub const METRIC_MIN_RTT: &str = "min_rtt";
pub const METRIC_DEVICE_COUNT: &str = "device_count";

static IDENTIFIER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap());

// ============================================================================
// Aggregation
// ============================================================================

/// Supported grouping strategies over the dataset's dimension columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    None,
    GroupByProvince,
    GroupByIsp,
    GroupByTask,
    GroupByTargetNode,
    GroupByTimeHour,
    GroupByProvinceIsp,
    GroupByHostnameTask,
    GroupByTargetNodeTask,
    GroupByTargetNodeProvinceIsp,
}

impl Aggregation {
    pub const ALL: [Aggregation; 10] = [
        Self::None,
        Self::GroupByProvince,
        Self::GroupByIsp,
        Self::GroupByTask,
        Self::GroupByTargetNode,
        Self::GroupByTimeHour,
        Self::GroupByProvinceIsp,
        Self::GroupByHostnameTask,
        Self::GroupByTargetNodeTask,
        Self::GroupByTargetNodeProvinceIsp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::GroupByProvince => "group_by_province",
            Self::GroupByIsp => "group_by_isp",
            Self::GroupByTask => "group_by_task",
            Self::GroupByTargetNode => "group_by_target_node",
            Self::GroupByTimeHour => "group_by_time_hour",
            Self::GroupByProvinceIsp => "group_by_province_isp",
            Self::GroupByHostnameTask => "group_by_hostname_task",
            Self::GroupByTargetNodeTask => "group_by_target_node_task",
            Self::GroupByTargetNodeProvinceIsp => "group_by_target_node_province_isp",
        }
    }

    /// Result columns produced by this grouping, in GROUP BY order.
    /// `hour` stands for the hour-bucketed timestamp.
    pub fn dimension_columns(&self) -> &'static [&'static str] {
        match self {
            Self::None => &[],
            Self::GroupByProvince => &["src_province"],
            Self::GroupByIsp => &["src_isp"],
            Self::GroupByTask => &["task_name"],
            Self::GroupByTargetNode => &["target_node"],
            Self::GroupByTimeHour => &["hour"],
            Self::GroupByProvinceIsp => &["src_province", "src_isp"],
            Self::GroupByHostnameTask => &["hostname", "task_name"],
            Self::GroupByTargetNodeTask => &["target_node", "task_name"],
            Self::GroupByTargetNodeProvinceIsp => &["target_node", "src_province", "src_isp"],
        }
    }

    /// Human-readable description for the explanation layer
    pub fn description(&self) -> &'static str {
        match self {
            Self::None => "no grouping",
            Self::GroupByProvince => "grouped by source province",
            Self::GroupByIsp => "grouped by source carrier",
            Self::GroupByTask => "grouped by probe task",
            Self::GroupByTargetNode => "grouped by target node",
            Self::GroupByTimeHour => "hourly trend",
            Self::GroupByProvinceIsp => "cross analysis of province and carrier",
            Self::GroupByHostnameTask => "grouped by probe device and task",
            Self::GroupByTargetNodeTask => "grouped by target node and task",
            Self::GroupByTargetNodeProvinceIsp => "grouped by target node, province and carrier",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "aggregation",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Chart Type
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Line,
    Bar,
    Scatter,
    Histogram,
}

impl ChartType {
    pub const ALL: [ChartType; 4] = [Self::Line, Self::Bar, Self::Scatter, Self::Histogram];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Bar => "bar",
            Self::Scatter => "scatter",
            Self::Histogram => "histogram",
        }
    }
}

impl FromStr for ChartType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidField {
                field: "chart_type",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// QueryPlan
// ============================================================================

/// Inclusion filters. An empty list means "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub time_range: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_isp: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_province: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_node: Vec<String>,
}

/// Structured representation of one analytic question.
///
/// Created per request by the planner, validated once, then only read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub action: String,
    pub metrics: Vec<String>,
    pub filters: QueryFilters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    pub aggregation: Aggregation,
    pub need_chart: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    pub original_query: String,
}

impl QueryPlan {
    /// Empty plan for the given question, filled in by the planner
    pub fn new(original_query: impl Into<String>, time_range: impl Into<String>) -> Self {
        Self {
            action: QUERY_ACTION.to_string(),
            metrics: Vec::new(),
            filters: QueryFilters { time_range: time_range.into(), ..Default::default() },
            task_name: None,
            aggregation: Aggregation::None,
            need_chart: false,
            chart_type: None,
            original_query: original_query.into(),
        }
    }

    /// Check every usability invariant. The time range must resolve.
    pub fn validate(&self, resolver: &TimeRangeResolver) -> Result<(), ValidationError> {
        if self.action != QUERY_ACTION {
            return Err(ValidationError::InvalidField {
                field: "action",
                value: self.action.clone(),
            });
        }

        if self.metrics.is_empty() {
            return Err(ValidationError::MissingField("metrics"));
        }
        if let Some(bad) = self.metrics.iter().find(|m| !IDENTIFIER_REGEX.is_match(m)) {
            return Err(ValidationError::InvalidField { field: "metrics", value: bad.clone() });
        }

        if self.filters.time_range.trim().is_empty() {
            return Err(ValidationError::MissingField("filters.time_range"));
        }
        resolver.resolve(&self.filters.time_range)?;

        Self::check_values("filters.src_isp", &self.filters.src_isp)?;
        Self::check_values("filters.src_province", &self.filters.src_province)?;
        Self::check_values("filters.target_node", &self.filters.target_node)?;

        if let Some(task) = self.task_name.as_ref().filter(|t| t.trim().is_empty()) {
            return Err(ValidationError::InvalidField { field: "task_name", value: task.clone() });
        }

        if self.need_chart && self.chart_type.is_none() {
            return Err(ValidationError::MissingField("chart_type"));
        }

        Ok(())
    }

    fn check_values(field: &'static str, values: &[String]) -> Result<(), ValidationError> {
        match values.iter().find(|v| v.trim().is_empty()) {
            Some(v) => Err(ValidationError::InvalidField { field, value: v.clone() }),
            None => Ok(()),
        }
    }
}
