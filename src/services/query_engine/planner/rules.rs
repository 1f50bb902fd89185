//! Deterministic rule path
//!
//! Each field family is an ordered table evaluated once against the
//! lower-cased question. Aggregation precedence is encoded as a priority
//! number; the first matching rule wins.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{
    Aggregation, ChartType, METRIC_AVG_LOST, METRIC_AVG_RTT, METRIC_DEVICE_COUNT, QueryPlan,
};
use crate::services::query_engine::time_range::canonical_day_expression;
use crate::utils::{StringExt, unique_ordered};

// ============================================================================
// Rule Tables
// ============================================================================

/// Keyword family -> metrics to add
pub const METRIC_RULES: &[(&[&str], &[&str])] = &[
    (&["丢包", "packet_loss", "packet loss", "loss"], &[METRIC_AVG_LOST]),
    (&["延迟", "时延", "rtt", "响应时间", "latency"], &[METRIC_AVG_RTT]),
    (
        &["质量", "覆盖", "性能", "quality", "coverage", "performance"],
        &[METRIC_AVG_LOST, METRIC_AVG_RTT],
    ),
];

/// Canonical carrier identifier and the names that select it
pub const ISP_RULES: &[(&str, &[&str])] = &[
    ("chinatelecom", &["电信", "chinatelecom"]),
    ("chinamobile", &["移动", "chinamobile"]),
    ("chinaunicom", &["联通", "chinaunicom"]),
    ("chinatietong", &["铁通", "chinatietong"]),
];

/// Canonical province identifier and the names that select it
pub const PROVINCE_RULES: &[(&str, &[&str])] = &[
    ("zhejiang", &["浙江", "zhejiang"]),
    ("jiangsu", &["江苏", "jiangsu"]),
    ("beijing", &["北京", "beijing"]),
    ("shanghai", &["上海", "shanghai"]),
    ("guangdong", &["广东", "guangdong"]),
    ("liaoning", &["辽宁", "liaoning"]),
];

const TARGET_NODE: &[&str] = &["目标节点", "target_node", "target node"];
const REGION: &[&str] = &[
    "地区", "区域", "region", "src_isp", "src_province", "运营商", "省份", "isp", "province",
];
const PROBE_DEVICE: &[&str] = &["探测设备", "发起探测", "probe device"];
const HOSTNAME: &[&str] = &["hostname"];
const CARRIER: &[&str] = &["运营商", "carrier", "isp"];
const COVERAGE: &[&str] = &["覆盖", "coverage"];
const COVERAGE_REGION: &[&str] = &["地区", "省份", "region", "province"];
const TASK: &[&str] = &["任务", "task_name", "task"];

const CHART: &[&str] = &["图", "趋势", "对比", "chart", "trend", "compare", "comparison"];
const COMPARISON: &[&str] = &["对比", "compare", "comparison"];

/// One aggregation trigger: every keyword group must match
#[derive(Debug, Clone, Copy)]
pub struct AggregationRule {
    pub priority: u8,
    pub name: &'static str,
    pub all_of: &'static [&'static [&'static str]],
    pub aggregation: Aggregation,
    /// Replaces the keyword-derived metrics when set
    pub metrics: Option<&'static [&'static str]>,
}

impl AggregationRule {
    fn matches(&self, question: &str) -> bool {
        self.all_of.iter().all(|group| question.contains_any(group))
    }
}

const LOSS_AND_LATENCY: &[&str] = &[METRIC_AVG_LOST, METRIC_AVG_RTT];

/// Lower priority number wins
pub const AGGREGATION_RULES: &[AggregationRule] = &[
    AggregationRule {
        priority: 1,
        name: "target node by region",
        all_of: &[TARGET_NODE, REGION],
        aggregation: Aggregation::GroupByTargetNodeProvinceIsp,
        metrics: Some(LOSS_AND_LATENCY),
    },
    AggregationRule {
        priority: 2,
        name: "target node",
        all_of: &[TARGET_NODE],
        aggregation: Aggregation::GroupByTargetNodeTask,
        metrics: Some(LOSS_AND_LATENCY),
    },
    AggregationRule {
        priority: 3,
        name: "probe devices per carrier",
        all_of: &[PROBE_DEVICE, HOSTNAME, CARRIER],
        aggregation: Aggregation::GroupByIsp,
        metrics: Some(&[METRIC_DEVICE_COUNT]),
    },
    AggregationRule {
        priority: 4,
        name: "probe devices",
        all_of: &[PROBE_DEVICE, HOSTNAME],
        aggregation: Aggregation::GroupByHostnameTask,
        metrics: Some(LOSS_AND_LATENCY),
    },
    AggregationRule {
        priority: 5,
        name: "region coverage",
        all_of: &[COVERAGE, COVERAGE_REGION],
        aggregation: Aggregation::GroupByProvinceIsp,
        metrics: None,
    },
    AggregationRule {
        priority: 6,
        name: "task",
        all_of: &[TASK],
        aggregation: Aggregation::GroupByHostnameTask,
        metrics: None,
    },
];

static CN_RELATIVE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:近|最近|过去)\s*(\d+)\s*(个小时|小时|h|分钟|min|天|日|d)").unwrap()
});

static EN_RELATIVE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:last|past)\s+(\d+)\s*(hours?|hrs?|h|minutes?|mins?|days?|d)\b").unwrap()
});

static EN_SINGLE_UNIT_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:last|past)\s+(hour|minute|day)\b").unwrap());

// ============================================================================
// Rule Planner
// ============================================================================

#[derive(Debug, Clone)]
pub struct RulePlanner {
    default_time_range: String,
}

impl RulePlanner {
    pub fn new(default_time_range: impl Into<String>) -> Self {
        Self { default_time_range: default_time_range.into() }
    }

    /// Build an unvalidated plan from keyword tables only
    pub fn plan(&self, question: &str) -> QueryPlan {
        let text = question.to_lowercase();
        let time_range = Self::time_range(&text).unwrap_or_else(|| self.default_time_range.clone());
        let mut plan = QueryPlan::new(question, time_range);

        let metrics: Vec<String> = METRIC_RULES
            .iter()
            .filter(|(keywords, _)| text.contains_any(keywords))
            .flat_map(|(_, metrics)| metrics.iter().map(|m| m.to_string()))
            .collect();
        plan.metrics = unique_ordered(metrics);

        plan.filters.src_isp = Self::matching_ids(&text, ISP_RULES);
        plan.filters.src_province = Self::matching_ids(&text, PROVINCE_RULES);

        if let Some(rule) = Self::aggregation_rule(&text) {
            tracing::debug!("Aggregation rule '{}' matched (priority {})", rule.name, rule.priority);
            plan.aggregation = rule.aggregation;
            if let Some(metrics) = rule.metrics {
                plan.metrics = metrics.iter().map(|m| m.to_string()).collect();
            }
        }

        if plan.metrics.is_empty() {
            plan.metrics.push(METRIC_AVG_LOST.to_string());
        }

        if text.contains_any(CHART) {
            plan.need_chart = true;
            plan.chart_type =
                Some(if text.contains_any(COMPARISON) { ChartType::Bar } else { ChartType::Line });
        }

        plan
    }

    /// Highest-priority aggregation rule matching the lower-cased question
    pub fn aggregation_rule(text: &str) -> Option<&'static AggregationRule> {
        AGGREGATION_RULES
            .iter()
            .filter(|rule| rule.matches(text))
            .min_by_key(|rule| rule.priority)
    }

    fn matching_ids(text: &str, table: &[(&str, &[&str])]) -> Vec<String> {
        table
            .iter()
            .filter(|(_, names)| text.contains_any(names))
            .map(|(id, _)| id.to_string())
            .collect()
    }

    /// Time phrasing to a resolver expression: day-anchored first, then relative windows
    fn time_range(text: &str) -> Option<String> {
        if let Some(expr) = canonical_day_expression(text) {
            return Some(expr);
        }

        let relative = CN_RELATIVE_REGEX
            .captures(text)
            .or_else(|| EN_RELATIVE_REGEX.captures(text))
            .and_then(|caps| {
                let n = caps[1].parse::<u64>().ok().filter(|n| *n > 0)?;
                Some((n, Self::unit(&caps[2])?))
            })
            .or_else(|| {
                EN_SINGLE_UNIT_REGEX
                    .captures(text)
                    .and_then(|caps| Some((1, Self::unit(&caps[1])?)))
            });

        relative.map(|(n, unit)| format!("last_{}_{}", n, unit))
    }

    fn unit(raw: &str) -> Option<&'static str> {
        match raw {
            "分钟" | "min" | "mins" | "minute" | "minutes" => Some("min"),
            "个小时" | "小时" | "h" | "hr" | "hrs" | "hour" | "hours" => Some("hour"),
            "天" | "日" | "d" | "day" | "days" => Some("day"),
            _ => None,
        }
    }
}
