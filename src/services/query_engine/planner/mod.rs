//! Planner - question text to a validated QueryPlan
//!
//! Two strategies share one contract. The assisted path runs first when it is
//! enabled and its collaborator is usable; any failure there falls back once to
//! the deterministic rule path.

mod assisted;
mod rules;

pub use assisted::AssistedPlanner;
pub use rules::{AGGREGATION_RULES, AggregationRule, RulePlanner};

use serde::Serialize;

use crate::models::QueryPlan;
use crate::services::query_engine::time_range::TimeRangeResolver;
use crate::utils::ValidationError;

/// Strategy that produced a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningMode {
    Rules,
    Assisted,
}

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: QueryPlan,
    pub mode: PlanningMode,
}

pub struct Planner {
    rules: RulePlanner,
    assisted: Option<AssistedPlanner>,
    resolver: TimeRangeResolver,
}

impl Planner {
    /// Rule-only planner
    pub fn new(rules: RulePlanner, resolver: TimeRangeResolver) -> Self {
        Self { rules, assisted: None, resolver }
    }

    pub fn with_assisted(mut self, assisted: AssistedPlanner) -> Self {
        self.assisted = Some(assisted);
        self
    }

    pub fn resolver(&self) -> &TimeRangeResolver {
        &self.resolver
    }

    pub async fn plan(&self, question: &str) -> Result<QueryPlan, ValidationError> {
        self.plan_with_mode(question).await.map(|outcome| outcome.plan)
    }

    pub async fn plan_with_mode(&self, question: &str) -> Result<PlanOutcome, ValidationError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ValidationError::EmptyQuestion);
        }

        if let Some(assisted) = self.assisted.as_ref().filter(|a| a.is_available()) {
            let extracted = assisted
                .extract(question)
                .await
                .and_then(|plan| plan.validate(&self.resolver).map(|_| plan));

            match extracted {
                Ok(plan) => {
                    tracing::info!(
                        "Assisted planning: metrics={:?}, aggregation={}, time_range={}",
                        plan.metrics,
                        plan.aggregation,
                        plan.filters.time_range
                    );
                    return Ok(PlanOutcome { plan, mode: PlanningMode::Assisted });
                },
                Err(e) => tracing::warn!("Assisted planning failed, using rule path: {}", e),
            }
        }

        let plan = self.rules.plan(question);
        plan.validate(&self.resolver)?;
        tracing::info!(
            "Rule planning: metrics={:?}, aggregation={}, time_range={}",
            plan.metrics,
            plan.aggregation,
            plan.filters.time_range
        );
        Ok(PlanOutcome { plan, mode: PlanningMode::Rules })
    }
}
