//! Query engine: question → plan → SQL → validated result with quality report

pub mod executor;
pub mod pipeline;
pub mod planner;
pub mod quality_guard;
pub mod safety;
pub mod schema;
pub mod synthesizer;
pub mod time_range;

pub use executor::QueryExecutor;
pub use pipeline::{PipelineOutput, QueryPipeline};
pub use planner::{AssistedPlanner, PlanOutcome, Planner, PlanningMode, RulePlanner};
pub use quality_guard::{ExecutionOutcome, QualityGuard};
pub use safety::SafetyValidator;
pub use schema::SchemaCatalog;
pub use synthesizer::{SqlSynthesizer, SynthesisMode, SynthesizedSql};
pub use time_range::TimeRangeResolver;
