pub mod quality;
pub mod query_plan;
pub mod result_set;

pub use quality::{QualityGrade, QualityReport, StageReport, StageStatus, StageWeights};
pub use query_plan::{
    Aggregation, ChartType, METRIC_AVG_LOST, METRIC_AVG_RTT, METRIC_DEVICE_COUNT,
    METRIC_MAX_RTT, METRIC_MIN_RTT, QUERY_ACTION, QueryFilters, QueryPlan,
};
pub use result_set::{Cell, ResultSet};
