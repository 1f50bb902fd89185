pub mod llm;
pub mod mysql_client;
pub mod query_engine;

pub use llm::{LLMError, LLMServiceImpl, TextGenerator};
pub use mysql_client::MySQLClient;
pub use query_engine::{
    ExecutionOutcome, PipelineOutput, Planner, QualityGuard, QueryExecutor, QueryPipeline,
    SafetyValidator, SqlSynthesizer, TimeRangeResolver,
};
