use async_trait::async_trait;

use crate::models::ResultSet;
use crate::utils::error::ExecutionError;

/// Storage collaborator: runs one read-only statement and returns its table
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError>;
}
