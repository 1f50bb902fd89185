//! Assisted path: structured extraction through the text-generation collaborator

use std::sync::Arc;

use crate::models::QueryPlan;
use crate::services::llm::TextGenerator;
use crate::services::llm::scenarios::plan_extraction;
use crate::services::query_engine::schema::SchemaCatalog;
use crate::utils::{ValidationError, unique_ordered};

pub struct AssistedPlanner {
    generator: Arc<dyn TextGenerator>,
    catalog: Option<SchemaCatalog>,
    top_k: usize,
}

impl AssistedPlanner {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, catalog: None, top_k: 5 }
    }

    /// Attach ranked schema documentation to every extraction request
    pub fn with_schema_context(mut self, catalog: SchemaCatalog, top_k: usize) -> Self {
        self.catalog = Some(catalog);
        self.top_k = top_k.max(1);
        self
    }

    pub fn is_available(&self) -> bool {
        self.generator.is_available()
    }

    /// Unvalidated plan from the collaborator's structured payload
    pub async fn extract(&self, question: &str) -> Result<QueryPlan, ValidationError> {
        let context = self
            .catalog
            .as_ref()
            .map(|catalog| catalog.context_for(question, self.top_k));

        let request = plan_extraction::build_request(question, context.as_deref());
        let reply = self
            .generator
            .chat(&request)
            .await
            .map_err(|e| ValidationError::Extraction(e.to_string()))?;

        let mut plan = plan_extraction::parse_reply(&reply, question)?;
        plan.metrics = unique_ordered(plan.metrics);
        Ok(plan)
    }
}
