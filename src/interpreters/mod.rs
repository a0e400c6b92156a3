pub mod availability;
pub mod event_parser;
pub mod llm;
pub mod optimizer;
pub mod resolver;
pub mod router;
pub mod search;
pub mod semantic;
pub mod task_parser;

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::AppResult;

/// All interpreters bundled behind one shared LLM transport. Built once at
/// startup; interpreters are stateless apart from the router's cache.
pub struct Interpreters {
    pub router: router::IntentRouter,
    pub tasks: task_parser::TaskInterpreter,
    pub events: event_parser::EventInterpreter,
    pub availability: availability::AvailabilityInterpreter,
    pub search: search::SearchInterpreter,
    pub semantic: semantic::SemanticMatcher,
    pub resolver: resolver::EntityResolver,
    pub optimizer: optimizer::OptimizationInterpreter,
}

impl Interpreters {
    pub fn from_config(config: &LlmConfig) -> AppResult<Self> {
        let llm = Arc::new(llm::LlmClient::from_config(config)?);
        Ok(Self::with_client(llm))
    }

    pub fn with_client(llm: Arc<llm::LlmClient>) -> Self {
        Self {
            router: router::IntentRouter::new(llm.clone()),
            tasks: task_parser::TaskInterpreter::new(llm.clone()),
            events: event_parser::EventInterpreter::new(llm.clone()),
            availability: availability::AvailabilityInterpreter::new(llm.clone()),
            search: search::SearchInterpreter::new(llm.clone()),
            semantic: semantic::SemanticMatcher::new(llm.clone()),
            resolver: resolver::EntityResolver::new(llm.clone()),
            optimizer: optimizer::OptimizationInterpreter::new(llm),
        }
    }
}
