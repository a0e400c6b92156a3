pub mod check_availability;
pub mod find_and_analyze;
pub mod manage_productivity;
pub mod optimize_schedule;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{error, warn};

use crate::config::ProviderConfig;
use crate::interpreters::Interpreters;
use crate::models::context::{ContextFields, Credentials, UserContext};
use crate::models::response::ToolResponse;

/// Shared dependencies every capability handler draws on.
pub struct ToolDeps {
    pub interpreters: Interpreters,
    pub providers: ProviderConfig,
}

/// One capability: schema for discovery, execute for the pipeline.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> JsonValue;
    async fn execute(&self, args: JsonValue, credentials: &Credentials) -> ToolResponse;
}

/// The fixed capability set, addressable by name.
pub struct Toolbox {
    tools: Vec<Arc<dyn Tool>>,
}

impl Toolbox {
    pub fn new(deps: Arc<ToolDeps>) -> Self {
        Self {
            tools: vec![
                Arc::new(manage_productivity::ManageProductivityTool::new(deps.clone())),
                Arc::new(find_and_analyze::FindAndAnalyzeTool::new(deps.clone())),
                Arc::new(check_availability::CheckAvailabilityTool::new(deps.clone())),
                Arc::new(optimize_schedule::OptimizeScheduleTool::new(deps)),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|tool| tool.name() == name).cloned()
    }

    pub fn all(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }
}

/// Build the user context out of the merged arguments, mapping failures to
/// an error response so a bad timezone never panics the pipeline.
pub(crate) fn context_from_args(args: &JsonValue) -> Result<UserContext, ToolResponse> {
    let fields: ContextFields = serde_json::from_value(args.clone()).unwrap_or_default();
    UserContext::from_fields(&fields).map_err(|err| {
        warn!(target: "app::tool", error = %err, "rejecting request with invalid context");
        ToolResponse::from(err)
    })
}

/// Standard needs-setup response when the dual-provider credential set is
/// incomplete.
pub(crate) fn setup_response(credentials: &Credentials, purpose: &str) -> ToolResponse {
    let missing = credentials.missing_providers();
    error!(
        target: "app::tool",
        missing = ?missing,
        "request rejected, credentials incomplete"
    );
    ToolResponse::needs_setup(
        format!("Both Reclaim.ai and Nylas must be connected to {purpose}"),
        &missing,
    )
}
