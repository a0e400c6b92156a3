pub mod auth;
pub mod credentials;
pub mod legacy;
pub mod rpc;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use serde_json::Value as JsonValue;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::interpreters::Interpreters;
use crate::tools::{Tool, Toolbox, ToolDeps};

pub struct AppState {
    pub config: ServerConfig,
    pub toolbox: Toolbox,
}

impl AppState {
    pub fn new(config: ServerConfig) -> AppResult<Self> {
        let interpreters = Interpreters::from_config(&config.llm)?;
        let deps = Arc::new(ToolDeps {
            interpreters,
            providers: config.providers.clone(),
        });
        Ok(Self {
            config,
            toolbox: Toolbox::new(deps),
        })
    }

    /// Validate tool arguments against the tool's declared JSON Schema.
    pub fn validate_arguments(&self, tool: &dyn Tool, arguments: &JsonValue) -> Result<(), String> {
        let schema = tool.schema();
        let compiled = jsonschema::JSONSchema::compile(&schema)
            .map_err(|err| format!("tool schema failed to compile: {err}"))?;
        if let Err(errors) = compiled.validate(arguments) {
            let details: Vec<String> = errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    let location = if path.is_empty() { "root".to_string() } else { path };
                    format!("{location}: {error}")
                })
                .collect();
            return Err(details.join("; "));
        }
        Ok(())
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/a2a/rpc", post(rpc::handle_rpc))
        .route("/.well-known/a2a.json", get(rpc::well_known_card))
        .route(
            "/.well-known/a2a-credentials.json",
            get(rpc::credentials_manifest),
        )
        .route("/health", get(legacy::health))
        .route("/mcp/needs-setup", get(legacy::needs_setup))
        .route("/mcp/tools", get(legacy::list_tools))
        .route("/mcp/tools/{tool_name}", post(legacy::execute_tool))
        .layer(cors)
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> AppResult<()> {
    let bind = config.bind;
    let state = Arc::new(AppState::new(config)?);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::other(format!("failed to bind {bind}: {err}")))?;
    info!(target: "app::rpc", %bind, "agent listening");

    axum::serve(listener, router)
        .await
        .map_err(|err| AppError::other(format!("server error: {err}")))
}
