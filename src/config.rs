use std::net::SocketAddr;
use std::time::Duration;

/// Process-level configuration. Everything is sourced from the environment so
/// the binary stays stateless; per-user credentials arrive with each request.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub agent_id: String,
    pub agent_version: String,
    pub dev_secret: Option<String>,
    pub allowed_issuers: Vec<String>,
    pub llm: LlmConfig,
    pub providers: ProviderConfig,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub http_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub task_base_url: String,
    pub calendar_base_url: String,
    /// Server-side calendar API key, used when the request carries only a
    /// grant id (the A2A credential set is RECLAIM_API_KEY + NYLAS_GRANT_ID).
    pub calendar_api_key: Option<String>,
    pub http_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let bind = std::env::var("AGENT_BIND")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let allowed_issuers = std::env::var("A2A_ALLOWED_ISSUERS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|issuer| issuer.trim().trim_end_matches('/').to_string())
                    .filter(|issuer| !issuer.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["https://auth.cadence-agent.dev".to_string()]);

        Self {
            bind,
            agent_id: "cadence-calendar".to_string(),
            agent_version: env!("CARGO_PKG_VERSION").to_string(),
            dev_secret: non_empty(std::env::var("A2A_DEV_SECRET").ok()),
            allowed_issuers,
            llm: LlmConfig::from_env(),
            providers: ProviderConfig::from_env(),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("LLM_BASE_URL")
            .ok()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        let model = std::env::var("LLM_MODEL")
            .ok()
            .unwrap_or_else(|| "gpt-5".to_string());

        Self {
            api_key: non_empty(std::env::var("LLM_API_KEY").ok()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http_timeout: env_secs("LLM_TIMEOUT_SECONDS", 30),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let task_base_url = std::env::var("TASK_PROVIDER_BASE_URL")
            .ok()
            .unwrap_or_else(|| "https://api.app.reclaim.ai".to_string());
        let calendar_base_url = std::env::var("CALENDAR_PROVIDER_BASE_URL")
            .ok()
            .unwrap_or_else(|| "https://api.us.nylas.com".to_string());

        Self {
            task_base_url: task_base_url.trim_end_matches('/').to_string(),
            calendar_base_url: calendar_base_url.trim_end_matches('/').to_string(),
            calendar_api_key: non_empty(std::env::var("NYLAS_API_KEY").ok()),
            http_timeout: env_secs("PROVIDER_TIMEOUT_SECONDS", 60),
        }
    }
}

fn env_secs(key: &str, default: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default);
    Duration::from_secs(secs)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}
