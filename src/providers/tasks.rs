use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult};
use crate::models::task::{TaskCreateBody, TaskPatch, TaskRecord};

const PROVIDER: &str = "task";

/// Per-request client for the task provider. Constructed from the request's
/// API key; nothing is shared across pipelines.
pub struct TaskProviderClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(rename = "taskOrHabit")]
    task_or_habit: Option<TaskRecord>,
}

impl TaskProviderClient {
    pub fn new(config: &ProviderConfig, token: &str) -> AppResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| AppError::validation("task provider token contains invalid characters"))?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| AppError::other(format!("failed to build task provider client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.task_base_url.clone(),
        })
    }

    pub async fn list(&self) -> AppResult<Vec<TaskRecord>> {
        let url = format!("{}/api/tasks", self.base_url);
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        let tasks: Vec<TaskRecord> = Self::parse(response).await?;
        debug!(target: "app::provider::tasks", count = tasks.len(), "listed tasks");
        Ok(tasks)
    }

    pub async fn get(&self, id: i64) -> AppResult<TaskRecord> {
        let url = format!("{}/api/tasks/{id}", self.base_url);
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        Self::parse(response).await
    }

    pub async fn create(&self, body: &TaskCreateBody) -> AppResult<TaskRecord> {
        let url = format!("{}/api/tasks", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        let task: TaskRecord = Self::parse(response).await?;
        debug!(target: "app::provider::tasks", task_id = task.id, "created task");
        Ok(task)
    }

    pub async fn update(&self, id: i64, patch: &TaskPatch) -> AppResult<TaskRecord> {
        let url = format!("{}/api/tasks/{id}", self.base_url);
        let response = self
            .client
            .patch(&url)
            .json(patch)
            .send()
            .await
            .map_err(request_error)?;
        Self::parse(response).await
    }

    /// The provider exposes completion as its own planner endpoint rather
    /// than a status patch.
    pub async fn mark_complete(&self, id: i64) -> AppResult<TaskRecord> {
        let url = format!("{}/api/planner/done/task/{id}", self.base_url);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(request_error)?;
        let envelope: CompletionEnvelope = Self::parse(response).await?;
        match envelope.task_or_habit {
            Some(task) => Ok(task),
            // Some deployments return an empty envelope; re-fetch for the
            // post-completion state.
            None => self.get(id).await,
        }
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let url = format!("{}/api/tasks/{id}", self.base_url);
        let response = self
            .client
            .delete(&url)
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if status.is_success() {
            debug!(target: "app::provider::tasks", task_id = id, "deleted task");
            Ok(())
        } else {
            Err(status_error(status, &response.text().await.unwrap_or_default()))
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| AppError::provider(PROVIDER, format!("invalid JSON response: {err}")))
    }
}

fn request_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::provider(PROVIDER, "request timed out")
    } else {
        AppError::provider(PROVIDER, format!("request failed: {err}"))
    }
}

fn status_error(status: StatusCode, body: &str) -> AppError {
    let detail = extract_message(body);
    match status {
        StatusCode::UNAUTHORIZED => {
            AppError::provider_status(PROVIDER, 401, "authentication failed; check the API key")
        }
        StatusCode::NOT_FOUND => AppError::provider_status(PROVIDER, 404, "resource not found"),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            AppError::provider_status(PROVIDER, status.as_u16(), format!("invalid data: {detail}"))
        }
        _ => AppError::provider_status(
            PROVIDER,
            status.as_u16(),
            format!("API error ({}): {detail}", status.as_u16()),
        ),
    }
}

fn extract_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no detail".to_string()
            } else {
                body.chars().take(200).collect()
            }
        })
}
