use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{AppError, AppResult};
use crate::models::event::{EventCreateBody, EventPatch, EventRecord};

const PROVIDER: &str = "calendar";

/// Per-request client for the calendar provider. Carries the grant (the
/// provider's per-account authorization handle) alongside the API key.
pub struct CalendarClient {
    client: reqwest::Client,
    base_url: String,
    grant_id: String,
}

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub calendar_id: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    pub limit: Option<u32>,
}

impl CalendarClient {
    pub fn new(config: &ProviderConfig, api_key: &str, grant_id: &str) -> AppResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| {
                AppError::validation("calendar provider key contains invalid characters")
            })?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| {
                AppError::other(format!("failed to build calendar provider client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url: config.calendar_base_url.clone(),
            grant_id: grant_id.to_string(),
        })
    }

    pub async fn list_events(&self, query: &EventQuery) -> AppResult<Vec<EventRecord>> {
        let url = format!("{}/v3/grants/{}/events", self.base_url, self.grant_id);
        let mut request = self.client.get(&url).query(&[(
            "calendar_id",
            query.calendar_id.as_deref().unwrap_or("primary"),
        )]);
        if let Some(start) = query.start {
            request = request.query(&[("start", start.to_string())]);
        }
        if let Some(end) = query.end {
            request = request.query(&[("end", end.to_string())]);
        }
        if let Some(limit) = query.limit {
            request = request.query(&[("limit", limit.to_string())]);
        }

        let response = request.send().await.map_err(request_error)?;
        let envelope: DataEnvelope<Vec<EventRecord>> = Self::parse(response).await?;
        debug!(
            target: "app::provider::calendar",
            count = envelope.data.len(),
            "listed events"
        );
        Ok(envelope.data)
    }

    pub async fn find_event(&self, event_id: &str, calendar_id: &str) -> AppResult<EventRecord> {
        let url = format!(
            "{}/v3/grants/{}/events/{event_id}",
            self.base_url, self.grant_id
        );
        let response = self
            .client
            .get(&url)
            .query(&[("calendar_id", calendar_id)])
            .send()
            .await
            .map_err(request_error)?;
        let envelope: DataEnvelope<EventRecord> = Self::parse(response).await?;
        Ok(envelope.data)
    }

    pub async fn create_event(
        &self,
        body: &EventCreateBody,
        calendar_id: &str,
        notify_participants: bool,
    ) -> AppResult<EventRecord> {
        let url = format!("{}/v3/grants/{}/events", self.base_url, self.grant_id);
        let response = self
            .client
            .post(&url)
            .query(&[
                ("calendar_id", calendar_id),
                ("notify_participants", &notify_participants.to_string()),
            ])
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        let envelope: DataEnvelope<EventRecord> = Self::parse(response).await?;
        debug!(
            target: "app::provider::calendar",
            event_id = %envelope.data.id,
            "created event"
        );
        Ok(envelope.data)
    }

    pub async fn update_event(
        &self,
        event_id: &str,
        patch: &EventPatch,
        calendar_id: &str,
        notify_participants: bool,
    ) -> AppResult<EventRecord> {
        let url = format!(
            "{}/v3/grants/{}/events/{event_id}",
            self.base_url, self.grant_id
        );
        let response = self
            .client
            .put(&url)
            .query(&[
                ("calendar_id", calendar_id),
                ("notify_participants", &notify_participants.to_string()),
            ])
            .json(patch)
            .send()
            .await
            .map_err(request_error)?;
        let envelope: DataEnvelope<EventRecord> = Self::parse(response).await?;
        Ok(envelope.data)
    }

    pub async fn destroy_event(
        &self,
        event_id: &str,
        calendar_id: &str,
        notify_participants: bool,
    ) -> AppResult<()> {
        let url = format!(
            "{}/v3/grants/{}/events/{event_id}",
            self.base_url, self.grant_id
        );
        let response = self
            .client
            .delete(&url)
            .query(&[
                ("calendar_id", calendar_id),
                ("notify_participants", &notify_participants.to_string()),
            ])
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if status.is_success() {
            debug!(target: "app::provider::calendar", event_id, "destroyed event");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        }
    }

    pub async fn find_grant(&self) -> AppResult<JsonValue> {
        let url = format!("{}/v3/grants/{}", self.base_url, self.grant_id);
        let response = self.client.get(&url).send().await.map_err(request_error)?;
        let envelope: DataEnvelope<JsonValue> = Self::parse(response).await?;
        Ok(envelope.data)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        response.json::<T>().await.map_err(|err| {
            AppError::provider(PROVIDER, format!("invalid JSON response: {err}"))
        })
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
    let detail = if body.is_empty() {
        "no detail".to_string()
    } else {
        body.chars().take(200).collect()
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::provider_status(
            PROVIDER,
            status.as_u16(),
            "authentication failed; check the API key and grant",
        ),
        StatusCode::NOT_FOUND => AppError::provider_status(PROVIDER, 404, "event not found"),
        _ => AppError::provider_status(
            PROVIDER,
            status.as_u16(),
            format!("API error ({}): {detail}", status.as_u16()),
        ),
    }
}
