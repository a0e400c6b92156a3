use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

/// Per-request user context. Constructed once from the RPC params and passed
/// read-only through the pipeline; never persisted.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub timezone: Tz,
    pub current_date: NaiveDate,
    pub current_time: NaiveTime,
    pub now: DateTime<Tz>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
}

impl UserContext {
    pub fn from_fields(fields: &ContextFields) -> AppResult<Self> {
        let timezone: Tz = fields
            .user_timezone
            .as_deref()
            .unwrap_or("UTC")
            .parse()
            .map_err(|_| {
                AppError::validation(format!(
                    "unknown timezone '{}'",
                    fields.user_timezone.as_deref().unwrap_or_default()
                ))
            })?;

        let current_date = match fields.current_date.as_deref() {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| AppError::validation(format!("invalid current_date '{raw}'")))?,
            None => chrono::Utc::now().with_timezone(&timezone).date_naive(),
        };
        let current_time = match fields.current_time.as_deref() {
            Some(raw) => NaiveTime::parse_from_str(raw, "%H:%M:%S")
                .map_err(|_| AppError::validation(format!("invalid current_time '{raw}'")))?,
            None => chrono::Utc::now().with_timezone(&timezone).time(),
        };

        let now = match timezone
            .from_local_datetime(&current_date.and_time(current_time))
            .earliest()
        {
            Some(instant) => instant,
            None => {
                warn!(
                    target: "app::context",
                    date = %current_date,
                    time = %current_time,
                    "local datetime does not exist in timezone, falling back to UTC mapping"
                );
                timezone.from_utc_datetime(&current_date.and_time(current_time))
            }
        };

        Ok(Self {
            timezone,
            current_date,
            current_time,
            now,
            user_name: fields.user_name.clone(),
            user_email: fields.user_email.clone(),
        })
    }

    /// Localize a naive ISO datetime string ("2024-01-16T15:00:00") in the
    /// user's timezone and return Unix seconds.
    pub fn naive_iso_to_unix(&self, iso: &str) -> AppResult<i64> {
        let naive = chrono::NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| {
                // Tolerate an offset suffix the interpreter occasionally emits.
                DateTime::parse_from_rfc3339(iso).map(|fixed| fixed.naive_local())
            })
            .map_err(|_| AppError::validation(format!("invalid datetime '{iso}'")))?;

        let localized = self
            .timezone
            .from_local_datetime(&naive)
            .earliest()
            .ok_or_else(|| AppError::validation(format!("datetime '{iso}' not valid in timezone")))?;
        Ok(localized.timestamp())
    }

    pub fn instant_from_unix(&self, secs: i64) -> DateTime<Tz> {
        self.timezone
            .timestamp_opt(secs, 0)
            .single()
            .unwrap_or_else(|| self.timezone.timestamp_opt(0, 0).unwrap())
    }

    /// Prompt header shared by every interpreter.
    pub fn prompt_header(&self) -> String {
        format!(
            "Current date/time: {} {} {}\nDay of week: {}",
            self.current_date,
            self.current_time,
            self.timezone,
            self.now.format("%A"),
        )
    }
}

/// The context-injection fields every capability accepts alongside its
/// domain arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextFields {
    #[serde(default)]
    pub user_timezone: Option<String>,
    #[serde(default)]
    pub current_date: Option<String>,
    #[serde(default)]
    pub current_time: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
}

/// Per-request provider credentials. Never logged, never serialized into
/// approval payloads, dropped with the request.
#[derive(Clone, Default)]
pub struct Credentials {
    pub task_api_key: Option<String>,
    pub calendar_api_key: Option<String>,
    pub calendar_grant_id: Option<String>,
}

impl Credentials {
    pub fn task_configured(&self) -> bool {
        self.task_api_key.is_some()
    }

    pub fn calendar_configured(&self) -> bool {
        self.calendar_api_key.is_some() && self.calendar_grant_id.is_some()
    }

    pub fn setup_complete(&self) -> bool {
        self.task_configured() && self.calendar_configured()
    }

    pub fn missing_providers(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.task_configured() {
            missing.push("Reclaim.ai");
        }
        if !self.calendar_configured() {
            missing.push("Nylas");
        }
        missing
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("task_api_key", &self.task_api_key.as_ref().map(|_| "***"))
            .field(
                "calendar_api_key",
                &self.calendar_api_key.as_ref().map(|_| "***"),
            )
            .field(
                "calendar_grant_id",
                &self.calendar_grant_id.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(tz: &str, date: &str, time: &str) -> ContextFields {
        ContextFields {
            user_timezone: Some(tz.to_string()),
            current_date: Some(date.to_string()),
            current_time: Some(time.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn builds_timezone_aware_now() {
        let ctx = UserContext::from_fields(&fields("America/New_York", "2024-01-15", "14:30:00"))
            .unwrap();
        assert_eq!(ctx.now.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-15 14:30:00");
        assert_eq!(ctx.now.timestamp(), 1705347000);
    }

    #[test]
    fn rejects_unknown_timezone() {
        let err = UserContext::from_fields(&fields("Mars/Olympus", "2024-01-15", "14:30:00"))
            .unwrap_err();
        assert!(err.to_string().contains("unknown timezone"));
    }

    #[test]
    fn localizes_naive_iso_in_user_timezone() {
        let ctx = UserContext::from_fields(&fields("America/New_York", "2024-01-15", "14:30:00"))
            .unwrap();
        // 3pm Eastern on Jan 16 2024 == 20:00 UTC.
        let ts = ctx.naive_iso_to_unix("2024-01-16T15:00:00").unwrap();
        assert_eq!(ts, 1705435200);
    }

    #[test]
    fn credentials_redact_in_debug() {
        let creds = Credentials {
            task_api_key: Some("secret-token".into()),
            calendar_api_key: None,
            calendar_grant_id: Some("grant".into()),
        };
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(!rendered.contains("grant"));
    }
}
