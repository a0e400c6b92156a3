use axum::http::HeaderMap;
use serde_json::Value as JsonValue;

use crate::config::ProviderConfig;
use crate::models::context::Credentials;

/// Map the A2A `user_context.credentials` object onto provider credentials.
/// The calendar API key is server-side configuration; callers supply the
/// grant.
pub fn from_user_context(user_context: &JsonValue, providers: &ProviderConfig) -> Credentials {
    let creds = user_context.get("credentials").cloned().unwrap_or_default();
    let get = |key: &str| {
        creds
            .get(key)
            .and_then(|v| v.as_str())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    Credentials {
        task_api_key: get("RECLAIM_API_KEY"),
        calendar_api_key: get("NYLAS_API_KEY").or_else(|| providers.calendar_api_key.clone()),
        calendar_grant_id: get("NYLAS_GRANT_ID").or_else(|| get("EMAIL_ACCOUNT_GRANT")),
    }
}

/// Legacy header extraction: `X-User-Credential-{NAME}` in any case, with
/// hyphen or underscore separators, plus the oldest `X-Reclaim-Key` style
/// fallbacks.
pub fn from_headers(headers: &HeaderMap, providers: &ProviderConfig) -> Credentials {
    let lookup = |name: &str| -> Option<String> {
        let underscored = format!("x-user-credential-{name}");
        let hyphenated = format!("x-user-credential-{}", name.replace('_', "-"));
        headers
            .get(underscored.as_str())
            .or_else(|| headers.get(hyphenated.as_str()))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    let legacy = |name: &str| -> Option<String> {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    Credentials {
        task_api_key: lookup("reclaim_api_key").or_else(|| legacy("x-reclaim-key")),
        calendar_api_key: lookup("nylas_api_key")
            .or_else(|| legacy("x-nylas-key"))
            .or_else(|| providers.calendar_api_key.clone()),
        calendar_grant_id: lookup("nylas_grant_id").or_else(|| legacy("x-nylas-grant")),
    }
}

/// Merge user-context injections into tool arguments without clobbering
/// anything the caller set explicitly.
pub fn merge_context_with_arguments(
    arguments: &JsonValue,
    user_context: &JsonValue,
) -> JsonValue {
    let mut merged = arguments.clone();
    if !merged.is_object() {
        merged = JsonValue::Object(Default::default());
    }
    let map = merged.as_object_mut().expect("object ensured above");

    let inject = |map: &mut serde_json::Map<String, JsonValue>, key: &str, source: &str| {
        if !map.contains_key(key) {
            if let Some(value) = user_context.get(source).and_then(|v| v.as_str()) {
                map.insert(key.to_string(), JsonValue::String(value.to_string()));
            }
        }
    };

    inject(map, "user_timezone", "timezone");
    inject(map, "current_date", "current_date");
    inject(map, "current_time", "current_time");
    inject(map, "user_name", "user_name");
    inject(map, "user_email", "user_email");

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider_config() -> ProviderConfig {
        ProviderConfig {
            task_base_url: "http://tasks".into(),
            calendar_base_url: "http://calendar".into(),
            calendar_api_key: Some("server-side-key".into()),
            http_timeout: std::time::Duration::from_secs(60),
        }
    }

    #[test]
    fn user_context_credentials_map_to_providers() {
        let ctx = json!({
            "credentials": {
                "RECLAIM_API_KEY": "reclaim-token",
                "NYLAS_GRANT_ID": "grant-1"
            }
        });
        let creds = from_user_context(&ctx, &provider_config());
        assert_eq!(creds.task_api_key.as_deref(), Some("reclaim-token"));
        assert_eq!(creds.calendar_api_key.as_deref(), Some("server-side-key"));
        assert_eq!(creds.calendar_grant_id.as_deref(), Some("grant-1"));
        assert!(creds.setup_complete());
    }

    #[test]
    fn email_account_grant_is_accepted() {
        let ctx = json!({
            "credentials": {"EMAIL_ACCOUNT_GRANT": "grant-2"}
        });
        let creds = from_user_context(&ctx, &provider_config());
        assert_eq!(creds.calendar_grant_id.as_deref(), Some("grant-2"));
    }

    #[test]
    fn header_extraction_handles_case_and_separators() {
        let mut headers = HeaderMap::new();
        headers.insert("X-User-Credential-RECLAIM_API_KEY", "tok".parse().unwrap());
        headers.insert("x-user-credential-nylas-grant-id", "grant".parse().unwrap());
        let creds = from_headers(&headers, &provider_config());
        assert_eq!(creds.task_api_key.as_deref(), Some("tok"));
        assert_eq!(creds.calendar_grant_id.as_deref(), Some("grant"));
    }

    #[test]
    fn legacy_headers_still_work() {
        let mut headers = HeaderMap::new();
        headers.insert("x-reclaim-key", "old-tok".parse().unwrap());
        headers.insert("x-nylas-grant", "old-grant".parse().unwrap());
        let creds = from_headers(&headers, &provider_config());
        assert_eq!(creds.task_api_key.as_deref(), Some("old-tok"));
        assert_eq!(creds.calendar_grant_id.as_deref(), Some("old-grant"));
    }

    #[test]
    fn context_merge_does_not_clobber() {
        let args = json!({"query": "q", "user_timezone": "Europe/Paris"});
        let ctx = json!({"timezone": "America/New_York", "current_date": "2024-01-15"});
        let merged = merge_context_with_arguments(&args, &ctx);
        assert_eq!(merged["user_timezone"], "Europe/Paris");
        assert_eq!(merged["current_date"], "2024-01-15");
    }
}
