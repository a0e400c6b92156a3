use once_cell::sync::Lazy;
use regex::Regex;

/// Token shapes that must never reach the logs: bearer headers, provider API
/// keys, and long opaque secrets.
static SECRET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)bearer\s+[A-Za-z0-9._\-]+").unwrap(),
        Regex::new(r"(?i)(api[_-]?key|token|secret)\s*[:=]\s*\S+").unwrap(),
        Regex::new(r"\b(sk|rk|nyk|reclm)[-_][A-Za-z0-9]{16,}\b").unwrap(),
        Regex::new(r"\b[A-Za-z0-9]{40,}\b").unwrap(),
    ]
});

const MAX_LOGGED_CHARS: usize = 500;

/// Scrub secret-shaped substrings from text bound for the logs and cap the
/// length. Queries are user content, not credentials, but pasted keys do
/// happen.
pub fn redact_sensitive_data(text: &str) -> String {
    let mut scrubbed = text.to_string();
    for pattern in SECRET_PATTERNS.iter() {
        scrubbed = pattern.replace_all(&scrubbed, "[REDACTED]").into_owned();
    }
    if scrubbed.chars().count() > MAX_LOGGED_CHARS {
        let truncated: String = scrubbed.chars().take(MAX_LOGGED_CHARS).collect();
        format!("{truncated}…")
    } else {
        scrubbed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_bearer_tokens() {
        let out = redact_sensitive_data("header was Bearer abc.def-123");
        assert!(!out.contains("abc.def-123"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn masks_key_value_secrets() {
        let out = redact_sensitive_data("api_key=reclm_supersecretvalue please");
        assert!(!out.contains("supersecretvalue"));
    }

    #[test]
    fn leaves_ordinary_queries_alone() {
        let query = "Schedule team standup tomorrow at 10am";
        assert_eq!(redact_sensitive_data(query), query);
    }

    #[test]
    fn caps_length() {
        let long = "a ".repeat(600);
        let out = redact_sensitive_data(&long);
        assert!(out.chars().count() <= MAX_LOGGED_CHARS + 1);
    }
}
