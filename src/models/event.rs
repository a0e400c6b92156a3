use serde::{Deserialize, Serialize};

/// Calendar provider wire representation of an event. Times are Unix seconds
/// with the user's IANA timezone carried alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    pub when: EventWhen,
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub busy: Option<bool>,
}

fn default_status() -> String {
    "confirmed".to_string()
}

impl EventRecord {
    pub fn is_cancelled(&self) -> bool {
        self.status == "cancelled"
    }

    pub fn title_str(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled event")
    }

    pub fn end_or_default(&self) -> i64 {
        self.when.end_time.unwrap_or(self.when.start_time + 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventWhen {
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Participant {
    /// Participants supplied as bare names get a synthetic address; the
    /// provider requires an email per attendee.
    pub fn from_name(name: &str) -> Self {
        let email = format!("{}@example.com", name.trim().replace(' ', ".").to_lowercase());
        Self {
            email,
            name: Some(name.to_string()),
            status: Some("noreply".to_string()),
        }
    }
}

/// Body for event creation.
#[derive(Debug, Clone, Serialize)]
pub struct EventCreateBody {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub when: EventWhen,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub busy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<EventReminders>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventReminders {
    pub use_default: bool,
    pub overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReminderOverride {
    pub reminder_minutes: u32,
    pub reminder_method: String,
}

impl EventReminders {
    pub fn from_minutes(minutes: &[u32]) -> Self {
        Self {
            use_default: false,
            overrides: minutes
                .iter()
                .map(|m| ReminderOverride {
                    reminder_minutes: *m,
                    reminder_method: "email".to_string(),
                })
                .collect(),
        }
    }
}

/// Partial event update; only provided fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub when: Option<EventWhen>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<Participant>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_email_is_dotted_lowercase() {
        let p = Participant::from_name("Sarah Connor");
        assert_eq!(p.email, "sarah.connor@example.com");
        assert_eq!(p.status.as_deref(), Some("noreply"));
    }

    #[test]
    fn missing_end_defaults_to_one_hour() {
        let event: EventRecord = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "title": "Standup",
            "when": {"start_time": 1_705_435_200}
        }))
        .unwrap();
        assert_eq!(event.end_or_default(), 1_705_435_200 + 3600);
        assert!(!event.is_cancelled());
    }
}
