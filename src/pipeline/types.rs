//! Shared types for the mail ranking pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Fetched message ─────────────────────────────────────────────────

/// Address block as returned by the mail API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// Sender or recipient wrapper (`{"emailAddress": {...}}`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default)]
    pub email_address: Option<EmailAddress>,
}

impl Recipient {
    pub fn new(address: &str, name: Option<&str>) -> Self {
        Self {
            email_address: Some(EmailAddress {
                name: name.map(String::from),
                address: Some(address.to_string()),
            }),
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.email_address.as_ref()?.address.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.email_address.as_ref()?.name.as_deref()
    }
}

/// A message fetched from the mail API.
///
/// Only `id` is required on the wire; everything else defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub from: Option<Recipient>,
    #[serde(default)]
    pub to_recipients: Vec<Recipient>,
    #[serde(default)]
    pub cc_recipients: Vec<Recipient>,
    #[serde(default)]
    pub body_preview: Option<String>,
    #[serde(default)]
    pub received_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub importance: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub web_link: Option<String>,
}

impl Message {
    pub fn sender_address(&self) -> Option<&str> {
        self.from.as_ref()?.address()
    }

    pub fn sender_name(&self) -> Option<&str> {
        self.from.as_ref()?.name()
    }

    /// All To and Cc recipient addresses.
    pub fn recipient_addresses(&self) -> impl Iterator<Item = &str> {
        self.to_recipients
            .iter()
            .chain(self.cc_recipients.iter())
            .filter_map(Recipient::address)
    }
}

// ── Priority ────────────────────────────────────────────────────────

/// Message priority. Ordered `Low < Medium < High`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    /// Normalize a free-form label. Accepts English and Portuguese labels
    /// case-insensitively; anything unrecognised (or absent) is `Low`.
    pub fn normalize(label: Option<&str>) -> Self {
        match label.map(|l| l.trim().to_lowercase()).as_deref() {
            Some("high" | "alta") => Self::High,
            Some("medium" | "media" | "média") => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Classification ──────────────────────────────────────────────────

/// The AI classifier's verdict on one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub priority: Priority,
    pub summary: String,
    pub action_needed: bool,
    pub suggested_action: String,
    pub implicit_deadline: Option<String>,
}

/// Summary used when no classifier is configured, and for any field the
/// classifier leaves out.
pub const UNAVAILABLE_SUMMARY: &str =
    "AI not available (set OPENAI_API_KEY to enable summaries).";

/// Summary used when a classifier call fails.
pub const FAILED_SUMMARY: &str = "AI summary generation failed.";

pub const NO_ACTION_SUGGESTED: &str = "No action suggested.";

impl ClassificationResult {
    /// Backfill values for fields missing from a classifier reply.
    pub fn backfill() -> Self {
        Self {
            priority: Priority::Medium,
            summary: UNAVAILABLE_SUMMARY.to_string(),
            action_needed: false,
            suggested_action: NO_ACTION_SUGGESTED.to_string(),
            implicit_deadline: None,
        }
    }

    /// Result when no classifier is configured.
    ///
    /// Carries `Low` so the merged priority is the rule score alone.
    pub fn unavailable() -> Self {
        Self {
            priority: Priority::Low,
            ..Self::backfill()
        }
    }

    /// Result when the classifier call or reply parsing failed.
    ///
    /// Carries `Medium`, so a failed call never leaves a message ranked `Low`.
    pub fn failed() -> Self {
        Self {
            summary: FAILED_SUMMARY.to_string(),
            ..Self::backfill()
        }
    }
}

// ── Output record ───────────────────────────────────────────────────

pub const UNKNOWN_SENDER: &str = "Unknown";
pub const DEFAULT_SENDER_NAME: &str = "Sender";
pub const NO_SUBJECT: &str = "(No subject)";

/// One ranked message as returned by `GET /api/emails`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailItem {
    pub id: String,
    pub from: String,
    pub sender_name: String,
    pub subject: String,
    pub received_date_time: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub summary: String,
    pub action_needed: bool,
    pub suggested_action: String,
    pub implicit_deadline: Option<String>,
    pub categories: Vec<String>,
    pub is_read: Option<bool>,
    pub web_link: Option<String>,
}

impl EmailItem {
    /// Shape the output record from a message, its classification, and the
    /// merged priority.
    pub fn from_parts(
        message: &Message,
        classification: ClassificationResult,
        priority: Priority,
    ) -> Self {
        let address = message.sender_address().filter(|s| !s.is_empty());
        let name = message.sender_name().filter(|s| !s.is_empty());

        Self {
            id: message.id.clone(),
            from: address.or(name).unwrap_or(UNKNOWN_SENDER).to_string(),
            sender_name: name.or(address).unwrap_or(DEFAULT_SENDER_NAME).to_string(),
            subject: message
                .subject
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(NO_SUBJECT)
                .to_string(),
            received_date_time: message.received_date_time,
            priority,
            summary: classification.summary,
            action_needed: classification.action_needed,
            suggested_action: classification.suggested_action,
            implicit_deadline: classification.implicit_deadline,
            categories: message.categories.clone(),
            is_read: message.is_read,
            web_link: message.web_link.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert_eq!(Priority::default(), Priority::Low);
    }

    #[test]
    fn priority_normalizes_labels() {
        assert_eq!(Priority::normalize(Some("ALTA")), Priority::High);
        assert_eq!(Priority::normalize(Some(" high ")), Priority::High);
        assert_eq!(Priority::normalize(Some("Média")), Priority::Medium);
        assert_eq!(Priority::normalize(Some("media")), Priority::Medium);
        assert_eq!(Priority::normalize(Some("urgent")), Priority::Low);
        assert_eq!(Priority::normalize(None), Priority::Low);
    }

    #[test]
    fn priority_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Priority::High).unwrap(), "high");
        assert_eq!(Priority::Medium.to_string(), "medium");
    }

    #[test]
    fn message_deserializes_graph_payload() {
        let json = r#"{
            "id": "AAMk-1",
            "subject": "Contrato",
            "from": {"emailAddress": {"name": "Chefe", "address": "chefe@empresa.com"}},
            "toRecipients": [{"emailAddress": {"address": "me@empresa.com"}}],
            "bodyPreview": "Segue o contrato",
            "receivedDateTime": "2026-10-18T09:30:00Z",
            "isRead": false,
            "categories": ["Blue category"],
            "webLink": "https://outlook.office365.com/owa/?ItemID=1"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender_address(), Some("chefe@empresa.com"));
        assert_eq!(msg.sender_name(), Some("Chefe"));
        assert_eq!(msg.recipient_addresses().collect::<Vec<_>>(), vec!["me@empresa.com"]);
        assert!(msg.cc_recipients.is_empty());
        assert_eq!(msg.is_read, Some(false));
        assert!(msg.received_date_time.is_some());
    }

    #[test]
    fn message_tolerates_missing_fields() {
        let msg: Message = serde_json::from_str(r#"{"id": "x", "from": null}"#).unwrap();
        assert_eq!(msg.sender_address(), None);
        assert!(msg.subject.is_none());
        assert!(msg.categories.is_empty());
    }

    #[test]
    fn item_display_fallbacks() {
        let anonymous = Message {
            id: "1".into(),
            ..Default::default()
        };
        let item = EmailItem::from_parts(
            &anonymous,
            ClassificationResult::unavailable(),
            Priority::Low,
        );
        assert_eq!(item.from, UNKNOWN_SENDER);
        assert_eq!(item.sender_name, DEFAULT_SENDER_NAME);
        assert_eq!(item.subject, NO_SUBJECT);

        let name_only = Message {
            id: "2".into(),
            from: Some(Recipient {
                email_address: Some(EmailAddress {
                    name: Some("Alice".into()),
                    address: None,
                }),
            }),
            ..Default::default()
        };
        let item = EmailItem::from_parts(
            &name_only,
            ClassificationResult::unavailable(),
            Priority::Low,
        );
        assert_eq!(item.from, "Alice");
        assert_eq!(item.sender_name, "Alice");

        let address_only = Message {
            id: "3".into(),
            from: Some(Recipient::new("bob@x.com", None)),
            subject: Some("Hi".into()),
            ..Default::default()
        };
        let item = EmailItem::from_parts(
            &address_only,
            ClassificationResult::unavailable(),
            Priority::Low,
        );
        assert_eq!(item.from, "bob@x.com");
        assert_eq!(item.sender_name, "bob@x.com");
        assert_eq!(item.subject, "Hi");
    }

    #[test]
    fn item_serializes_camel_case() {
        let msg = Message {
            id: "1".into(),
            ..Default::default()
        };
        let item = EmailItem::from_parts(&msg, ClassificationResult::backfill(), Priority::Medium);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["priority"], "medium");
        assert_eq!(json["actionNeeded"], false);
        assert_eq!(json["suggestedAction"], NO_ACTION_SUGGESTED);
        assert!(json["implicitDeadline"].is_null());
        assert!(json.get("senderName").is_some());
    }

    #[test]
    fn fallback_results() {
        assert_eq!(ClassificationResult::backfill().priority, Priority::Medium);
        assert_eq!(ClassificationResult::unavailable().priority, Priority::Low);
        assert_eq!(ClassificationResult::unavailable().summary, UNAVAILABLE_SUMMARY);
        assert_eq!(ClassificationResult::failed().summary, FAILED_SUMMARY);
        assert_eq!(ClassificationResult::failed().priority, Priority::Medium);
        assert!(!ClassificationResult::failed().action_needed);
    }
}
