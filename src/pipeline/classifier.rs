//! AI classification of a single message.
//!
//! Builds a tight prompt from the message and the configured priority
//! definitions, calls the LLM, and validates the JSON reply field by field.
//! Missing or malformed fields are backfilled; an unparseable reply is an
//! error the orchestrator turns into a fallback result.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::PriorityPrompts;
use crate::error::ClassificationError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{ClassificationResult, Message, Priority};

/// Max tokens for the classification call.
const CLASSIFY_MAX_TOKENS: u32 = 400;

/// Temperature for classification (deterministic-ish).
const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// Body preview characters sent to the model.
const BODY_PREVIEW_CHARS: usize = 1000;

/// Something that can classify a message.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        message: &Message,
        prompts: &PriorityPrompts,
    ) -> Result<ClassificationResult, ClassificationError>;
}

/// LLM-backed classifier.
pub struct LlmClassifier {
    llm: Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(
        &self,
        message: &Message,
        prompts: &PriorityPrompts,
    ) -> Result<ClassificationResult, ClassificationError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt(prompts)),
            ChatMessage::user(build_user_prompt(message)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        parse_classifier_reply(&response.content)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

/// Build the classification system prompt.
pub fn build_system_prompt(prompts: &PriorityPrompts) -> String {
    format!(
        "You are an assistant that classifies corporate email. \
         Respond with ONLY a JSON object:\n\
         {{\"priority\": \"high|medium|low\", \"summary\": \"...\", \"actionNeeded\": true, \
         \"suggestedAction\": \"...\", \"implicitDeadline\": \"...\" or null}}\n\n\
         Fields:\n\
         - priority: high, medium or low\n\
         - summary: 2-3 sentences\n\
         - actionNeeded: whether the user has to do something\n\
         - suggestedAction: short phrase (reply, approve, schedule, delegate)\n\
         - implicitDeadline: short text (today, tomorrow, a date) or null\n\n\
         Priority definitions:\n\
         - {}\n\
         - {}\n\
         - {}",
        prompts.high, prompts.medium, prompts.low
    )
}

/// Build the user prompt from a message.
pub fn build_user_prompt(message: &Message) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str(&format!(
        "From: {}\n",
        message.sender_address().unwrap_or("unknown")
    ));
    prompt.push_str(&format!(
        "Subject: {}\n",
        message
            .subject
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("(no subject)")
    ));

    let body: String = message
        .body_preview
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(BODY_PREVIEW_CHARS)
        .collect();
    prompt.push_str(&format!("Body (preview): {}\n", body));

    match message.received_date_time {
        Some(received) => prompt.push_str(&format!("Received: {}", received.to_rfc3339())),
        None => prompt.push_str("Received: unknown"),
    }

    prompt
}

// ── Reply parsing ───────────────────────────────────────────────────

/// Parse a classifier reply into a `ClassificationResult`.
///
/// Accepts camelCase or snake_case keys. Each field is taken only when it
/// has the expected shape; otherwise the backfill value is used.
pub fn parse_classifier_reply(raw: &str) -> Result<ClassificationResult, ClassificationError> {
    let json_str = extract_json_object(raw);
    let value: Value = serde_json::from_str(&json_str)
        .map_err(|e| ClassificationError::Parse(format!("JSON parse error: {e}")))?;
    let Value::Object(fields) = value else {
        return Err(ClassificationError::Parse(
            "reply is not a JSON object".to_string(),
        ));
    };

    let text = |keys: &[&str]| -> Option<String> {
        keys.iter()
            .find_map(|k| fields.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    let flag = |keys: &[&str]| -> Option<bool> {
        keys.iter().find_map(|k| match fields.get(*k)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        })
    };

    let defaults = ClassificationResult::backfill();
    Ok(ClassificationResult {
        priority: text(&["priority"])
            .map(|p| Priority::normalize(Some(p.as_str())))
            .unwrap_or(defaults.priority),
        summary: text(&["summary"]).unwrap_or(defaults.summary),
        action_needed: flag(&["actionNeeded", "action_needed"]).unwrap_or(defaults.action_needed),
        suggested_action: text(&["suggestedAction", "suggested_action"])
            .unwrap_or(defaults.suggested_action),
        implicit_deadline: text(&["implicitDeadline", "implicit_deadline"])
            .or(defaults.implicit_deadline),
    })
}

/// Pull a JSON object out of a reply that may be wrapped in markdown or prose.
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::config::MailConfig;
    use crate::error::LlmError;
    use crate::llm::provider::CompletionResponse;
    use crate::pipeline::types::{NO_ACTION_SUGGESTED, Recipient, UNAVAILABLE_SUMMARY};

    struct CannedLlm(String);

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            assert!(request.system_prompt().unwrap().contains("Priority definitions"));
            Ok(CompletionResponse {
                content: self.0.clone(),
            })
        }
    }

    fn message() -> Message {
        Message {
            id: "m1".into(),
            from: Some(Recipient::new("client@acme.com", Some("Client"))),
            subject: Some("Contract renewal".into()),
            body_preview: Some("Please approve the attached contract by Friday.".into()),
            received_date_time: Some(Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()),
            ..Default::default()
        }
    }

    // ── Prompt construction tests ───────────────────────────────────

    #[test]
    fn system_prompt_includes_priority_definitions() {
        let prompts = MailConfig::default().priority_prompts;
        let prompt = build_system_prompt(&prompts);
        assert!(prompt.contains(&prompts.high));
        assert!(prompt.contains(&prompts.medium));
        assert!(prompt.contains(&prompts.low));
        assert!(prompt.contains("JSON"));
    }

    #[test]
    fn user_prompt_includes_message_fields() {
        let prompt = build_user_prompt(&message());
        assert!(prompt.contains("From: client@acme.com"));
        assert!(prompt.contains("Subject: Contract renewal"));
        assert!(prompt.contains("approve the attached contract"));
        assert!(prompt.contains("2026-10-18T09:30:00"));
    }

    #[test]
    fn user_prompt_handles_missing_fields() {
        let prompt = build_user_prompt(&Message {
            id: "empty".into(),
            ..Default::default()
        });
        assert!(prompt.contains("From: unknown"));
        assert!(prompt.contains("Subject: (no subject)"));
        assert!(prompt.contains("Received: unknown"));
    }

    #[test]
    fn user_prompt_truncates_long_body() {
        let mut msg = message();
        msg.body_preview = Some("x".repeat(5000));
        let prompt = build_user_prompt(&msg);
        assert!(prompt.len() < 1500);
    }

    // ── Reply parsing tests ─────────────────────────────────────────

    #[test]
    fn parses_full_reply() {
        let raw = r#"{"priority": "high", "summary": "Client asks for contract approval.",
            "actionNeeded": true, "suggestedAction": "Approve", "implicitDeadline": "Friday"}"#;
        let result = parse_classifier_reply(raw).unwrap();
        assert_eq!(result.priority, Priority::High);
        assert_eq!(result.summary, "Client asks for contract approval.");
        assert!(result.action_needed);
        assert_eq!(result.suggested_action, "Approve");
        assert_eq!(result.implicit_deadline.as_deref(), Some("Friday"));
    }

    #[test]
    fn backfills_missing_fields() {
        let result = parse_classifier_reply(r#"{"summary": "FYI only"}"#).unwrap();
        assert_eq!(result.priority, Priority::Medium);
        assert_eq!(result.summary, "FYI only");
        assert!(!result.action_needed);
        assert_eq!(result.suggested_action, NO_ACTION_SUGGESTED);
        assert!(result.implicit_deadline.is_none());

        let empty = parse_classifier_reply("{}").unwrap();
        assert_eq!(empty.summary, UNAVAILABLE_SUMMARY);
    }

    #[test]
    fn wrong_shapes_fall_back_per_field() {
        let raw = r#"{"priority": 3, "summary": "", "actionNeeded": "yes",
            "suggestedAction": null, "implicitDeadline": false}"#;
        let result = parse_classifier_reply(raw).unwrap();
        assert_eq!(result.priority, Priority::Medium);
        assert_eq!(result.summary, UNAVAILABLE_SUMMARY);
        assert!(result.action_needed);
        assert_eq!(result.suggested_action, NO_ACTION_SUGGESTED);
        assert!(result.implicit_deadline.is_none());
    }

    #[test]
    fn accepts_portuguese_priority_and_snake_case() {
        let raw = r#"{"priority": "Alta", "action_needed": true, "suggested_action": "Responder"}"#;
        let result = parse_classifier_reply(raw).unwrap();
        assert_eq!(result.priority, Priority::High);
        assert!(result.action_needed);
        assert_eq!(result.suggested_action, "Responder");
    }

    #[test]
    fn parses_markdown_wrapped_reply() {
        let raw = "Here you go:\n```json\n{\"priority\": \"low\", \"summary\": \"Newsletter\"}\n```";
        let result = parse_classifier_reply(raw).unwrap();
        assert_eq!(result.priority, Priority::Low);
        assert_eq!(result.summary, "Newsletter");
    }

    #[test]
    fn parses_reply_with_surrounding_prose() {
        let raw = "Sure! {\"priority\": \"medium\"} Hope that helps.";
        assert_eq!(parse_classifier_reply(raw).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn rejects_non_json_reply() {
        assert!(matches!(
            parse_classifier_reply("I cannot classify this email."),
            Err(ClassificationError::Parse(_))
        ));
        assert!(matches!(
            parse_classifier_reply("[1, 2, 3]"),
            Err(ClassificationError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn llm_classifier_uses_reply() {
        let llm = Arc::new(CannedLlm(
            r#"{"priority": "high", "summary": "Approve the contract."}"#.into(),
        ));
        let classifier = LlmClassifier::new(llm);
        let prompts = MailConfig::default().priority_prompts;
        let result = classifier.classify(&message(), &prompts).await.unwrap();
        assert_eq!(result.priority, Priority::High);
        assert_eq!(result.summary, "Approve the contract.");
    }
}
