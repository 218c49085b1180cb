//! Rule-based priority scoring.
//!
//! Runs without the LLM and short-circuits on the first match:
//! - VIP sender (substring of the sender address) → High
//! - Urgent keyword in subject or body preview → High
//! - User's own address among To/Cc recipients → Medium
//! - otherwise → Low
//!
//! Substring checks are case-insensitive; the recipient check is exact.

use tracing::debug;

use crate::config::MailConfig;
use crate::pipeline::types::{Message, Priority};

/// Which rule produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleMatch {
    VipSender,
    UrgentKeyword,
    AddressedToUser,
    NoMatch,
}

impl RuleMatch {
    pub fn priority(&self) -> Priority {
        match self {
            Self::VipSender | Self::UrgentKeyword => Priority::High,
            Self::AddressedToUser => Priority::Medium,
            Self::NoMatch => Priority::Low,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::VipSender => "vip_sender",
            Self::UrgentKeyword => "urgent_keyword",
            Self::AddressedToUser => "addressed_to_user",
            Self::NoMatch => "no_match",
        }
    }
}

/// Rules compiled from one effective configuration.
///
/// Needles are lowercased once so scoring a batch doesn't redo it per message.
pub struct RulesEngine {
    vip_senders: Vec<String>,
    urgent_keywords: Vec<String>,
    user_email: String,
}

impl RulesEngine {
    pub fn from_config(config: &MailConfig) -> Self {
        Self {
            vip_senders: lowercase_needles(&config.vip_senders),
            urgent_keywords: lowercase_needles(&config.urgent_keywords),
            user_email: config.user_email.clone(),
        }
    }

    /// Find the first rule that matches a message.
    pub fn evaluate(&self, message: &Message) -> RuleMatch {
        let sender = message.sender_address().unwrap_or("").to_lowercase();
        if self.vip_senders.iter().any(|vip| sender.contains(vip)) {
            return RuleMatch::VipSender;
        }

        let subject = message.subject.as_deref().unwrap_or("").to_lowercase();
        let body = message.body_preview.as_deref().unwrap_or("").to_lowercase();
        if self
            .urgent_keywords
            .iter()
            .any(|kw| subject.contains(kw) || body.contains(kw))
        {
            return RuleMatch::UrgentKeyword;
        }

        if !self.user_email.is_empty()
            && message
                .recipient_addresses()
                .any(|addr| addr == self.user_email)
        {
            return RuleMatch::AddressedToUser;
        }

        RuleMatch::NoMatch
    }

    pub fn score(&self, message: &Message) -> Priority {
        let matched = self.evaluate(message);
        debug!(id = %message.id, rule = matched.label(), "Rule score");
        matched.priority()
    }
}

/// Score one message against a configuration.
pub fn score_by_rules(message: &Message, config: &MailConfig) -> Priority {
    RulesEngine::from_config(config).score(message)
}

// Blank needles would match every message. Others are kept verbatim.
fn lowercase_needles(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.to_lowercase())
        .filter(|v| !v.trim().is_empty())
        .collect()
}
