//! Message processor: scores, classifies and ranks a fetched batch.
//!
//! Flow per message:
//! 1. Rules engine (fast, no LLM) → rule priority
//! 2. AI classifier → summary, action, AI priority (falls back on error)
//! 3. Merge → final priority, shaped into an `EmailItem`
//!
//! Classification runs concurrently for the whole batch. One message's
//! classifier failure never affects another's, and output order always
//! matches input order.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::MailConfig;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::priority::merge;
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{ClassificationResult, EmailItem, Message};

/// Scores and classifies fetched messages.
#[derive(Clone)]
pub struct MessageProcessor {
    classifier: Option<Arc<dyn Classifier>>,
}

impl MessageProcessor {
    /// Create a processor. `None` means no classifier is configured and every
    /// message gets the static "AI not available" result.
    pub fn new(classifier: Option<Arc<dyn Classifier>>) -> Self {
        Self { classifier }
    }

    /// Process one message: rule score, classification, merge.
    pub async fn process(
        &self,
        rules: &RulesEngine,
        message: &Message,
        config: &MailConfig,
    ) -> EmailItem {
        let rule_priority = rules.score(message);
        let classification = self.classify(message, config).await;
        let priority = merge(rule_priority, classification.priority);

        debug!(
            id = %message.id,
            rule = %rule_priority,
            ai = %classification.priority,
            merged = %priority,
            "Message ranked"
        );

        EmailItem::from_parts(message, classification, priority)
    }

    /// Process a batch concurrently and wait for every message.
    pub async fn process_batch(&self, messages: &[Message], config: &MailConfig) -> Vec<EmailItem> {
        let count = messages.len();
        info!(count, "Processing message batch");

        let rules = RulesEngine::from_config(config);
        let items = join_all(
            messages
                .iter()
                .map(|message| self.process(&rules, message, config)),
        )
        .await;

        info!(processed = items.len(), "Batch processing complete");
        items
    }

    /// Classify one message, degrading to a static result on any failure.
    async fn classify(&self, message: &Message, config: &MailConfig) -> ClassificationResult {
        let Some(classifier) = &self.classifier else {
            return ClassificationResult::unavailable();
        };

        match classifier.classify(message, &config.priority_prompts).await {
            Ok(result) => result,
            Err(e) => {
                warn!(id = %message.id, error = %e, "AI classification failed, using fallback");
                ClassificationResult::failed()
            }
        }
    }
}

/// Keep only items whose merged priority equals `target` (case-insensitive).
///
/// An unrecognised target matches nothing.
pub fn filter_by_priority(items: Vec<EmailItem>, target: Option<&str>) -> Vec<EmailItem> {
    let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) else {
        return items;
    };
    items
        .into_iter()
        .filter(|item| item.priority.as_str().eq_ignore_ascii_case(target))
        .collect()
}
