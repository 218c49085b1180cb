//! Message scoring pipeline.
//!
//! Every fetched message flows through:
//! 1. `RulesEngine::score()` — VIP, keyword and addressee rules (no LLM)
//! 2. `Classifier::classify()` — optional AI summary and priority
//! 3. `merge()` — final priority is the higher of the two
//!
//! **AI never lowers a rule score.** A missing or failing classifier leaves
//! the rule priority untouched.

pub mod classifier;
pub mod priority;
pub mod processor;
pub mod rules;
pub mod types;

pub use classifier::{Classifier, LlmClassifier};
pub use processor::{MessageProcessor, filter_by_priority};
pub use rules::RulesEngine;
pub use types::{ClassificationResult, EmailItem, Message, Priority};
