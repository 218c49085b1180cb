//! Priority merging.
//!
//! The merged priority is the maximum of the rule score and the AI label,
//! so neither side can lower what the other decided.

use crate::pipeline::types::Priority;

/// Merge two free-form labels after normalizing each.
pub fn merge_priority(rule: Option<&str>, ai: Option<&str>) -> Priority {
    merge(Priority::normalize(rule), Priority::normalize(ai))
}

/// Merge two already-typed priorities.
pub fn merge(rule: Priority, ai: Priority) -> Priority {
    rule.max(ai)
}
