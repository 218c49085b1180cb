//! `ProfileStore` trait — single async interface for per-user persistence.
//!
//! Two tables back it on every backend:
//! - `profiles`: one row per Microsoft account, keyed by `microsoft_oid`
//! - `preferences`: one row per profile holding the caller's config override

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigOverride, PromptOverrides};
use crate::error::DatabaseError;
use crate::identity::UserIdentity;

/// A `preferences` row, column for column.
///
/// Unset override fields are stored as NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencesRow {
    pub user_id: String,
    #[serde(default)]
    pub lookback_days: Option<i64>,
    #[serde(default)]
    pub batch_size: Option<i64>,
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub vip_senders: Option<Vec<String>>,
    #[serde(default)]
    pub urgent_keywords: Option<Vec<String>>,
    #[serde(default)]
    pub priority_high: Option<String>,
    #[serde(default)]
    pub priority_medium: Option<String>,
    #[serde(default)]
    pub priority_low: Option<String>,
}

impl PreferencesRow {
    pub fn from_override(user_id: &str, prefs: &ConfigOverride) -> Self {
        let prompts = prefs.priority_prompts.clone().unwrap_or_default();
        Self {
            user_id: user_id.to_string(),
            lookback_days: prefs.lookback_days.map(i64::from),
            batch_size: prefs.batch_size.map(i64::from),
            user_email: prefs.user_email.clone(),
            vip_senders: prefs.vip_senders.clone(),
            urgent_keywords: prefs.urgent_keywords.clone(),
            priority_high: prompts.high,
            priority_medium: prompts.medium,
            priority_low: prompts.low,
        }
    }

    /// Convert back to an override. Out-of-range numbers read as unset.
    pub fn into_override(self) -> ConfigOverride {
        let prompts = PromptOverrides {
            high: self.priority_high,
            medium: self.priority_medium,
            low: self.priority_low,
        };
        let has_prompts = prompts != PromptOverrides::default();
        ConfigOverride {
            lookback_days: self.lookback_days.and_then(|v| u32::try_from(v).ok()),
            batch_size: self.batch_size.and_then(|v| u32::try_from(v).ok()),
            user_email: self.user_email,
            vip_senders: self.vip_senders,
            urgent_keywords: self.urgent_keywords,
            priority_prompts: has_prompts.then_some(prompts),
        }
    }
}

/// Backend-agnostic persistence for profiles and preferences.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Short backend name, for logging.
    fn backend_name(&self) -> &'static str;

    /// Return the profile id for this identity, creating the profile if needed.
    async fn ensure_profile(&self, identity: &UserIdentity) -> Result<String, DatabaseError>;

    /// Read the stored override for a profile, if any.
    async fn get_preferences(&self, user_id: &str)
    -> Result<Option<ConfigOverride>, DatabaseError>;

    /// Insert or replace the stored override for a profile.
    async fn upsert_preferences(
        &self,
        user_id: &str,
        prefs: &ConfigOverride,
    ) -> Result<(), DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trip_keeps_set_fields() {
        let prefs = ConfigOverride {
            lookback_days: Some(0),
            vip_senders: Some(vec!["boss@x.com".into()]),
            priority_prompts: Some(PromptOverrides {
                high: Some("Only the CEO".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let row = PreferencesRow::from_override("u1", &prefs);
        assert_eq!(row.lookback_days, Some(0));
        assert_eq!(row.priority_high.as_deref(), Some("Only the CEO"));
        assert!(row.batch_size.is_none());
        assert_eq!(row.into_override(), prefs);
    }

    #[test]
    fn negative_numbers_read_as_unset() {
        let row = PreferencesRow {
            user_id: "u1".into(),
            lookback_days: Some(-3),
            batch_size: Some(10),
            ..Default::default()
        };
        let prefs = row.into_override();
        assert_eq!(prefs.lookback_days, None);
        assert_eq!(prefs.batch_size, Some(10));
        assert!(prefs.priority_prompts.is_none());
    }

    #[test]
    fn postgrest_row_with_missing_columns() {
        let row: PreferencesRow =
            serde_json::from_str(r#"{"user_id": "u1", "vip_senders": ["a@x.com"]}"#).unwrap();
        assert_eq!(row.vip_senders, Some(vec!["a@x.com".to_string()]));
        assert!(row.urgent_keywords.is_none());
    }
}
