//! Per-user preferences: bearer token → profile → stored config override.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::ConfigOverride;
use crate::error::PreferenceError;
use crate::identity::{UserIdentity, identity_from_token};
use crate::store::ProfileStore;

/// A caller's stored preferences, as loaded for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPreferences {
    pub user_id: String,
    pub identity: UserIdentity,
    /// The stored override, empty when nothing was saved yet.
    pub stored: ConfigOverride,
}

impl UserPreferences {
    /// The layer placed between defaults and the request override.
    ///
    /// The identity's email stands in for `userEmail` until one is saved.
    pub fn persisted_layer(&self) -> ConfigOverride {
        ConfigOverride::user_email(self.identity.email.clone()).merge(&self.stored)
    }
}

/// Loads and saves preferences through a `ProfileStore`.
#[derive(Clone)]
pub struct PreferenceService {
    store: Arc<dyn ProfileStore>,
}

impl PreferenceService {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Resolve the caller and read their stored override, creating the
    /// profile on first contact.
    pub async fn load_for_user(&self, token: &str) -> Result<UserPreferences, PreferenceError> {
        let identity = identity_from_token(token)?;
        let user_id = self.store.ensure_profile(&identity).await?;
        let stored = self
            .store
            .get_preferences(&user_id)
            .await?
            .unwrap_or_default();

        debug!(
            user_id = %user_id,
            backend = self.store.backend_name(),
            has_stored = !stored.is_empty(),
            "Loaded user preferences"
        );
        Ok(UserPreferences {
            user_id,
            identity,
            stored,
        })
    }

    /// Merge `incoming` into the caller's stored override and persist it.
    ///
    /// Fields `incoming` leaves unset or empty keep their stored value.
    pub async fn save_for_user(
        &self,
        token: &str,
        incoming: &ConfigOverride,
    ) -> Result<UserPreferences, PreferenceError> {
        let current = self.load_for_user(token).await?;
        let merged = current.stored.merge(incoming);
        self.store
            .upsert_preferences(&current.user_id, &merged)
            .await?;

        info!(user_id = %current.user_id, "User preferences updated");
        Ok(UserPreferences {
            stored: merged,
            ..current
        })
    }
}
