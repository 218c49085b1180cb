//! Supabase backend — `ProfileStore` over the PostgREST HTTP API.
//!
//! Authenticates with the service-role key, so row-level security does not
//! apply. Keep the key server-side.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::config::{ConfigOverride, SupabaseSettings};
use crate::error::DatabaseError;
use crate::identity::UserIdentity;
use crate::store::traits::{PreferencesRow, ProfileStore};

#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

/// PostgREST client for the `profiles` and `preferences` tables.
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    service_key: SecretString,
}

impl SupabaseStore {
    pub fn new(settings: &SupabaseSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: settings.url.trim_end_matches('/').to_string(),
            service_key: settings.service_key.clone(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn request(&self, method: reqwest::Method, table: &str) -> reqwest::RequestBuilder {
        let key = self.service_key.expose_secret();
        self.client
            .request(method, self.table_url(table))
            .header("apikey", key)
            .bearer_auth(key)
    }

    /// Send a request and decode the JSON array PostgREST returns.
    async fn send_rows<T: DeserializeOwned>(
        &self,
        op: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<Vec<T>, DatabaseError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DatabaseError::Query(format!("{op}: HTTP {status}: {body}")));
        }

        resp.json()
            .await
            .map_err(|e| DatabaseError::Serialization(format!("{op}: {e}")))
    }
}

#[async_trait]
impl ProfileStore for SupabaseStore {
    fn backend_name(&self) -> &'static str {
        "supabase"
    }

    async fn ensure_profile(&self, identity: &UserIdentity) -> Result<String, DatabaseError> {
        let existing: Vec<IdRow> = self
            .send_rows(
                "ensure_profile select",
                self.request(reqwest::Method::GET, "profiles").query(&[
                    ("select", "id".to_string()),
                    ("microsoft_oid", format!("eq.{}", identity.oid)),
                ]),
            )
            .await?;
        if let Some(row) = existing.into_iter().next() {
            return Ok(row.id);
        }

        let inserted: Vec<IdRow> = self
            .send_rows(
                "ensure_profile insert",
                self.request(reqwest::Method::POST, "profiles")
                    .query(&[("select", "id")])
                    .header("Prefer", "return=representation")
                    .json(&json!({
                        "microsoft_oid": identity.oid,
                        "email": identity.email,
                        "display_name": identity.display_name(),
                    })),
            )
            .await?;

        let id = inserted
            .into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "profile".to_string(),
                id: identity.oid.clone(),
            })?;
        debug!(profile_id = %id, "Profile created");
        Ok(id)
    }

    async fn get_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<ConfigOverride>, DatabaseError> {
        let rows: Vec<PreferencesRow> = self
            .send_rows(
                "get_preferences",
                self.request(reqwest::Method::GET, "preferences").query(&[
                    ("select", "*".to_string()),
                    ("user_id", format!("eq.{user_id}")),
                ]),
            )
            .await?;
        Ok(rows.into_iter().next().map(PreferencesRow::into_override))
    }

    async fn upsert_preferences(
        &self,
        user_id: &str,
        prefs: &ConfigOverride,
    ) -> Result<(), DatabaseError> {
        let row = PreferencesRow::from_override(user_id, prefs);
        let _: Vec<PreferencesRow> = self
            .send_rows(
                "upsert_preferences",
                self.request(reqwest::Method::POST, "preferences")
                    .query(&[("on_conflict", "user_id")])
                    .header(
                        "Prefer",
                        "resolution=merge-duplicates,return=representation",
                    )
                    .json(&row),
            )
            .await?;
        debug!(user_id, "Preferences saved");
        Ok(())
    }
}
