//! libSQL backend — local `ProfileStore` implementation.
//!
//! Supports local file and in-memory databases. List columns are stored as
//! JSON text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ConfigOverride;
use crate::error::DatabaseError;
use crate::identity::UserIdentity;
use crate::store::migrations;
use crate::store::traits::{PreferencesRow, ProfileStore};

const PREFERENCE_COLUMNS: &str = "user_id, lookback_days, batch_size, user_email, vip_senders, \
     urgent_keywords, priority_high, priority_medium, priority_low";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    /// Get the connection.
    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn find_profile_id(&self, oid: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id FROM profiles WHERE microsoft_oid = ?1",
                params![oid],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_profile_id: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<String>(0)
                .map(Some)
                .map_err(|e| DatabaseError::Query(format!("find_profile_id row parse: {e}"))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_profile_id: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn list_to_json(list: &Option<Vec<String>>) -> Result<Option<String>, DatabaseError> {
    list.as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn json_to_list(raw: Option<String>) -> Result<Option<Vec<String>>, DatabaseError> {
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DatabaseError::Serialization(format!("stored list column: {e}")))
}

fn row_to_preferences(row: &Row) -> Result<PreferencesRow, DatabaseError> {
    let user_id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("preferences row parse: {e}")))?;
    Ok(PreferencesRow {
        user_id,
        lookback_days: row.get::<i64>(1).ok(),
        batch_size: row.get::<i64>(2).ok(),
        user_email: row.get::<String>(3).ok(),
        vip_senders: json_to_list(row.get::<String>(4).ok())?,
        urgent_keywords: json_to_list(row.get::<String>(5).ok())?,
        priority_high: row.get::<String>(6).ok(),
        priority_medium: row.get::<String>(7).ok(),
        priority_low: row.get::<String>(8).ok(),
    })
}

#[async_trait]
impl ProfileStore for LibSqlBackend {
    fn backend_name(&self) -> &'static str {
        "libsql"
    }

    async fn ensure_profile(&self, identity: &UserIdentity) -> Result<String, DatabaseError> {
        if let Some(id) = self.find_profile_id(&identity.oid).await? {
            return Ok(id);
        }

        // A concurrent first request may insert the same oid; the UNIQUE
        // constraint keeps one row and the re-read returns it.
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO profiles (id, microsoft_oid, email, display_name) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(microsoft_oid) DO NOTHING",
                params![
                    id.as_str(),
                    identity.oid.as_str(),
                    identity.email.as_str(),
                    identity.display_name()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("ensure_profile insert: {e}")))?;

        let id = self
            .find_profile_id(&identity.oid)
            .await?
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
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PREFERENCE_COLUMNS} FROM preferences WHERE user_id = ?1"),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_preferences: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_preferences(&row)?.into_override())),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_preferences: {e}"))),
        }
    }

    async fn upsert_preferences(
        &self,
        user_id: &str,
        prefs: &ConfigOverride,
    ) -> Result<(), DatabaseError> {
        let row = PreferencesRow::from_override(user_id, prefs);
        let vip_senders = list_to_json(&row.vip_senders)?;
        let urgent_keywords = list_to_json(&row.urgent_keywords)?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO preferences ({PREFERENCE_COLUMNS}, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
                     ON CONFLICT(user_id) DO UPDATE SET
                        lookback_days = excluded.lookback_days,
                        batch_size = excluded.batch_size,
                        user_email = excluded.user_email,
                        vip_senders = excluded.vip_senders,
                        urgent_keywords = excluded.urgent_keywords,
                        priority_high = excluded.priority_high,
                        priority_medium = excluded.priority_medium,
                        priority_low = excluded.priority_low,
                        updated_at = excluded.updated_at"
                ),
                params![
                    row.user_id,
                    row.lookback_days,
                    row.batch_size,
                    row.user_email,
                    vip_senders,
                    urgent_keywords,
                    row.priority_high,
                    row.priority_medium,
                    row.priority_low
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_preferences: {e}")))?;

        debug!(user_id, "Preferences saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptOverrides;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn make_identity(oid: &str) -> UserIdentity {
        UserIdentity {
            oid: oid.to_string(),
            email: format!("{oid}@empresa.com"),
            name: None,
        }
    }

    #[tokio::test]
    async fn ensure_profile_is_stable() {
        let db = test_db().await;
        let first = db.ensure_profile(&make_identity("oid-1")).await.unwrap();
        let second = db.ensure_profile(&make_identity("oid-1")).await.unwrap();
        let other = db.ensure_profile(&make_identity("oid-2")).await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn missing_preferences() {
        let db = test_db().await;
        let id = db.ensure_profile(&make_identity("oid-1")).await.unwrap();
        assert!(db.get_preferences(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_then_read() {
        let db = test_db().await;
        let id = db.ensure_profile(&make_identity("oid-1")).await.unwrap();
        let prefs = ConfigOverride {
            lookback_days: Some(7),
            vip_senders: Some(vec!["ceo@x.com".into(), "cfo@x.com".into()]),
            priority_prompts: Some(PromptOverrides {
                low: Some("Newsletters".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        db.upsert_preferences(&id, &prefs).await.unwrap();
        assert_eq!(db.get_preferences(&id).await.unwrap(), Some(prefs));
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let db = test_db().await;
        let id = db.ensure_profile(&make_identity("oid-1")).await.unwrap();

        db.upsert_preferences(
            &id,
            &ConfigOverride {
                lookback_days: Some(7),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        db.upsert_preferences(
            &id,
            &ConfigOverride {
                batch_size: Some(50),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let stored = db.get_preferences(&id).await.unwrap().unwrap();
        assert_eq!(stored.lookback_days, None);
        assert_eq!(stored.batch_size, Some(50));
    }

    #[tokio::test]
    async fn on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("smart-mail.db");

        let id = {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            let id = db.ensure_profile(&make_identity("oid-1")).await.unwrap();
            db.upsert_preferences(&id, &ConfigOverride::user_email("me@x.com"))
                .await
                .unwrap();
            id
        };

        let reopened = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(
            reopened.ensure_profile(&make_identity("oid-1")).await.unwrap(),
            id
        );
        let stored = reopened.get_preferences(&id).await.unwrap().unwrap();
        assert_eq!(stored.user_email.as_deref(), Some("me@x.com"));
    }
}
