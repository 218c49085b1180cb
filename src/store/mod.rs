//! Persistence layer — profiles and per-user preferences.
//!
//! Two backends implement `ProfileStore`: Supabase (hosted, over PostgREST)
//! and libSQL (local file). Supabase wins when both are configured.

pub mod libsql_backend;
pub mod migrations;
pub mod supabase;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use supabase::SupabaseStore;
pub use traits::{PreferencesRow, ProfileStore};

use std::path::Path;
use std::sync::Arc;

use crate::config::ServerSettings;
use crate::error::DatabaseError;

/// Open the configured store, or `None` when persistence is disabled.
pub async fn open_store(
    settings: &ServerSettings,
) -> Result<Option<Arc<dyn ProfileStore>>, DatabaseError> {
    if let Some(supabase) = &settings.supabase {
        return Ok(Some(Arc::new(SupabaseStore::new(supabase))));
    }
    if let Some(path) = &settings.db_path {
        let backend = LibSqlBackend::new_local(Path::new(path)).await?;
        return Ok(Some(Arc::new(backend)));
    }
    Ok(None)
}
