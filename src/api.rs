//! HTTP API: health, configuration, and the ranked inbox.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::{ConfigHolder, ConfigMode, ConfigOverride, MailConfig, resolve_config};
use crate::error::ApiError;
use crate::identity::bearer_token;
use crate::mail::{FetchQuery, MailSource};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::processor::{MessageProcessor, filter_by_priority};
use crate::pipeline::types::EmailItem;
use crate::preferences::PreferenceService;
use crate::store::ProfileStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Process-wide defaults; replaced by `POST /config` in stateless mode.
    pub defaults: Arc<ConfigHolder>,
    pub mail: Arc<dyn MailSource>,
    pub processor: MessageProcessor,
    /// None when no store is configured.
    pub preferences: Option<PreferenceService>,
    pub config_mode: ConfigMode,
    pub started_at: Instant,
}

impl AppState {
    /// State with no classifier, no store, stateless `/config`.
    pub fn new(defaults: MailConfig, mail: Arc<dyn MailSource>) -> Self {
        Self {
            defaults: Arc::new(ConfigHolder::new(defaults)),
            mail,
            processor: MessageProcessor::new(None),
            preferences: None,
            config_mode: ConfigMode::Stateless,
            started_at: Instant::now(),
        }
    }

    pub fn with_classifier(mut self, classifier: Option<Arc<dyn Classifier>>) -> Self {
        self.processor = MessageProcessor::new(classifier);
        self
    }

    pub fn with_store(mut self, store: Option<Arc<dyn ProfileStore>>) -> Self {
        self.preferences = store.map(PreferenceService::new);
        self
    }

    pub fn with_config_mode(mut self, mode: ConfigMode) -> Self {
        self.config_mode = mode;
        self
    }

    /// Token and preference service for a per-user `/config` call.
    fn per_user(&self, headers: &HeaderMap) -> Result<(&PreferenceService, String), ApiError> {
        let token = bearer_token(headers).ok_or(ApiError::AuthenticationRequired)?;
        let service = self
            .preferences
            .as_ref()
            .ok_or(ApiError::PersistenceUnavailable)?;
        Ok((service, token))
    }

    /// The caller's persisted layer for `/api/emails`, or `None` on any failure.
    async fn persisted_layer(&self, token: &str) -> Option<ConfigOverride> {
        if self.config_mode != ConfigMode::PerUser {
            return None;
        }
        let Some(service) = &self.preferences else {
            warn!("Persistence is not configured; using default configuration");
            return None;
        };
        match service.load_for_user(token).await {
            Ok(prefs) => Some(prefs.persisted_layer()),
            Err(e) => {
                warn!(error = %e, "Could not load user preferences; using default configuration");
                None
            }
        }
    }
}

/// Build the Axum router with all routes.
pub fn app_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config).post(update_config))
        .route("/api/emails", get(list_emails))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "ok": true,
        "uptime": state.started_at.elapsed().as_secs_f64()
    }))
}

// ── Config ──────────────────────────────────────────────────────────────

async fn get_config(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MailConfig>, ApiError> {
    let defaults = state.defaults.snapshot();
    match state.config_mode {
        ConfigMode::Stateless => Ok(Json(defaults.as_ref().clone())),
        ConfigMode::PerUser => {
            let (service, token) = state.per_user(&headers)?;
            let prefs = service.load_for_user(&token).await?;
            Ok(Json(resolve_config(
                &defaults,
                Some(&prefs.persisted_layer()),
                None,
            )))
        }
    }
}

async fn update_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ConfigOverride>, JsonRejection>,
) -> Result<Json<MailConfig>, ApiError> {
    // Auth and persistence checks come before body validation.
    let per_user = match state.config_mode {
        ConfigMode::Stateless => None,
        ConfigMode::PerUser => Some(state.per_user(&headers)?),
    };
    let Json(incoming) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;

    match per_user {
        None => {
            let updated = state.defaults.snapshot().apply(&incoming);
            state.defaults.replace(updated.clone());
            info!("Default configuration updated");
            Ok(Json(updated))
        }
        Some((service, token)) => {
            let prefs = service.save_for_user(&token, &incoming).await?;
            Ok(Json(resolve_config(
                &state.defaults.snapshot(),
                Some(&prefs.persisted_layer()),
                None,
            )))
        }
    }
}

// ── Emails ──────────────────────────────────────────────────────────────

/// Query parameters for `GET /api/emails`.
#[derive(Debug, Default, Deserialize)]
pub struct EmailsQuery {
    pub days: Option<String>,
    pub unread: Option<String>,
    pub priority: Option<String>,
}

impl EmailsQuery {
    /// Request-level override built from `days`.
    fn to_override(&self) -> Result<ConfigOverride, ApiError> {
        let lookback_days = match self.days.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
                ApiError::InvalidQuery(format!(
                    "days must be a non-negative integer, got '{raw}'"
                ))
            })?),
        };
        Ok(ConfigOverride {
            lookback_days,
            ..ConfigOverride::default()
        })
    }

    /// Unread-only unless `unread` is present and not exactly `"true"`.
    fn unread_only(&self) -> bool {
        match self.unread.as_deref() {
            None | Some("") => true,
            Some(value) => value == "true",
        }
    }
}

/// Body of a successful `GET /api/emails`.
#[derive(Debug, Clone, Serialize)]
pub struct EmailsResponse {
    pub items: Vec<EmailItem>,
    pub count: usize,
}

async fn list_emails(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EmailsQuery>,
) -> Result<Json<EmailsResponse>, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::AuthenticationRequired)?;
    let request_layer = query.to_override()?;

    let defaults = state.defaults.snapshot();
    let persisted = state.persisted_layer(&token).await;
    let config = resolve_config(&defaults, persisted.as_ref(), Some(&request_layer));

    let fetch = FetchQuery {
        days: config.lookback_days,
        unread_only: query.unread_only(),
        top: config.batch_size,
    };
    debug!(?fetch, "Fetching emails");
    let messages = state.mail.fetch_messages(&token, &fetch).await?;

    let items = state.processor.process_batch(&messages, &config).await;
    let items = filter_by_priority(items, query.priority.as_deref());

    Ok(Json(EmailsResponse {
        count: items.len(),
        items,
    }))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use super::*;
    use crate::error::MailError;
    use crate::pipeline::types::Message;

    struct EmptyMail;

    #[async_trait]
    impl MailSource for EmptyMail {
        async fn fetch_messages(
            &self,
            _access_token: &str,
            _query: &FetchQuery,
        ) -> Result<Vec<Message>, MailError> {
            Ok(Vec::new())
        }
    }

    fn app() -> Router {
        app_routes(AppState::new(MailConfig::default(), Arc::new(EmptyMail)))
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn query(days: Option<&str>, unread: Option<&str>) -> EmailsQuery {
        EmailsQuery {
            days: days.map(String::from),
            unread: unread.map(String::from),
            priority: None,
        }
    }

    #[test]
    fn days_override() {
        assert_eq!(
            query(Some("7"), None).to_override().unwrap().lookback_days,
            Some(7)
        );
        assert_eq!(query(Some("0"), None).to_override().unwrap().lookback_days, Some(0));
        assert!(query(None, None).to_override().unwrap().is_empty());
        assert!(query(Some(""), None).to_override().unwrap().is_empty());
    }

    #[test]
    fn malformed_days() {
        for raw in ["abc", "-1", "1.5"] {
            assert!(matches!(
                query(Some(raw), None).to_override(),
                Err(ApiError::InvalidQuery(_))
            ));
        }
    }

    #[test]
    fn unread_flag() {
        assert!(query(None, None).unread_only());
        assert!(query(None, Some("true")).unread_only());
        assert!(!query(None, Some("false")).unread_only());
        assert!(!query(None, Some("TRUE")).unread_only());
        assert!(!query(None, Some("1")).unread_only());
    }

    #[tokio::test]
    async fn health_route_allows_any_origin() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        assert_eq!(body_json(resp).await["ok"], true);
    }

    #[tokio::test]
    async fn malformed_config_body() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/config")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Invalid request body");
    }

    #[tokio::test]
    async fn empty_inbox() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/api/emails")
                    .header(header::AUTHORIZATION, "Bearer t")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"items": [], "count": 0})
        );
    }
}
