//! Error types for Smart Mail.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors (Supabase or libSQL).
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },
}

/// Mail API errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mail API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mail API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Caller identity errors.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Token is not a JWT")]
    Malformed,

    #[error("Token payload could not be decoded: {0}")]
    Payload(String),

    #[error("Token has no oid/email claims; cannot identify the user")]
    MissingClaims,
}

/// Per-message classification errors. Never surfaced to clients.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Classifier call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Classifier reply could not be parsed: {0}")]
    Parse(String),
}

/// Loading or saving a caller's stored preferences.
#[derive(Debug, thiserror::Error)]
pub enum PreferenceError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by HTTP handlers.
///
/// Each variant maps to one status code and a JSON body of the form
/// `{"error": <generic message>, "detail": <detail>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Access token is required in Authorization header")]
    AuthenticationRequired,

    #[error("Could not identify user: {0}")]
    IdentityResolutionFailed(#[from] IdentityError),

    #[error("Persistence is not configured")]
    PersistenceUnavailable,

    #[error("Failed to fetch emails: {0}")]
    UpstreamFetchFailed(#[from] MailError),

    #[error("Invalid query parameter: {0}")]
    InvalidQuery(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Failed to access stored configuration: {0}")]
    Storage(#[from] DatabaseError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::IdentityResolutionFailed(_) | Self::InvalidQuery(_) | Self::InvalidBody(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PersistenceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamFetchFailed(_) | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<PreferenceError> for ApiError {
    fn from(e: PreferenceError) -> Self {
        match e {
            PreferenceError::Identity(e) => Self::IdentityResolutionFailed(e),
            PreferenceError::Database(e) => Self::Storage(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::AuthenticationRequired => {
                json!({"error": "Access token is required in Authorization header"})
            }
            Self::PersistenceUnavailable => json!({"error": "Persistence is not configured"}),
            Self::IdentityResolutionFailed(e) => {
                json!({"error": "Could not identify user", "detail": e.to_string()})
            }
            Self::InvalidQuery(detail) => {
                json!({"error": "Invalid query parameter", "detail": detail})
            }
            Self::InvalidBody(detail) => {
                json!({"error": "Invalid request body", "detail": detail})
            }
            Self::UpstreamFetchFailed(e) => {
                tracing::error!(error = %e, "Error fetching emails");
                json!({"error": "Failed to fetch emails", "detail": e.to_string()})
            }
            Self::Storage(e) => {
                tracing::error!(error = %e, "Error accessing stored configuration");
                json!({"error": "Failed to access stored configuration", "detail": e.to_string()})
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_status_codes() {
        assert_eq!(
            ApiError::AuthenticationRequired.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::IdentityResolutionFailed(IdentityError::MissingClaims).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::PersistenceUnavailable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::UpstreamFetchFailed(MailError::Status {
                status: 502,
                body: "bad gateway".into()
            })
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn mail_status_error_message_includes_body() {
        let err = MailError::Status {
            status: 401,
            body: "InvalidAuthenticationToken".into(),
        };
        assert_eq!(
            err.to_string(),
            "Mail API returned 401: InvalidAuthenticationToken"
        );
    }

    #[test]
    fn preference_errors_map_to_api_errors() {
        let identity: ApiError = PreferenceError::Identity(IdentityError::Malformed).into();
        assert_eq!(identity.status(), StatusCode::BAD_REQUEST);

        let storage: ApiError =
            PreferenceError::Database(DatabaseError::Query("timeout".into())).into();
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn startup_errors_convert_to_top_level() {
        let err: Error = ConfigError::InvalidValue {
            key: "PORT".into(),
            message: "not a number".into(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid configuration value for PORT: not a number"
        );

        let err: Error = DatabaseError::Migration("v1".into()).into();
        assert!(matches!(err, Error::Database(_)));
    }
}
