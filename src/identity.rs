//! Caller identity from a bearer token.
//!
//! **Security:** the token payload is decoded WITHOUT verifying the JWT
//! signature. Any caller able to forge a token can claim any `oid`. The mail
//! API itself still rejects forged tokens on fetch, but `/config` in per-user
//! mode trusts these claims as-is.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::IdentityError;

/// Who is calling, as claimed by their token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable directory object id (`oid`, falling back to `sub`).
    pub oid: String,
    pub email: String,
    pub name: Option<String>,
}

impl UserIdentity {
    /// Display name, falling back to the email.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }
}

#[derive(Debug, Default, Deserialize)]
struct Claims {
    oid: Option<String>,
    sub: Option<String>,
    preferred_username: Option<String>,
    upn: Option<String>,
    email: Option<String>,
    unique_name: Option<String>,
    name: Option<String>,
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// Returns `None` when the header is absent, not `Bearer`, or empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(String::from)
}

fn decode_unverified_claims(token: &str) -> Result<Claims, IdentityError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next()) {
        (Some(_), Some(payload)) if !payload.is_empty() => payload,
        _ => return Err(IdentityError::Malformed),
    };

    // Accept both URL-safe and standard alphabets, padded or not.
    let normalized: String = payload
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();

    let bytes = URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| IdentityError::Payload(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| IdentityError::Payload(e.to_string()))
}

/// Resolve the caller's identity from an access token.
pub fn identity_from_token(token: &str) -> Result<UserIdentity, IdentityError> {
    let claims = decode_unverified_claims(token)?;

    let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let oid = non_empty(claims.oid).or_else(|| non_empty(claims.sub));
    let email = non_empty(claims.preferred_username)
        .or_else(|| non_empty(claims.upn))
        .or_else(|| non_empty(claims.email))
        .or_else(|| non_empty(claims.unique_name));

    match (oid, email) {
        (Some(oid), Some(email)) => Ok(UserIdentity {
            oid,
            email,
            name: non_empty(claims.name),
        }),
        _ => Err(IdentityError::MissingClaims),
    }
}
