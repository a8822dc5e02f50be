//! API handlers and shared utilities.
//!
//! This module organizes the route handlers and provides common functions for
//! validation, bearer-token extraction, and the mapping from auth failures to
//! transport status codes.

pub(crate) mod auth;
pub(crate) mod health;
pub(crate) mod problems;
pub(crate) mod root;
pub(crate) mod users;

use axum::{
    http::{header::AUTHORIZATION, header::WWW_AUTHENTICATE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Transport-level error for handler results.
///
/// Auth failures keep their taxonomy up to this point; here they become
/// status codes. The decode-level distinctions were already collapsed inside
/// the core, so a 401 body is identical for expired, malformed, and
/// bad-signature credentials.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest(String),
    NotFound(&'static str),
    Internal(anyhow::Error),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Internal(err) => Self::Internal(err),
            other => Self::Auth(other),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(err @ (AuthError::InvalidCredentials | AuthError::Unauthenticated)) => (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Bearer")],
                Json(ErrorBody {
                    error: err.to_string(),
                }),
            )
                .into_response(),
            Self::Auth(err @ AuthError::AccountDisabled) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody {
                    error: err.to_string(),
                }),
            )
                .into_response(),
            Self::Auth(err @ AuthError::Forbidden) => (
                StatusCode::FORBIDDEN,
                Json(ErrorBody {
                    error: err.to_string(),
                }),
            )
                .into_response(),
            Self::Auth(AuthError::Internal(err)) | Self::Internal(err) => {
                error!("Internal error: {err:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody {
                        error: "internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
            Self::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorBody { error: message })).into_response()
            }
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                Json(ErrorBody {
                    error: message.to_string(),
                }),
            )
                .into_response(),
        }
    }
}

/// Usernames are 3-50 characters of letters, digits, and underscores.
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_]{3,50}$").is_ok_and(|re| re.is_match(username))
}

/// Lightweight email sanity check used before persisting data.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Secrets are 6-100 characters.
pub fn valid_password(password: &str) -> bool {
    (6..=100).contains(&password.chars().count())
}

/// Extract the bearer token from the `Authorization` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn valid_username_enforces_charset_and_length() {
        assert!(valid_username("alice"));
        assert!(valid_username("alice_01"));
        assert!(!valid_username("al"));
        assert!(!valid_username("alice!"));
        assert!(!valid_username(&"a".repeat(51)));
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn valid_password_enforces_length() {
        assert!(valid_password("secret"));
        assert!(!valid_password("short"));
        assert!(!valid_password(&"x".repeat(101)));
    }

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn unauthenticated_and_invalid_credentials_share_the_401_shape() {
        use crate::auth::AuthError;
        use axum::response::IntoResponse;

        let expired = ApiError::Auth(AuthError::Unauthenticated).into_response();
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert!(expired.headers().contains_key(WWW_AUTHENTICATE));

        let disabled = ApiError::Auth(AuthError::AccountDisabled).into_response();
        assert_eq!(disabled.status(), StatusCode::BAD_REQUEST);

        let forbidden = ApiError::Auth(AuthError::Forbidden).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    }
}
