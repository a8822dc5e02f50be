//! Registration and availability checks.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::types::{AvailabilityResponse, IdentityResponse, RegisterRequest};
use crate::api::handlers::{bearer_token, valid_email, valid_password, valid_username, ApiError, ErrorBody};
use crate::auth::{AuthError, AuthState};
use crate::users::{store::CreateOutcome, IdentityStore, NewIdentity, PgIdentityStore, Role};

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity created", body = IdentityResponse),
        (status = 400, description = "Invalid input or duplicate username/email", body = ErrorBody),
        (status = 403, description = "Registration closed", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;

    // With open registration off, only a resolved admin may create accounts.
    // The caller is resolved optionally so an anonymous request gets a clean
    // 403 instead of a 401 challenge.
    if !auth.config().open_registration() {
        let caller = auth
            .guard()
            .optional_authorize(store, bearer_token(&headers))
            .await?;
        if !caller.is_some_and(|identity| matches!(identity.role, Role::Admin)) {
            return Err(AuthError::Forbidden.into());
        }
    }

    if !valid_username(&payload.username) {
        return Err(ApiError::BadRequest(
            "Username must be 3-50 letters, digits, or underscores".to_string(),
        ));
    }
    if !valid_password(&payload.password) {
        return Err(ApiError::BadRequest(
            "Password must be 6-100 characters".to_string(),
        ));
    }
    if let Some(email) = payload.email.as_deref() {
        if !valid_email(email) {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }
    }

    let password_hash = auth.authenticator().hash_secret(&payload.password)?;
    let new = NewIdentity {
        username: payload.username,
        email: payload.email,
        password_hash,
        full_name: payload.full_name,
        role: payload.role.unwrap_or(Role::Student),
        metadata: payload.metadata.unwrap_or_else(|| serde_json::json!({})),
    };

    match store.create(&new).await? {
        CreateOutcome::Created(identity) => Ok((
            StatusCode::CREATED,
            Json(IdentityResponse::from(&identity)),
        )),
        CreateOutcome::UsernameTaken => Err(ApiError::BadRequest(
            "Username already exists".to_string(),
        )),
        CreateOutcome::EmailTaken => {
            Err(ApiError::BadRequest("Email already exists".to_string()))
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/check-username/{username}",
    params(("username" = String, Path, description = "Username to check")),
    responses(
        (status = 200, description = "Availability of the username", body = AvailabilityResponse),
    ),
    tag = "auth"
)]
pub async fn check_username(
    Path(username): Path<String>,
    store: Extension<Arc<PgIdentityStore>>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let existing = store.find_by_username(&username).await?;
    Ok(Json(AvailabilityResponse {
        available: existing.is_none(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/check-email/{email}",
    params(("email" = String, Path, description = "Email to check")),
    responses(
        (status = 200, description = "Availability of the email", body = AvailabilityResponse),
    ),
    tag = "auth"
)]
pub async fn check_email(
    Path(email): Path<String>,
    store: Extension<Arc<PgIdentityStore>>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let existing = store.find_by_email(&email).await?;
    Ok(Json(AvailabilityResponse {
        available: existing.is_none(),
    }))
}
