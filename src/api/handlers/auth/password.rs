//! Password changes and the password-reset flow.
//!
//! Reset tokens are narrow-purpose: 24-hour TTL, a `type` discriminator, and
//! no role claim, so they are useless against any guarded endpoint. The
//! request endpoint always answers 202 to avoid account probing; delivery
//! goes through the log-based outbox.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::types::{
    ChangePasswordRequest, MessageResponse, PasswordResetConfirmRequest, PasswordResetRequest,
};
use crate::api::handlers::{bearer_token, valid_password, ApiError, ErrorBody};
use crate::auth::{AuthError, AuthState, Tier};
use crate::users::{IdentityStore, PgIdentityStore};

#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Current password incorrect or new password invalid", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;

    let identity = auth
        .guard()
        .require(store, bearer_token(&headers), Tier::Authenticated)
        .await?;

    if !valid_password(&payload.new_password) {
        return Err(ApiError::BadRequest(
            "Password must be 6-100 characters".to_string(),
        ));
    }

    // The credential got the caller here; knowledge of the current secret is
    // what authorizes the change.
    match auth
        .authenticator()
        .change_secret(
            store,
            &identity,
            &payload.current_password,
            &payload.new_password,
        )
        .await
    {
        Ok(()) => Ok(Json(MessageResponse {
            message: "Password updated".to_string(),
        })),
        Err(AuthError::InvalidCredentials) => Err(ApiError::BadRequest(
            "Current password is incorrect".to_string(),
        )),
        Err(err) => Err(err.into()),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Reset queued if the email is registered"),
    ),
    tag = "auth"
)]
pub async fn password_reset_request(
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;

    // Always 202: requesters must not learn whether the email is registered.
    if let Some(identity) = store.find_by_email(&payload.email).await? {
        if identity.is_active {
            let token = auth.issuer().issue_password_reset(&payload.email)?;
            // Outbox stand-in; a mail worker would pick this up.
            info!(
                identity = identity.id,
                "password reset requested, token: {token}"
            );
        }
    }

    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired reset token", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn password_reset_confirm(
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;

    if !valid_password(&payload.new_password) {
        return Err(ApiError::BadRequest(
            "Password must be 6-100 characters".to_string(),
        ));
    }

    // Only the dedicated verification path accepts reset tokens; anything
    // else is one uniform rejection.
    let email = auth
        .issuer()
        .verify_password_reset(&payload.token)
        .map_err(|_| ApiError::BadRequest("Invalid or expired reset token".to_string()))?;

    let Some(identity) = store.find_by_email(&email).await? else {
        return Err(ApiError::BadRequest(
            "Invalid or expired reset token".to_string(),
        ));
    };

    let new_hash = auth.authenticator().hash_secret(&payload.new_password)?;
    store.update_password_hash(identity.id, &new_hash).await?;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    })
    .into_response())
}
