//! Login and token refresh.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::debug;

use super::types::{LoginRequest, RefreshRequest, TokenResponse};
use crate::api::handlers::{ApiError, ErrorBody};
use crate::auth::{AuthError, AuthState, Tier};
use crate::users::{IdentityStore, PgIdentityStore};

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Account disabled", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn login(
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;

    let identity = auth
        .authenticator()
        .authenticate(store, &payload.username, &payload.password)
        .await?;

    // Deliberate asymmetry: the disabled state is only reported once the
    // secret has been confirmed.
    if !identity.is_active {
        return Err(AuthError::AccountDisabled.into());
    }

    let credential = auth.issuer().issue(&identity)?;
    store.record_login(identity.id).await?;

    debug!("Login successful for identity {}", identity.id);

    Ok((StatusCode::OK, Json(TokenResponse::bearer(credential))))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh token issued", body = TokenResponse),
        (status = 400, description = "Account disabled", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn refresh(
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;

    // The current access token is the refresh input; there is no separate
    // refresh-token kind. A full fresh TTL starts here.
    let identity = auth
        .guard()
        .require(store, Some(&payload.refresh_token), Tier::Authenticated)
        .await?;
    let credential = auth.issuer().issue(&identity)?;

    Ok((StatusCode::OK, Json(TokenResponse::bearer(credential))))
}
