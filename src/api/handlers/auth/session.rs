//! Current-identity lookup and the stateless logout acknowledgement.

use axum::{extract::Extension, http::HeaderMap, response::IntoResponse, Json};
use std::sync::Arc;

use super::types::{IdentityResponse, MessageResponse};
use crate::api::handlers::{bearer_token, ApiError, ErrorBody};
use crate::auth::{AuthState, Tier};
use crate::users::PgIdentityStore;

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "The authenticated identity", body = IdentityResponse),
        (status = 400, description = "Account disabled", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    ),
    tag = "auth"
)]
pub async fn me(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
) -> Result<Json<IdentityResponse>, ApiError> {
    let store: &PgIdentityStore = &store.0;

    let identity = auth
        .guard()
        .require(store, bearer_token(&headers), Tier::Authenticated)
        .await?;

    Ok(Json(IdentityResponse::from(&identity)))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Acknowledged; the client discards its token", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn logout() -> impl IntoResponse {
    // Credentials are stateless; there is nothing to revoke server-side.
    Json(MessageResponse {
        message: "Logged out".to_string(),
    })
}
