//! Role-gated user management endpoints.
//!
//! Flow Overview:
//! 1) Authorize the request via the access guard at the required tier.
//! 2) Perform reads or allow-listed updates against the identity store.
//!
//! Deletion is soft: identities are deactivated, which also invalidates every
//! outstanding token for them on the next authorization check.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::auth::types::IdentityResponse;
use super::{bearer_token, valid_email, ApiError, ErrorBody};
use crate::auth::{AuthState, Tier};
use crate::users::{
    store::{IdentityFilter, IdentityUpdate, UpdateOutcome},
    IdentityStore, PgIdentityStore, Role,
};

const DEFAULT_PAGE_SIZE: i64 = 100;

pub(crate) fn router() -> Router {
    Router::new()
        .route("/", get(list_users))
        .route(
            "/:id",
            get(get_user).patch(patch_user).delete(delete_user),
        )
        .route("/stats/roles", get(role_stats))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UserUpdateRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

/// Active-identity counts per role.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleStatsResponse {
    pub student: i64,
    pub teacher: i64,
    pub admin: i64,
    pub parent: i64,
    pub total: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "List identities (admin only)", body = [IdentityResponse]),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn list_users(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    Query(query): Query<ListUsersQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;
    auth.guard()
        .require(store, bearer_token(&headers), Tier::Admin)
        .await?;

    let filter = IdentityFilter {
        role: query.role,
        is_active: query.is_active,
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 500),
        offset: query.skip.unwrap_or(0).max(0),
    };
    let identities = store.list(&filter).await?;
    let response: Vec<IdentityResponse> = identities.iter().map(IdentityResponse::from).collect();

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "Identity id")),
    responses(
        (status = 200, description = "Identity detail (admin or self)", body = IdentityResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Identity not found", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn get_user(
    headers: HeaderMap,
    Path(id): Path<i64>,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;
    let caller = auth
        .guard()
        .require(store, bearer_token(&headers), Tier::Authenticated)
        .await?;

    // Self-service reads are allowed; anything else requires admin.
    if caller.id != id && !Tier::Admin.satisfied_by(caller.role) {
        return Err(crate::auth::AuthError::Forbidden.into());
    }

    match store.find_by_id(id).await? {
        Some(identity) => Ok(Json(IdentityResponse::from(&identity))),
        None => Err(ApiError::NotFound("Identity not found")),
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "Identity id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Identity updated (admin only)", body = IdentityResponse),
        (status = 400, description = "Invalid input or duplicate email", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Identity not found", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn patch_user(
    headers: HeaderMap,
    Path(id): Path<i64>,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    Json(payload): Json<UserUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;
    auth.guard()
        .require(store, bearer_token(&headers), Tier::Admin)
        .await?;

    if let Some(email) = payload.email.as_deref() {
        if !valid_email(email) {
            return Err(ApiError::BadRequest("Invalid email address".to_string()));
        }
    }
    if payload.email.is_none()
        && payload.full_name.is_none()
        && payload.role.is_none()
        && payload.is_active.is_none()
        && payload.metadata.is_none()
    {
        return Err(ApiError::BadRequest("No updates provided".to_string()));
    }

    let update = IdentityUpdate {
        email: payload.email,
        full_name: payload.full_name,
        role: payload.role,
        is_active: payload.is_active,
        metadata: payload.metadata,
    };
    match store.update(id, &update).await? {
        UpdateOutcome::Updated(identity) => Ok(Json(IdentityResponse::from(&identity))),
        UpdateOutcome::NotFound => Err(ApiError::NotFound("Identity not found")),
        UpdateOutcome::EmailTaken => {
            Err(ApiError::BadRequest("Email already exists".to_string()))
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    params(("id" = i64, Path, description = "Identity id")),
    responses(
        (status = 204, description = "Identity deactivated (admin only)"),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Identity not found", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn delete_user(
    headers: HeaderMap,
    Path(id): Path<i64>,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;
    auth.guard()
        .require(store, bearer_token(&headers), Tier::Admin)
        .await?;

    if store.deactivate(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Identity not found"))
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/users/stats/roles",
    responses(
        (status = 200, description = "Active-identity counts per role (admin only)", body = RoleStatsResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn role_stats(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
) -> Result<impl IntoResponse, ApiError> {
    let store: &PgIdentityStore = &store.0;
    auth.guard()
        .require(store, bearer_token(&headers), Tier::Admin)
        .await?;

    let mut stats = RoleStatsResponse {
        student: 0,
        teacher: 0,
        admin: 0,
        parent: 0,
        total: 0,
    };
    for (role, count) in store.count_by_role().await? {
        match role.as_str() {
            "student" => stats.student = count,
            "teacher" => stats.teacher = count,
            "admin" => stats.admin = count,
            "parent" => stats.parent = count,
            _ => {}
        }
    }
    stats.total = stats.student + stats.teacher + stats.admin + stats.parent;

    Ok(Json(stats))
}
