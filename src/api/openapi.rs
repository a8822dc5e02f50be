//! OpenAPI document assembled from the handler annotations.
//!
//! Add new endpoints to the `paths(...)` list so they show up in the
//! generated spec served at `/api/openapi.json` and in the Swagger UI.

use utoipa::OpenApi;

use super::handlers;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health,
        handlers::auth::register::register,
        handlers::auth::register::check_username,
        handlers::auth::register::check_email,
        handlers::auth::login::login,
        handlers::auth::login::refresh,
        handlers::auth::password::change_password,
        handlers::auth::password::password_reset_request,
        handlers::auth::password::password_reset_confirm,
        handlers::auth::session::me,
        handlers::auth::session::logout,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::patch_user,
        handlers::users::delete_user,
        handlers::users::role_stats,
        handlers::problems::list_problems,
        handlers::problems::get_problem,
        handlers::problems::create_problem,
        handlers::problems::update_problem,
        handlers::problems::delete_problem,
        handlers::problems::publish_problem,
    ),
    components(schemas(
        handlers::ErrorBody,
        handlers::health::Health,
        handlers::auth::types::LoginRequest,
        handlers::auth::types::TokenResponse,
        handlers::auth::types::RefreshRequest,
        handlers::auth::types::RegisterRequest,
        handlers::auth::types::ChangePasswordRequest,
        handlers::auth::types::PasswordResetRequest,
        handlers::auth::types::PasswordResetConfirmRequest,
        handlers::auth::types::AvailabilityResponse,
        handlers::auth::types::MessageResponse,
        handlers::auth::types::IdentityResponse,
        handlers::users::UserUpdateRequest,
        handlers::users::RoleStatsResponse,
        handlers::problems::ProblemResponse,
        handlers::problems::ProblemCreateRequest,
        handlers::problems::ProblemUpdateRequest,
        crate::users::Role,
    )),
    tags(
        (name = "health", description = "Liveness and database checks"),
        (name = "auth", description = "Login, tokens, and password management"),
        (name = "users", description = "User administration"),
        (name = "problems", description = "Problem bank"),
    )
)]
pub struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
