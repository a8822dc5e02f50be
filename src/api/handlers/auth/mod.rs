//! Auth endpoints.
//!
//! Login, refresh, registration, password changes, and password resets. Every
//! failure funnels through [`super::ApiError`], so the externally visible
//! status codes stay uniform: 401 for anything credential-shaped, 400 for a
//! disabled account or bad input, 403 for an insufficient role.

pub(crate) mod login;
pub(crate) mod password;
pub(crate) mod register;
pub(crate) mod session;
pub(crate) mod types;

use axum::{
    routing::{get, post},
    Router,
};

pub(crate) fn router() -> Router {
    Router::new()
        .route("/register", post(register::register))
        .route("/login", post(login::login))
        .route("/refresh", post(login::refresh))
        .route("/change-password", post(password::change_password))
        .route(
            "/password-reset/request",
            post(password::password_reset_request),
        )
        .route(
            "/password-reset/confirm",
            post(password::password_reset_confirm),
        )
        .route("/me", get(session::me))
        .route("/logout", post(session::logout))
        .route("/check-username/:username", get(register::check_username))
        .route("/check-email/:email", get(register::check_email))
}
