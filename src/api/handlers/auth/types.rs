//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::IssuedCredential;
use crate::users::{Identity, Role};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    pub(crate) fn bearer(credential: IssuedCredential) -> Self {
        Self {
            access_token: credential.access_token,
            token_type: "bearer".to_string(),
            expires_in: credential.expires_in,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AvailabilityResponse {
    pub available: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

/// Public view of an identity; the secret hash never appears here.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IdentityResponse {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: String,
    pub last_login_at: Option<String>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            full_name: identity.full_name.clone(),
            role: identity.role,
            is_active: identity.is_active,
            is_verified: identity.is_verified,
            created_at: identity.created_at.to_rfc3339(),
            last_login_at: identity.last_login_at.map(|at| at.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::store::testing::identity;

    #[test]
    fn token_response_is_bearer() {
        let response = TokenResponse::bearer(IssuedCredential {
            access_token: "token".to_string(),
            expires_in: 604_800,
        });
        assert_eq!(response.token_type, "bearer");
        assert_eq!(response.expires_in, 604_800);
    }

    #[test]
    fn identity_response_omits_the_secret_hash() {
        let alice = identity(1, "alice", Role::Student, "digest");
        let response = IdentityResponse::from(&alice);
        let value = serde_json::to_value(&response).expect("serialize response");

        assert_eq!(value.get("username"), Some(&serde_json::json!("alice")));
        assert!(value.get("password_hash").is_none());
        assert!(!value.to_string().contains("digest"));
    }
}
