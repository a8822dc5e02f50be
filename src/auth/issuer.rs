//! Credential minting for sessions and password resets.

use chrono::Utc;
use std::sync::Arc;

use crate::users::Identity;

use super::{
    error::AuthError,
    token::{Claims, TokenCodec, RESET_PASSWORD_TYPE},
};

/// A freshly minted bearer credential.
#[derive(Debug, Clone)]
pub struct IssuedCredential {
    pub access_token: String,
    pub expires_in: i64,
}

/// Mints signed credentials; nothing is persisted server-side.
pub struct SessionIssuer {
    codec: Arc<TokenCodec>,
    access_token_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
}

impl SessionIssuer {
    #[must_use]
    pub fn new(
        codec: Arc<TokenCodec>,
        access_token_ttl_seconds: i64,
        reset_token_ttl_seconds: i64,
    ) -> Self {
        Self {
            codec,
            access_token_ttl_seconds,
            reset_token_ttl_seconds,
        }
    }

    /// Mint a session credential with the default time-to-live.
    ///
    /// # Errors
    /// `Internal` if encoding fails.
    pub fn issue(&self, identity: &Identity) -> Result<IssuedCredential, AuthError> {
        self.issue_with_ttl(identity, self.access_token_ttl_seconds)
    }

    /// Mint a session credential with an explicit time-to-live.
    ///
    /// # Errors
    /// `Internal` if encoding fails.
    pub fn issue_with_ttl(
        &self,
        identity: &Identity,
        ttl_seconds: i64,
    ) -> Result<IssuedCredential, AuthError> {
        let exp = Utc::now().timestamp() + ttl_seconds;
        let claims = Claims::session(&identity.username, identity.id, identity.role, exp);
        let access_token = self
            .codec
            .encode(&claims)
            .map_err(|err| AuthError::Internal(err.into()))?;

        Ok(IssuedCredential {
            access_token,
            expires_in: ttl_seconds,
        })
    }

    /// Mint a narrow-purpose password-reset token bound to an email address.
    ///
    /// Reset tokens carry no role claim, so the access guard rejects them;
    /// only [`verify_password_reset`](Self::verify_password_reset) accepts
    /// them.
    ///
    /// # Errors
    /// `Internal` if encoding fails.
    pub fn issue_password_reset(&self, email: &str) -> Result<String, AuthError> {
        let exp = Utc::now().timestamp() + self.reset_token_ttl_seconds;
        let claims = Claims::password_reset(email, exp);
        self.codec
            .encode(&claims)
            .map_err(|err| AuthError::Internal(err.into()))
    }

    /// Verify a password-reset token and return the embedded email address.
    ///
    /// # Errors
    /// `Unauthenticated` for anything that is not a live reset token.
    pub fn verify_password_reset(&self, token: &str) -> Result<String, AuthError> {
        let claims = self
            .codec
            .decode(token)
            .map_err(|_| AuthError::Unauthenticated)?;
        if claims.token_type.as_deref() != Some(RESET_PASSWORD_TYPE) {
            return Err(AuthError::Unauthenticated);
        }
        Ok(claims.sub)
    }
}
