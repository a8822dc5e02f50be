//! Failure taxonomy for authentication and authorization.

use thiserror::Error;

/// Terminal auth failures, mapped to transport codes at the API boundary.
///
/// Decode-level distinctions (signature, expiry, malformed) are collapsed
/// into `Unauthenticated` before they can reach a client.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad username/secret at login. Never distinguishes an absent user from
    /// a wrong secret.
    #[error("invalid username or password")]
    InvalidCredentials,
    /// Missing, invalid, expired, or malformed credential.
    #[error("invalid authentication credentials")]
    Unauthenticated,
    /// Cryptographically valid credential, deactivated identity.
    #[error("account disabled")]
    AccountDisabled,
    /// Valid identity, insufficient role for the required tier.
    #[error("insufficient permissions")]
    Forbidden,
    /// Store or crypto fault, distinct from the four auth outcomes.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::AuthError;

    #[test]
    fn messages_never_name_the_decode_failure() {
        // The same message covers expired, malformed, and bad-signature
        // tokens; clients must not learn which one occurred.
        assert_eq!(
            AuthError::Unauthenticated.to_string(),
            "invalid authentication credentials"
        );
    }

    #[test]
    fn invalid_credentials_message_is_uniform() {
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "invalid username or password"
        );
    }
}
