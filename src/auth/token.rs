//! Signed, time-bounded credential encoding (HS256 JWT).

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::users::Role;

/// `type` claim value carried by password-reset tokens.
pub const RESET_PASSWORD_TYPE: &str = "reset_password";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenHeader {
    pub alg: String,
    pub typ: String,
}

impl TokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Flat claim set embedded in a credential.
///
/// Session tokens carry `sub` (username), `user_id`, and `role` with no
/// `type`. Narrow-purpose tokens carry `sub` plus a `type` discriminator and
/// no role, which is what gets them rejected wherever a role is required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub exp: i64,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Claims {
    /// Session claims for an identity, expiring at `exp` (unix seconds).
    #[must_use]
    pub fn session(username: &str, user_id: i64, role: Role, exp: i64) -> Self {
        Self {
            sub: username.to_string(),
            user_id: Some(user_id),
            role: Some(role),
            exp,
            token_type: None,
        }
    }

    /// Password-reset claims bound to an email address, expiring at `exp`.
    #[must_use]
    pub fn password_reset(email: &str, exp: i64) -> Self {
        Self {
            sub: email.to_string(),
            user_id: None,
            role: None,
            exp,
            token_type: Some(RESET_PASSWORD_TYPE.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    TokenFormat,
    #[error("invalid base64url encoding")]
    Base64,
    #[error("invalid json")]
    Json(#[from] serde_json::Error),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlg(String),
    #[error("invalid signing key")]
    Key,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encodes and decodes signed claim sets with a process-wide key.
///
/// Key and algorithm are fixed at construction. Rotating the key invalidates
/// every outstanding token immediately; there is no grace window.
pub struct TokenCodec {
    key: SecretString,
}

impl TokenCodec {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }

    fn mac(&self) -> Result<HmacSha256, TokenError> {
        HmacSha256::new_from_slice(self.key.expose_secret().as_bytes())
            .map_err(|_| TokenError::Key)
    }

    /// Encode claims into a signed token string.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be serialized or signed.
    pub fn encode(&self, claims: &Claims) -> Result<String, TokenError> {
        let header_b64 = b64e_json(&TokenHeader::hs256())?;
        let claims_b64 = b64e_json(claims)?;
        let signing_input = format!("{header_b64}.{claims_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

        Ok(format!("{signing_input}.{signature_b64}"))
    }

    /// Decode a token, verifying signature and expiry against the wall clock.
    ///
    /// # Errors
    /// See [`decode_at`](Self::decode_at).
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        self.decode_at(token, Utc::now().timestamp())
    }

    /// Decode a token against an explicit clock.
    ///
    /// The signature is verified in constant time before the claims are
    /// parsed, and the embedded expiry is compared against
    /// `now_unix_seconds`.
    ///
    /// # Errors
    /// Returns an error if:
    /// - the token is malformed or contains invalid base64/json,
    /// - the algorithm is not `HS256`,
    /// - the signature does not match the current key,
    /// - the expiry is not in the future.
    pub fn decode_at(&self, token: &str, now_unix_seconds: i64) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let header_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let claims_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        let sig_b64 = parts.next().ok_or(TokenError::TokenFormat)?;
        if parts.next().is_some() {
            return Err(TokenError::TokenFormat);
        }

        let header: TokenHeader = b64d_json(header_b64)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlg(header.alg));
        }

        let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
        let signing_input = format!("{header_b64}.{claims_b64}");
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: Claims = b64d_json(claims_b64)?;
        if claims.exp <= now_unix_seconds {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn codec() -> TokenCodec {
        TokenCodec::new(SecretString::from("0123456789abcdef0123456789abcdef".to_string()))
    }

    fn session_claims() -> Claims {
        Claims::session("alice", 7, Role::Teacher, NOW + 120)
    }

    #[test]
    fn round_trip_returns_submitted_claims() -> Result<(), TokenError> {
        let codec = codec();
        let claims = session_claims();
        let token = codec.encode(&claims)?;

        let decoded = codec.decode_at(&token, NOW)?;
        assert_eq!(decoded, claims);
        Ok(())
    }

    #[test]
    fn expiry_boundary() -> Result<(), TokenError> {
        let codec = codec();
        let token = codec.encode(&session_claims())?;

        // One second before expiry decodes, at and after expiry it does not.
        assert!(codec.decode_at(&token, NOW + 119).is_ok());
        assert!(matches!(
            codec.decode_at(&token, NOW + 120),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            codec.decode_at(&token, NOW + 121),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn rejects_wrong_key() -> Result<(), TokenError> {
        let token = codec().encode(&session_claims())?;
        let other = TokenCodec::new(SecretString::from("another-key".to_string()));

        assert!(matches!(
            other.decode_at(&token, NOW),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn rejects_tampered_claims() -> Result<(), TokenError> {
        let codec = codec();
        let token = codec.encode(&session_claims())?;

        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = b64e_json(&Claims::session("alice", 7, Role::Admin, NOW + 120))?;
        parts[1] = forged.as_str();
        let forged_token = parts.join(".");

        assert!(matches!(
            codec.decode_at(&forged_token, NOW),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn rejects_malformed_tokens() {
        let codec = codec();
        assert!(matches!(
            codec.decode_at("not-a-token", NOW),
            Err(TokenError::TokenFormat)
        ));
        assert!(matches!(
            codec.decode_at("a.b.c.d", NOW),
            Err(TokenError::TokenFormat)
        ));
        assert!(codec.decode_at("!.!.!", NOW).is_err());
    }

    #[test]
    fn rejects_unsupported_algorithm() -> Result<(), TokenError> {
        let codec = codec();
        let header = TokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        };
        let token = format!("{}.{}.", b64e_json(&header)?, b64e_json(&session_claims())?);

        assert!(matches!(
            codec.decode_at(&token, NOW),
            Err(TokenError::UnsupportedAlg(_))
        ));
        Ok(())
    }

    #[test]
    fn reset_claims_carry_type_and_no_role() {
        let claims = Claims::password_reset("alice@example.com", NOW + 60);
        assert_eq!(claims.token_type.as_deref(), Some(RESET_PASSWORD_TYPE));
        assert!(claims.role.is_none());
        assert!(claims.user_id.is_none());

        let value = serde_json::to_value(&claims).expect("serialize claims");
        assert_eq!(value.get("type"), Some(&serde_json::json!("reset_password")));
        assert_eq!(value.get("role"), None);
    }
}
