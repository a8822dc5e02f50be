//! Authentication and authorization core.
//!
//! Stateless bearer credentials: the [`Authenticator`] verifies secrets, the
//! [`SessionIssuer`] mints signed time-bounded tokens, and the [`AccessGuard`]
//! gates every protected operation by decoding the credential, re-resolving
//! the identity against the store, and applying the tier table.
//!
//! No session state is kept server-side. Deactivating an identity is the only
//! way to cut off an outstanding token before it expires, which is why the
//! guard re-reads the identity on every check.

mod authenticator;
mod config;
mod error;
mod guard;
mod issuer;
mod password;
pub(crate) mod token;

pub use self::authenticator::Authenticator;
pub use self::config::AuthConfig;
pub use self::error::AuthError;
pub use self::guard::{AccessGuard, Tier};
pub use self::issuer::{IssuedCredential, SessionIssuer};
pub use self::password::PasswordHasher;
pub use self::token::{Claims, TokenCodec, TokenError, RESET_PASSWORD_TYPE};

use anyhow::Result;
use std::sync::Arc;

/// Shared auth state wired once at startup and injected into handlers.
pub struct AuthState {
    config: AuthConfig,
    authenticator: Authenticator,
    issuer: SessionIssuer,
    guard: AccessGuard,
}

impl AuthState {
    /// Build the component chain from configuration.
    ///
    /// # Errors
    /// Returns an error if the hasher rejects the configured parameters.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let hasher = Arc::new(PasswordHasher::new(&config)?);
        let codec = Arc::new(TokenCodec::new(config.secret_key().clone()));

        let authenticator = Authenticator::new(hasher)?;
        let issuer = SessionIssuer::new(
            codec.clone(),
            config.access_token_ttl_seconds(),
            config.reset_token_ttl_seconds(),
        );
        let guard = AccessGuard::new(codec);

        Ok(Self {
            config,
            authenticator,
            issuer,
            guard,
        })
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn issuer(&self) -> &SessionIssuer {
        &self.issuer
    }

    #[must_use]
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, AuthState, Tier};
    use crate::users::store::testing::{identity, MemoryIdentityStore};
    use crate::users::Role;
    use anyhow::Result;
    use secrecy::SecretString;

    fn state() -> Result<AuthState> {
        let config = AuthConfig::new(SecretString::from("state-test-key".to_string()))
            .with_argon2_params(16, 1, 1);
        AuthState::new(config)
    }

    #[tokio::test]
    async fn login_issue_authorize_chain() -> Result<()> {
        let state = state()?;
        let store = MemoryIdentityStore::new();
        let hash = state
            .authenticator()
            .hash_secret("correcthorse")
            .map_err(|err| anyhow::anyhow!("hash failed: {err}"))?;
        store.insert(identity(1, "alice", Role::Student, &hash));

        let alice = state
            .authenticator()
            .authenticate(&store, "alice", "correcthorse")
            .await
            .map_err(|err| anyhow::anyhow!("authenticate failed: {err}"))?;

        let credential = state
            .issuer()
            .issue(&alice)
            .map_err(|err| anyhow::anyhow!("issue failed: {err}"))?;
        assert_eq!(credential.expires_in, 604_800);

        let resolved = state
            .guard()
            .require(&store, Some(&credential.access_token), Tier::Authenticated)
            .await
            .map_err(|err| anyhow::anyhow!("authorize failed: {err}"))?;
        assert_eq!(resolved.username, "alice");
        Ok(())
    }

    #[test]
    fn distinct_keys_invalidate_each_other() -> Result<()> {
        let first = state()?;
        let second = AuthState::new(
            AuthConfig::new(SecretString::from("rotated-key".to_string()))
                .with_argon2_params(16, 1, 1),
        )?;
        let alice = identity(1, "alice", Role::Student, "digest");

        let credential = first
            .issuer()
            .issue(&alice)
            .map_err(|err| anyhow::anyhow!("issue failed: {err}"))?;

        // Rotation means a different codec key; everything outstanding dies.
        let store = MemoryIdentityStore::new();
        store.insert(alice);
        let result = futures_block_on(second.guard().require(
            &store,
            Some(&credential.access_token),
            Tier::Authenticated,
        ));
        assert!(result.is_err());
        Ok(())
    }

    // Small helper so the rotation test stays a plain #[test].
    fn futures_block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(future)
    }
}
