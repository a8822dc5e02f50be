//! Username/secret verification against the identity store.

use anyhow::Result;
use std::sync::Arc;

use crate::users::{Identity, IdentityStore};

use super::{error::AuthError, password::PasswordHasher};

/// Verifies login secrets and secret changes.
pub struct Authenticator {
    hasher: Arc<PasswordHasher>,
    // Burned on unknown usernames so both failure paths cost one verification.
    fallback_digest: String,
}

impl Authenticator {
    /// # Errors
    /// Returns an error if the fallback digest cannot be produced.
    pub fn new(hasher: Arc<PasswordHasher>) -> Result<Self> {
        let fallback_digest = hasher.hash("fallback")?;
        Ok(Self {
            hasher,
            fallback_digest,
        })
    }

    /// Resolve a username/secret pair to an identity.
    ///
    /// Username lookup is exact and case-sensitive. An absent user and a
    /// wrong secret produce the same failure. The active flag is deliberately
    /// not checked here; the login route reports a disabled account only once
    /// the secret is confirmed.
    ///
    /// # Errors
    /// `InvalidCredentials` on any mismatch, `Internal` on store faults.
    pub async fn authenticate(
        &self,
        store: &dyn IdentityStore,
        username: &str,
        secret: &str,
    ) -> Result<Identity, AuthError> {
        match store.find_by_username(username).await? {
            Some(identity) if self.hasher.verify(secret, &identity.password_hash) => Ok(identity),
            Some(_) => Err(AuthError::InvalidCredentials),
            None => {
                let _ = self.hasher.verify(secret, &self.fallback_digest);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// Rotate a caller's secret after re-verifying the current one.
    ///
    /// A valid credential alone is not proof of continued knowledge of the
    /// secret.
    ///
    /// # Errors
    /// `InvalidCredentials` when the current secret does not verify,
    /// `Internal` on hashing or store faults.
    pub async fn change_secret(
        &self,
        store: &dyn IdentityStore,
        identity: &Identity,
        current_secret: &str,
        new_secret: &str,
    ) -> Result<(), AuthError> {
        if !self.hasher.verify(current_secret, &identity.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = self.hasher.hash(new_secret)?;
        store.update_password_hash(identity.id, &new_hash).await?;
        Ok(())
    }

    /// Hash a brand-new secret (registration, password reset).
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn hash_secret(&self, secret: &str) -> Result<String, AuthError> {
        Ok(self.hasher.hash(secret)?)
    }
}

#[cfg(test)]
mod tests {
    use super::Authenticator;
    use crate::auth::{config::AuthConfig, error::AuthError, password::PasswordHasher};
    use crate::users::store::testing::{identity, MemoryIdentityStore};
    use crate::users::Role;
    use anyhow::Result;
    use secrecy::SecretString;
    use std::sync::Arc;

    fn authenticator() -> Result<Authenticator> {
        let config =
            AuthConfig::new(SecretString::from("test-key".to_string())).with_argon2_params(16, 1, 1);
        Authenticator::new(Arc::new(PasswordHasher::new(&config)?))
    }

    fn store_with_alice(authenticator: &Authenticator) -> Result<MemoryIdentityStore> {
        let store = MemoryIdentityStore::new();
        let hash = authenticator.hash_secret("correcthorse").map_err(|err| {
            anyhow::anyhow!("failed to hash test secret: {err}")
        })?;
        store.insert(identity(1, "alice", Role::Student, &hash));
        Ok(store)
    }

    #[tokio::test]
    async fn valid_pair_resolves_identity() -> Result<()> {
        let authenticator = authenticator()?;
        let store = store_with_alice(&authenticator)?;

        let resolved = authenticator
            .authenticate(&store, "alice", "correcthorse")
            .await;
        assert_eq!(resolved.map(|identity| identity.username).ok(), Some("alice".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_secret_and_unknown_user_fail_identically() -> Result<()> {
        let authenticator = authenticator()?;
        let store = store_with_alice(&authenticator)?;

        let wrong_secret = authenticator
            .authenticate(&store, "alice", "batterystaple")
            .await;
        let unknown_user = authenticator
            .authenticate(&store, "mallory", "batterystaple")
            .await;

        assert!(matches!(&wrong_secret, Err(AuthError::InvalidCredentials)));
        assert!(matches!(&unknown_user, Err(AuthError::InvalidCredentials)));
        // Same failure kind means the boundary renders byte-identical bodies.
        assert_eq!(
            wrong_secret.err().map(|err| err.to_string()),
            unknown_user.err().map(|err| err.to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn inactive_identity_still_authenticates() -> Result<()> {
        // Disabled-state reporting is the login route's concern, not ours.
        let authenticator = authenticator()?;
        let store = store_with_alice(&authenticator)?;
        store.set_active(1, false);

        let resolved = authenticator
            .authenticate(&store, "alice", "correcthorse")
            .await;
        assert!(resolved.is_ok_and(|identity| !identity.is_active));
        Ok(())
    }

    #[tokio::test]
    async fn change_secret_requires_current_secret() -> Result<()> {
        let authenticator = authenticator()?;
        let store = store_with_alice(&authenticator)?;
        let alice = store_identity(&store).await?;

        let rejected = authenticator
            .change_secret(&store, &alice, "wrong", "newsecret")
            .await;
        assert!(matches!(rejected, Err(AuthError::InvalidCredentials)));
        assert_eq!(store.password_hash(1), Some(alice.password_hash.clone()));

        authenticator
            .change_secret(&store, &alice, "correcthorse", "newsecret")
            .await
            .map_err(|err| anyhow::anyhow!("change_secret failed: {err}"))?;
        let updated = store.password_hash(1).expect("identity should exist");
        assert_ne!(updated, alice.password_hash);
        Ok(())
    }

    async fn store_identity(store: &MemoryIdentityStore) -> Result<crate::users::Identity> {
        use crate::users::IdentityStore;
        store
            .find_by_username("alice")
            .await?
            .ok_or_else(|| anyhow::anyhow!("alice missing"))
    }
}
