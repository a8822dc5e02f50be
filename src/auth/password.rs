//! One-way secret hashing with Argon2id.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version,
};

use super::config::AuthConfig;

/// Salted, adaptive one-way hashing of user secrets.
///
/// Every call to [`hash`](Self::hash) embeds a fresh random salt, so equal
/// secrets produce different digests; equality only goes through
/// [`verify`](Self::verify).
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    /// Build a hasher from the configured cost parameters.
    ///
    /// # Errors
    /// Returns an error if the algorithm rejects the parameters.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_kib(),
            config.argon2_iterations(),
            config.argon2_parallelism(),
            None,
        )
        .map_err(|err| anyhow!("invalid argon2 parameters: {err}"))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a secret with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if hashing fails.
    pub fn hash(&self, secret: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let digest = self
            .argon2
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|err| anyhow!("failed to hash secret: {err}"))?;
        Ok(digest.to_string())
    }

    /// Verify a secret against a stored digest.
    ///
    /// Malformed digests verify as false instead of erroring. The underlying
    /// comparison is constant-time regardless of where a mismatch occurs.
    #[must_use]
    pub fn verify(&self, secret: &str, digest: &str) -> bool {
        PasswordHash::new(digest)
            .map(|parsed| {
                self.argon2
                    .verify_password(secret.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::PasswordHasher;
    use crate::auth::config::AuthConfig;
    use anyhow::Result;
    use secrecy::SecretString;

    fn hasher() -> Result<PasswordHasher> {
        // Minimal cost keeps the suite fast; production uses the defaults.
        let config =
            AuthConfig::new(SecretString::from("test-key".to_string())).with_argon2_params(16, 1, 1);
        PasswordHasher::new(&config)
    }

    #[test]
    fn same_secret_hashes_differently_but_both_verify() -> Result<()> {
        let hasher = hasher()?;
        let first = hasher.hash("correcthorse")?;
        let second = hasher.hash("correcthorse")?;

        assert_ne!(first, second);
        assert!(hasher.verify("correcthorse", &first));
        assert!(hasher.verify("correcthorse", &second));
        Ok(())
    }

    #[test]
    fn wrong_secret_fails_verification() -> Result<()> {
        let hasher = hasher()?;
        let digest = hasher.hash("correcthorse")?;
        assert!(!hasher.verify("batterystaple", &digest));
        Ok(())
    }

    #[test]
    fn malformed_digest_verifies_false() -> Result<()> {
        let hasher = hasher()?;
        assert!(!hasher.verify("correcthorse", "not-a-digest"));
        assert!(!hasher.verify("correcthorse", ""));
        Ok(())
    }
}
