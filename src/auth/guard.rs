//! Layered permission checks in front of every protected operation.

use std::sync::Arc;

use crate::users::{Identity, IdentityStore, Role};

use super::{error::AuthError, token::TokenCodec};

/// Coarse permission level a request is evaluated against.
///
/// Computed per request from the resolved identity; never cached beyond one
/// request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Tier {
    Anonymous,
    Authenticated,
    TeacherOrAdmin,
    Admin,
}

impl Tier {
    /// Tier-satisfaction table. `admin` satisfies every tier, `teacher`
    /// additionally satisfies `teacher-or-admin`, and any role satisfies the
    /// bottom two tiers.
    #[must_use]
    pub const fn satisfied_by(self, role: Role) -> bool {
        match self {
            Self::Anonymous | Self::Authenticated => true,
            Self::TeacherOrAdmin => matches!(role, Role::Teacher | Role::Admin),
            Self::Admin => matches!(role, Role::Admin),
        }
    }
}

/// Decodes incoming credentials and classifies the caller.
pub struct AccessGuard {
    codec: Arc<TokenCodec>,
}

impl AccessGuard {
    #[must_use]
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Authorize a request at `required_tier`.
    ///
    /// A missing credential passes only the `Anonymous` tier (with no
    /// identity). Otherwise the credential is decoded and the identity
    /// re-resolved with a fresh read, so a deactivation after issuance is
    /// observed while the token is still cryptographically valid. The
    /// resolved identity, not the token claims, is what decides the tier;
    /// stale role claims in long-lived tokens carry no weight.
    ///
    /// # Errors
    /// `Unauthenticated` for an undecodable credential or unresolvable
    /// subject, `AccountDisabled` for an inactive identity, `Forbidden` when
    /// the current role does not satisfy the tier, `Internal` on store
    /// faults.
    pub async fn authorize(
        &self,
        store: &dyn IdentityStore,
        token: Option<&str>,
        required_tier: Tier,
    ) -> Result<Option<Identity>, AuthError> {
        let Some(token) = token else {
            if matches!(required_tier, Tier::Anonymous) {
                return Ok(None);
            }
            return Err(AuthError::Unauthenticated);
        };

        // Signature, expiry, and malformed failures are indistinguishable
        // from here on out.
        let Ok(claims) = self.codec.decode(token) else {
            return Err(AuthError::Unauthenticated);
        };

        // Narrow-purpose tokens (no role/id claim) never authorize.
        if claims.role.is_none() || claims.user_id.is_none() {
            return Err(AuthError::Unauthenticated);
        }

        let Some(identity) = store.find_by_username(&claims.sub).await? else {
            return Err(AuthError::Unauthenticated);
        };
        if !identity.is_active {
            return Err(AuthError::AccountDisabled);
        }

        if !required_tier.satisfied_by(identity.role) {
            return Err(AuthError::Forbidden);
        }

        Ok(Some(identity))
    }

    /// Authorize and insist on an identity (tiers above `Anonymous`).
    ///
    /// # Errors
    /// Same as [`authorize`](Self::authorize).
    pub async fn require(
        &self,
        store: &dyn IdentityStore,
        token: Option<&str>,
        required_tier: Tier,
    ) -> Result<Identity, AuthError> {
        self.authorize(store, token, required_tier)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    /// Optional-identity variant for endpoints that merely behave differently
    /// for anonymous callers.
    ///
    /// Any auth failure collapses to `None`. Store faults still propagate: a
    /// connectivity problem must not be mistaken for an anonymous caller.
    ///
    /// # Errors
    /// `Internal` on store faults only.
    pub async fn optional_authorize(
        &self,
        store: &dyn IdentityStore,
        token: Option<&str>,
    ) -> Result<Option<Identity>, AuthError> {
        match self.authorize(store, token, Tier::Authenticated).await {
            Ok(identity) => Ok(identity),
            Err(AuthError::Internal(err)) => Err(AuthError::Internal(err)),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessGuard, Tier};
    use crate::auth::{
        error::AuthError,
        token::{Claims, TokenCodec},
    };
    use crate::users::store::testing::{identity, MemoryIdentityStore};
    use crate::users::Role;
    use chrono::Utc;
    use secrecy::SecretString;
    use std::sync::Arc;

    fn guard() -> (AccessGuard, Arc<TokenCodec>) {
        let codec = Arc::new(TokenCodec::new(SecretString::from(
            "guard-test-key".to_string(),
        )));
        (AccessGuard::new(codec.clone()), codec)
    }

    fn session_token(codec: &TokenCodec, username: &str, user_id: i64, role: Role) -> String {
        let exp = Utc::now().timestamp() + 300;
        codec
            .encode(&Claims::session(username, user_id, role, exp))
            .expect("encode should succeed")
    }

    #[test]
    fn tier_table_matches_role_matrix() {
        for role in [Role::Student, Role::Teacher, Role::Admin, Role::Parent] {
            assert!(Tier::Anonymous.satisfied_by(role));
            assert!(Tier::Authenticated.satisfied_by(role));
        }
        assert!(Tier::TeacherOrAdmin.satisfied_by(Role::Teacher));
        assert!(Tier::TeacherOrAdmin.satisfied_by(Role::Admin));
        assert!(!Tier::TeacherOrAdmin.satisfied_by(Role::Student));
        assert!(!Tier::TeacherOrAdmin.satisfied_by(Role::Parent));
        assert!(Tier::Admin.satisfied_by(Role::Admin));
        assert!(!Tier::Admin.satisfied_by(Role::Teacher));
    }

    #[tokio::test]
    async fn missing_credential_passes_only_anonymous() {
        let (guard, _) = guard();
        let store = MemoryIdentityStore::new();

        let anonymous = guard.authorize(&store, None, Tier::Anonymous).await;
        assert!(matches!(anonymous, Ok(None)));

        let authenticated = guard.authorize(&store, None, Tier::Authenticated).await;
        assert!(matches!(authenticated, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn teacher_satisfies_its_tiers_but_not_admin() {
        let (guard, codec) = guard();
        let store = MemoryIdentityStore::new();
        store.insert(identity(1, "tina", Role::Teacher, "digest"));
        let token = session_token(&codec, "tina", 1, Role::Teacher);

        assert!(guard
            .authorize(&store, Some(&token), Tier::Authenticated)
            .await
            .is_ok());
        assert!(guard
            .authorize(&store, Some(&token), Tier::TeacherOrAdmin)
            .await
            .is_ok());
        let admin_only = guard.authorize(&store, Some(&token), Tier::Admin).await;
        assert!(matches!(admin_only, Err(AuthError::Forbidden)));
    }

    #[tokio::test]
    async fn student_fails_elevated_tiers() {
        let (guard, codec) = guard();
        let store = MemoryIdentityStore::new();
        store.insert(identity(2, "sam", Role::Student, "digest"));
        let token = session_token(&codec, "sam", 2, Role::Student);

        let teacher_tier = guard
            .authorize(&store, Some(&token), Tier::TeacherOrAdmin)
            .await;
        let admin_tier = guard.authorize(&store, Some(&token), Tier::Admin).await;
        assert!(matches!(teacher_tier, Err(AuthError::Forbidden)));
        assert!(matches!(admin_tier, Err(AuthError::Forbidden)));
    }

    #[tokio::test]
    async fn deactivation_takes_effect_before_expiry() {
        let (guard, codec) = guard();
        let store = MemoryIdentityStore::new();
        store.insert(identity(3, "alice", Role::Student, "digest"));
        let token = session_token(&codec, "alice", 3, Role::Student);

        assert!(guard
            .authorize(&store, Some(&token), Tier::Authenticated)
            .await
            .is_ok());

        store.set_active(3, false);
        let disabled = guard
            .authorize(&store, Some(&token), Tier::Authenticated)
            .await;
        assert!(matches!(disabled, Err(AuthError::AccountDisabled)));
    }

    #[tokio::test]
    async fn resolved_identity_overrides_stale_role_claim() {
        let (guard, codec) = guard();
        let store = MemoryIdentityStore::new();
        // Promoted after the token was minted; the fresh read decides.
        store.insert(identity(4, "tina", Role::Teacher, "digest"));
        let stale_token = session_token(&codec, "tina", 4, Role::Student);

        let resolved = guard
            .authorize(&store, Some(&stale_token), Tier::TeacherOrAdmin)
            .await
            .expect("stale claim must not block the current role")
            .expect("identity expected");
        assert_eq!(resolved.role, Role::Teacher);
    }

    #[tokio::test]
    async fn expired_and_garbage_tokens_collapse_to_unauthenticated() {
        let (guard, codec) = guard();
        let store = MemoryIdentityStore::new();
        store.insert(identity(5, "alice", Role::Student, "digest"));

        let expired = codec
            .encode(&Claims::session(
                "alice",
                5,
                Role::Student,
                Utc::now().timestamp() - 10,
            ))
            .expect("encode should succeed");
        let expired_result = guard
            .authorize(&store, Some(&expired), Tier::Authenticated)
            .await;
        assert!(matches!(expired_result, Err(AuthError::Unauthenticated)));

        let garbage_result = guard
            .authorize(&store, Some("garbage"), Tier::Authenticated)
            .await;
        assert!(matches!(garbage_result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn reset_tokens_never_authorize() {
        let (guard, codec) = guard();
        let store = MemoryIdentityStore::new();
        store.insert(identity(6, "alice", Role::Student, "digest"));

        let reset = codec
            .encode(&Claims::password_reset(
                "alice@example.com",
                Utc::now().timestamp() + 300,
            ))
            .expect("encode should succeed");
        let result = guard
            .authorize(&store, Some(&reset), Tier::Authenticated)
            .await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn authorize_is_idempotent_absent_store_mutation() {
        let (guard, codec) = guard();
        let store = MemoryIdentityStore::new();
        store.insert(identity(7, "tina", Role::Teacher, "digest"));
        let token = session_token(&codec, "tina", 7, Role::Teacher);

        let first = guard
            .authorize(&store, Some(&token), Tier::TeacherOrAdmin)
            .await
            .expect("first call should pass")
            .expect("identity expected");
        let second = guard
            .authorize(&store, Some(&token), Tier::TeacherOrAdmin)
            .await
            .expect("second call should pass")
            .expect("identity expected");

        assert_eq!(first.id, second.id);
        assert_eq!(first.role, second.role);
    }

    #[tokio::test]
    async fn optional_authorize_swallows_auth_failures_only() {
        let (guard, codec) = guard();
        let store = MemoryIdentityStore::new();
        store.insert(identity(8, "alice", Role::Student, "digest"));

        assert!(matches!(
            guard.optional_authorize(&store, None).await,
            Ok(None)
        ));
        assert!(matches!(
            guard.optional_authorize(&store, Some("garbage")).await,
            Ok(None)
        ));

        let token = session_token(&codec, "alice", 8, Role::Student);
        let resolved = guard
            .optional_authorize(&store, Some(&token))
            .await
            .expect("no store fault");
        assert!(resolved.is_some_and(|identity| identity.username == "alice"));

        store.set_active(8, false);
        assert!(matches!(
            guard.optional_authorize(&store, Some(&token)).await,
            Ok(None)
        ));
    }
}
