//! Database access for identities.
//!
//! The [`IdentityStore`] trait carries only the operations the auth core
//! consumes; management queries used by the user-administration endpoints are
//! inherent methods on [`PgIdentityStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;

use super::model::{Identity, NewIdentity, Role};

/// Lookups and mutations the auth core depends on.
///
/// Authorization checks re-resolve identities through this trait on every
/// request so a concurrent deactivation is observed while an otherwise valid
/// token is still outstanding.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;
    /// Persist a successful login timestamp.
    async fn record_login(&self, id: i64) -> Result<()>;
    /// Replace the stored secret hash.
    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<()>;
}

/// Outcome when creating a new identity.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Identity),
    UsernameTaken,
    EmailTaken,
}

/// Outcome for allow-listed identity updates.
#[derive(Debug)]
pub enum UpdateOutcome {
    Updated(Identity),
    NotFound,
    EmailTaken,
}

/// Allow-listed fields for identity updates; `None` leaves a field unchanged.
#[derive(Debug, Default)]
pub struct IdentityUpdate {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

/// Filters for the identity listing endpoint.
#[derive(Debug, Default)]
pub struct IdentityFilter {
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

/// Postgres-backed identity store.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert a new identity, detecting username/email conflicts.
    ///
    /// # Errors
    /// Returns an error on database failures other than unique violations.
    pub async fn create(&self, new: &NewIdentity) -> Result<CreateOutcome> {
        let query = r"
            INSERT INTO users
                (username, email, password_hash, full_name, role, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING
                id, username, email, password_hash, full_name, role,
                is_active, is_verified, created_at, updated_at, last_login_at, metadata
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(&new.full_name)
            .bind(new.role.as_str())
            .bind(&new.metadata)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(CreateOutcome::Created(identity_from_row(&row)?)),
            Err(err) => match unique_violation_constraint(&err) {
                Some(constraint) if constraint.contains("email") => Ok(CreateOutcome::EmailTaken),
                Some(_) => Ok(CreateOutcome::UsernameTaken),
                None => Err(err).context("failed to insert identity"),
            },
        }
    }

    /// List identities, newest first.
    ///
    /// # Errors
    /// Returns an error on database failures.
    pub async fn list(&self, filter: &IdentityFilter) -> Result<Vec<Identity>> {
        let query = r"
            SELECT
                id, username, email, password_hash, full_name, role,
                is_active, is_verified, created_at, updated_at, last_login_at, metadata
            FROM users
            WHERE ($1::text IS NULL OR role = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .bind(filter.role.map(Role::as_str))
            .bind(filter.is_active)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list identities")?;

        rows.iter().map(identity_from_row).collect()
    }

    /// Apply allow-listed updates to an identity.
    ///
    /// # Errors
    /// Returns an error on database failures other than unique violations.
    pub async fn update(&self, id: i64, update: &IdentityUpdate) -> Result<UpdateOutcome> {
        let query = r"
            UPDATE users
            SET
                email = COALESCE($1, email),
                full_name = COALESCE($2, full_name),
                role = COALESCE($3, role),
                is_active = COALESCE($4, is_active),
                metadata = COALESCE($5, metadata),
                updated_at = NOW()
            WHERE id = $6
            RETURNING
                id, username, email, password_hash, full_name, role,
                is_active, is_verified, created_at, updated_at, last_login_at, metadata
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&update.email)
            .bind(&update.full_name)
            .bind(update.role.map(Role::as_str))
            .bind(update.is_active)
            .bind(&update.metadata)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(Some(row)) => Ok(UpdateOutcome::Updated(identity_from_row(&row)?)),
            Ok(None) => Ok(UpdateOutcome::NotFound),
            Err(err) if unique_violation_constraint(&err).is_some() => Ok(UpdateOutcome::EmailTaken),
            Err(err) => Err(err).context("failed to update identity"),
        }
    }

    /// Soft-deactivate an identity instead of deleting the row.
    ///
    /// # Errors
    /// Returns an error on database failures.
    pub async fn deactivate(&self, id: i64) -> Result<bool> {
        let query = r"
            UPDATE users
            SET is_active = FALSE, updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to deactivate identity")?;
        Ok(result.rows_affected() > 0)
    }

    /// Count active identities per role.
    ///
    /// # Errors
    /// Returns an error on database failures.
    pub async fn count_by_role(&self) -> Result<Vec<(String, i64)>> {
        let query = r"
            SELECT role, COUNT(id) AS count
            FROM users
            WHERE is_active = TRUE
            GROUP BY role
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to count identities by role")?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get("role"), row.get("count")))
            .collect())
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
        let query = r"
            SELECT
                id, username, email, password_hash, full_name, role,
                is_active, is_verified, created_at, updated_at, last_login_at, metadata
            FROM users
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity by username")?;

        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Identity>> {
        let query = r"
            SELECT
                id, username, email, password_hash, full_name, role,
                is_active, is_verified, created_at, updated_at, last_login_at, metadata
            FROM users
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity by id")?;

        row.as_ref().map(identity_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let query = r"
            SELECT
                id, username, email, password_hash, full_name, role,
                is_active, is_verified, created_at, updated_at, last_login_at, metadata
            FROM users
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity by email")?;

        row.as_ref().map(identity_from_row).transpose()
    }

    async fn record_login(&self, id: i64) -> Result<()> {
        let query = r"
            UPDATE users
            SET last_login_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login")?;
        Ok(())
    }

    async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
        let query = r"
            UPDATE users
            SET password_hash = $1, updated_at = NOW()
            WHERE id = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        Ok(())
    }
}

fn identity_from_row(row: &PgRow) -> Result<Identity> {
    let role: String = row.get("role");
    let role = role.parse::<Role>().context("invalid role in identity row")?;
    Ok(Identity {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        role,
        is_active: row.get("is_active"),
        is_verified: row.get("is_verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_login_at: row.get("last_login_at"),
        metadata: row.get("metadata"),
    })
}

fn unique_violation_constraint(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.code().is_some_and(|code| code == "23505") => {
            Some(db_err.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory identity store for exercising the auth core without Postgres.

    use super::{Identity, IdentityStore, Role};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::{collections::HashMap, sync::Mutex};

    pub(crate) struct MemoryIdentityStore {
        identities: Mutex<HashMap<i64, Identity>>,
    }

    impl MemoryIdentityStore {
        pub(crate) fn new() -> Self {
            Self {
                identities: Mutex::new(HashMap::new()),
            }
        }

        pub(crate) fn insert(&self, identity: Identity) {
            self.identities
                .lock()
                .expect("identity map poisoned")
                .insert(identity.id, identity);
        }

        pub(crate) fn set_active(&self, id: i64, active: bool) {
            if let Some(identity) = self
                .identities
                .lock()
                .expect("identity map poisoned")
                .get_mut(&id)
            {
                identity.is_active = active;
            }
        }

        pub(crate) fn password_hash(&self, id: i64) -> Option<String> {
            self.identities
                .lock()
                .expect("identity map poisoned")
                .get(&id)
                .map(|identity| identity.password_hash.clone())
        }
    }

    #[async_trait]
    impl IdentityStore for MemoryIdentityStore {
        async fn find_by_username(&self, username: &str) -> Result<Option<Identity>> {
            Ok(self
                .identities
                .lock()
                .expect("identity map poisoned")
                .values()
                .find(|identity| identity.username == username)
                .cloned())
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<Identity>> {
            Ok(self
                .identities
                .lock()
                .expect("identity map poisoned")
                .get(&id)
                .cloned())
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
            Ok(self
                .identities
                .lock()
                .expect("identity map poisoned")
                .values()
                .find(|identity| identity.email.as_deref() == Some(email))
                .cloned())
        }

        async fn record_login(&self, id: i64) -> Result<()> {
            if let Some(identity) = self
                .identities
                .lock()
                .expect("identity map poisoned")
                .get_mut(&id)
            {
                identity.last_login_at = Some(Utc::now());
            }
            Ok(())
        }

        async fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
            if let Some(identity) = self
                .identities
                .lock()
                .expect("identity map poisoned")
                .get_mut(&id)
            {
                identity.password_hash = password_hash.to_string();
            }
            Ok(())
        }
    }

    /// Build an identity with sensible defaults for tests.
    pub(crate) fn identity(id: i64, username: &str, role: Role, password_hash: &str) -> Identity {
        let now = Utc::now();
        Identity {
            id,
            username: username.to_string(),
            email: Some(format!("{username}@example.com")),
            password_hash: password_hash.to_string(),
            full_name: None,
            role,
            is_active: true,
            is_verified: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
            metadata: serde_json::json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CreateOutcome, IdentityFilter, UpdateOutcome};

    #[test]
    fn create_outcome_debug_names() {
        assert_eq!(format!("{:?}", CreateOutcome::UsernameTaken), "UsernameTaken");
        assert_eq!(format!("{:?}", CreateOutcome::EmailTaken), "EmailTaken");
    }

    #[test]
    fn update_outcome_debug_names() {
        assert_eq!(format!("{:?}", UpdateOutcome::NotFound), "NotFound");
        assert_eq!(format!("{:?}", UpdateOutcome::EmailTaken), "EmailTaken");
    }

    #[test]
    fn identity_filter_defaults_to_no_window() {
        let filter = IdentityFilter::default();
        assert_eq!(filter.limit, 0);
        assert_eq!(filter.offset, 0);
        assert!(filter.role.is_none());
        assert!(filter.is_active.is_none());
    }
}
