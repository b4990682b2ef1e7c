/// Postgres-backed stores
///
/// Same contracts as the in-memory stores. Uniqueness and single-winner
/// revocation are enforced by the database (`UNIQUE` on `credentials.username`,
/// primary key on `revoked_tokens.token_hash`), not by application locks.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::PasswordHasher;
use crate::error::AuthError;
use crate::repository::credentials::{
    check_password, commit_with_retries, prepare_password_change,
};
use crate::repository::revocation::RevokedTokenEntry;
use crate::repository::{
    hash_token, with_timeout, Credential, CredentialStore, CredentialUpdate, RevocationLedger,
};

const UNIQUE_VIOLATION: &str = "23505";

fn map_sqlx_error(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            AuthError::DuplicateUsername
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            tracing::warn!(error = %err, "Database unreachable");
            AuthError::RepositoryUnavailable(err.to_string())
        }
        _ => AuthError::Internal(format!("Database error: {}", err)),
    }
}

async fn run<F, T>(timeout: Duration, query: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    with_timeout(timeout, query).await?.map_err(map_sqlx_error)
}

type CredentialRow = (Uuid, String, String, DateTime<Utc>);

fn into_credential((id, username, password_hash, created_at): CredentialRow) -> Credential {
    Credential {
        id,
        username,
        password_hash,
        created_at,
    }
}

pub struct PgCredentialStore {
    pool: PgPool,
    hasher: PasswordHasher,
    timeout: Duration,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool, hasher: PasswordHasher, timeout: Duration) -> Self {
        Self {
            pool,
            hasher,
            timeout,
        }
    }

    async fn attempt_update(&self, id: Uuid, update: &CredentialUpdate) -> Result<bool, AuthError> {
        let current = self.find_by_id(id).await?.ok_or(AuthError::NotFound)?;
        if update.is_empty() {
            return Ok(true);
        }

        let new_hash = match update.new_password() {
            Some(password) => Some(
                prepare_password_change(&self.hasher, &current.password_hash, password).await?,
            ),
            None => None,
        };

        self.try_commit(id, &current.password_hash, update.new_username(), new_hash.as_deref())
            .await
    }

    /// Write the change only if the stored hash is still `expected_hash`.
    ///
    /// Zero affected rows means a concurrent password change or delete won;
    /// a username taken in the meantime fails on the UNIQUE constraint.
    async fn try_commit(
        &self,
        id: Uuid,
        expected_hash: &str,
        username: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<bool, AuthError> {
        let result = run(
            self.timeout,
            sqlx::query(
                r#"
                UPDATE credentials
                SET username = COALESCE($2, username),
                    password_hash = COALESCE($3, password_hash)
                WHERE id = $1 AND password_hash = $4
                "#,
            )
            .bind(id)
            .bind(username)
            .bind(password_hash)
            .bind(expected_hash)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(&self, username: &str, password: &str) -> Result<Uuid, AuthError> {
        let password_hash = self.hasher.hash_blocking(password.to_string()).await?;
        let credential = Credential::new(username, password_hash);

        run(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO credentials (id, username, password_hash, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(credential.id)
            .bind(&credential.username)
            .bind(&credential.password_hash)
            .bind(credential.created_at)
            .execute(&self.pool),
        )
        .await?;

        tracing::debug!(user_id = %credential.id, "Credential created");
        Ok(credential.id)
    }

    async fn find(&self, username: &str) -> Result<Option<Credential>, AuthError> {
        let row = run(
            self.timeout,
            sqlx::query_as::<_, CredentialRow>(
                "SELECT id, username, password_hash, created_at FROM credentials WHERE username = $1",
            )
            .bind(username)
            .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(into_credential))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, AuthError> {
        let row = run(
            self.timeout,
            sqlx::query_as::<_, CredentialRow>(
                "SELECT id, username, password_hash, created_at FROM credentials WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(into_credential))
    }

    async fn verify(&self, username: &str, password: &str) -> Result<Uuid, AuthError> {
        let credential = self.find(username).await?;
        check_password(&self.hasher, credential, password).await
    }

    async fn update(&self, id: Uuid, update: CredentialUpdate) -> Result<(), AuthError> {
        let update = &update;
        commit_with_retries(id, move || self.attempt_update(id, update)).await
    }

    async fn delete(&self, username: &str) -> Result<(), AuthError> {
        run(
            self.timeout,
            sqlx::query("DELETE FROM credentials WHERE username = $1")
                .bind(username)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), AuthError> {
        run(
            self.timeout,
            sqlx::query("DELETE FROM credentials WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

pub struct PgRevocationLedger {
    pool: PgPool,
    timeout: Duration,
}

impl PgRevocationLedger {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn insert(&self, entry: &RevokedTokenEntry) -> Result<bool, AuthError> {
        let result = run(
            self.timeout,
            sqlx::query(
                r#"
                INSERT INTO revoked_tokens (token_hash, revoked_at, expires_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (token_hash) DO NOTHING
                "#,
            )
            .bind(&entry.token_hash)
            .bind(entry.revoked_at)
            .bind(entry.expires_at)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl RevocationLedger for PgRevocationLedger {
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        self.insert(&RevokedTokenEntry::new(token, expires_at))
            .await
            .map(|_| ())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, AuthError> {
        run(
            self.timeout,
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE token_hash = $1)",
            )
            .bind(hash_token(token))
            .fetch_one(&self.pool),
        )
        .await
    }

    async fn check_and_revoke(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        self.insert(&RevokedTokenEntry::new(token, expires_at)).await
    }

    async fn prune_expired(&self) -> Result<usize, AuthError> {
        let result = run(
            self.timeout,
            sqlx::query("DELETE FROM revoked_tokens WHERE expires_at <= $1")
                .bind(Utc::now())
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() as usize)
    }
}
