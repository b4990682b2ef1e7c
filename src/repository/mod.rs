/// Repository module
///
/// Storage for credentials and revoked refresh tokens. Each concern is a
/// trait with an in-memory implementation and a Postgres implementation;
/// the backend is picked from settings at startup.

mod credentials;
mod postgres;
mod revocation;

use std::future::Future;
use std::time::Duration;

use crate::error::AuthError;

pub use credentials::{
    Credential, CredentialStore, CredentialUpdate, InMemoryCredentialStore,
};
pub use postgres::{PgCredentialStore, PgRevocationLedger};
pub use revocation::{hash_token, InMemoryRevocationLedger, RevocationLedger, RevokedTokenEntry};

/// Run a store call with an upper bound on its duration.
///
/// Elapsed deadlines surface as `RepositoryUnavailable`, the one retryable
/// error kind.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, AuthError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future).await.map_err(|_| {
        tracing::warn!(timeout_ms = duration.as_millis() as u64, "Repository call timed out");
        AuthError::RepositoryUnavailable(format!(
            "operation timed out after {}ms",
            duration.as_millis()
        ))
    })
}
