/// Revocation Ledger
///
/// Records refresh tokens that may no longer be exchanged: tokens consumed by
/// a refresh and tokens given up at logout. Entries are keyed by the SHA-256
/// hash of the token so plaintext tokens are never stored, and kept until
/// the token would have expired anyway.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::AuthError;
use crate::repository::with_timeout;

/// Entry count above which inserts also sweep expired entries.
const PRUNE_THRESHOLD: usize = 10_000;

/// Hash a token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedTokenEntry {
    pub token_hash: String,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RevokedTokenEntry {
    pub fn new(token: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            token_hash: hash_token(token),
            revoked_at: Utc::now(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Record a token as revoked. Revoking twice is not an error.
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError>;

    async fn is_revoked(&self, token: &str) -> Result<bool, AuthError>;

    /// Revoke a token unless it already was, in one atomic step.
    ///
    /// Returns `true` for the single caller that performed the revocation and
    /// `false` for everyone else.
    async fn check_and_revoke(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Drop entries whose token has expired, returning how many were removed
    async fn prune_expired(&self) -> Result<usize, AuthError>;
}

/// Process-local revocation ledger
pub struct InMemoryRevocationLedger {
    entries: Mutex<HashMap<String, RevokedTokenEntry>>,
    timeout: Duration,
}

impl InMemoryRevocationLedger {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    async fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, RevokedTokenEntry>>, AuthError> {
        with_timeout(self.timeout, self.entries.lock()).await
    }

    fn insert(entries: &mut HashMap<String, RevokedTokenEntry>, entry: RevokedTokenEntry) {
        if entries.len() >= PRUNE_THRESHOLD {
            let removed = sweep(entries);
            tracing::debug!(removed, "Pruned revocation ledger on insert");
        }
        entries.insert(entry.token_hash.clone(), entry);
    }
}

fn sweep(entries: &mut HashMap<String, RevokedTokenEntry>) -> usize {
    let now = Utc::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

#[async_trait]
impl RevocationLedger for InMemoryRevocationLedger {
    async fn revoke(&self, token: &str, expires_at: DateTime<Utc>) -> Result<(), AuthError> {
        let entry = RevokedTokenEntry::new(token, expires_at);
        let mut entries = self.lock().await?;
        if !entries.contains_key(&entry.token_hash) {
            Self::insert(&mut entries, entry);
        }
        Ok(())
    }

    async fn is_revoked(&self, token: &str) -> Result<bool, AuthError> {
        let token_hash = hash_token(token);
        Ok(self.lock().await?.contains_key(&token_hash))
    }

    async fn check_and_revoke(
        &self,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let entry = RevokedTokenEntry::new(token, expires_at);
        let mut entries = self.lock().await?;
        if entries.contains_key(&entry.token_hash) {
            return Ok(false);
        }
        Self::insert(&mut entries, entry);
        Ok(true)
    }

    async fn prune_expired(&self) -> Result<usize, AuthError> {
        let mut entries = self.lock().await?;
        Ok(sweep(&mut entries))
    }
}
