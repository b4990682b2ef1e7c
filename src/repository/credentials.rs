/// Credential Storage
///
/// Maps usernames to credential records. Guarantees:
/// - usernames are unique (case-sensitive), even under concurrent `create`
/// - the id of a record never changes
/// - username and password hash change together or not at all
///
/// Password hashing always happens before a lock is taken.

use std::collections::HashMap;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::auth::PasswordHasher;
use crate::error::AuthError;
use crate::repository::with_timeout;

const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Stored account credential
#[derive(Clone)]
pub struct Credential {
    pub id: Uuid,
    pub username: String,
    pub(crate) password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub(crate) fn new(username: &str, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            created_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password_hash", &"[redacted]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Fields an update may touch. Anything else is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialField {
    Username,
    Password,
}

impl FromStr for CredentialField {
    type Err = AuthError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "username" => Ok(CredentialField::Username),
            "password" => Ok(CredentialField::Password),
            other => Err(AuthError::ImmutableField(other.to_string())),
        }
    }
}

/// Requested change to a credential
#[derive(Clone, Default)]
pub struct CredentialUpdate {
    username: Option<String>,
    password: Option<String>,
}

impl CredentialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Build an update from raw `(field, value)` pairs, e.g. a JSON body.
    ///
    /// # Errors
    /// `ImmutableField` for `id`, `user_id`, or any name other than
    /// `username` and `password`
    pub fn from_fields<I, K, V>(fields: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut update = Self::new();
        for (name, value) in fields {
            update = match name.as_ref().parse::<CredentialField>()? {
                CredentialField::Username => update.username(value),
                CredentialField::Password => update.password(value),
            };
        }
        Ok(update)
    }

    pub fn new_username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn new_password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }
}

impl std::fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create a credential and return its id
    ///
    /// # Errors
    /// `DuplicateUsername` if the username is taken. Of several concurrent
    /// calls with the same username exactly one succeeds.
    async fn create(&self, username: &str, password: &str) -> Result<Uuid, AuthError>;

    async fn find(&self, username: &str) -> Result<Option<Credential>, AuthError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, AuthError>;

    /// Check a username/password pair and return the id of the matching
    /// credential
    ///
    /// # Errors
    /// `NotFound` for an unknown username, `InvalidPassword` on mismatch
    async fn verify(&self, username: &str, password: &str) -> Result<Uuid, AuthError>;

    /// Apply an update to the credential with the given id
    ///
    /// # Errors
    /// - `NotFound` if no credential has this id
    /// - `PasswordUnchanged` if the new password matches the current one
    /// - `DuplicateUsername` if the new username belongs to another record
    async fn update(&self, id: Uuid, update: CredentialUpdate) -> Result<(), AuthError>;

    /// Remove a credential. Removing an unknown username is not an error.
    async fn delete(&self, username: &str) -> Result<(), AuthError>;

    /// Remove the credential with the given id, if it still exists.
    async fn delete_by_id(&self, id: Uuid) -> Result<(), AuthError>;
}

/// Compare a password with a looked-up credential, burning the same CPU when
/// the credential does not exist.
pub(crate) async fn check_password(
    hasher: &PasswordHasher,
    credential: Option<Credential>,
    password: &str,
) -> Result<Uuid, AuthError> {
    match credential {
        None => {
            hasher.verify_dummy_blocking(password.to_string()).await?;
            Err(AuthError::NotFound)
        }
        Some(credential) => {
            let matches = hasher
                .verify_blocking(password.to_string(), credential.password_hash)
                .await?;
            if matches {
                Ok(credential.id)
            } else {
                Err(AuthError::InvalidPassword)
            }
        }
    }
}

/// Hash a replacement password, refusing one equal to the current password.
pub(crate) async fn prepare_password_change(
    hasher: &PasswordHasher,
    current_hash: &str,
    new_password: &str,
) -> Result<String, AuthError> {
    let unchanged = hasher
        .verify_blocking(new_password.to_string(), current_hash.to_string())
        .await?;
    if unchanged {
        return Err(AuthError::PasswordUnchanged);
    }
    hasher.hash_blocking(new_password.to_string()).await
}

/// Drive an optimistic update until one attempt commits.
///
/// `attempt` returns `Ok(false)` when the record changed between its read and
/// its write. After `MAX_UPDATE_ATTEMPTS` such rounds the update gives up with
/// `RepositoryUnavailable`.
pub(crate) async fn commit_with_retries<F, Fut>(
    id: Uuid,
    mut attempt: F,
) -> Result<(), AuthError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, AuthError>>,
{
    for round in 0..MAX_UPDATE_ATTEMPTS {
        if attempt().await? {
            tracing::debug!(user_id = %id, "Credential updated");
            return Ok(());
        }
        tracing::debug!(user_id = %id, round, "Credential changed during update, retrying");
    }

    Err(AuthError::RepositoryUnavailable(
        "credential update kept conflicting with concurrent changes".to_string(),
    ))
}

#[derive(Default)]
struct CredentialTable {
    by_id: HashMap<Uuid, Credential>,
    ids_by_username: HashMap<String, Uuid>,
}

impl CredentialTable {
    fn get_by_username(&self, username: &str) -> Option<&Credential> {
        self.ids_by_username
            .get(username)
            .and_then(|id| self.by_id.get(id))
    }

    fn username_taken_by_other(&self, username: &str, id: Uuid) -> bool {
        matches!(self.ids_by_username.get(username), Some(owner) if *owner != id)
    }

    fn apply(&mut self, id: Uuid, username: Option<&str>, password_hash: Option<String>) {
        let Some(credential) = self.by_id.get_mut(&id) else {
            return;
        };

        if let Some(username) = username {
            if credential.username != username {
                self.ids_by_username.remove(&credential.username);
                self.ids_by_username.insert(username.to_string(), id);
                credential.username = username.to_string();
            }
        }

        if let Some(password_hash) = password_hash {
            credential.password_hash = password_hash;
        }
    }
}

/// Process-local credential store
pub struct InMemoryCredentialStore {
    table: RwLock<CredentialTable>,
    hasher: PasswordHasher,
    timeout: Duration,
}

impl InMemoryCredentialStore {
    pub fn new(hasher: PasswordHasher, timeout: Duration) -> Self {
        Self {
            table: RwLock::new(CredentialTable::default()),
            hasher,
            timeout,
        }
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, CredentialTable>, AuthError> {
        with_timeout(self.timeout, self.table.read()).await
    }

    async fn write(&self) -> Result<RwLockWriteGuard<'_, CredentialTable>, AuthError> {
        with_timeout(self.timeout, self.table.write()).await
    }

    async fn attempt_update(&self, id: Uuid, update: &CredentialUpdate) -> Result<bool, AuthError> {
        let current = self.find_by_id(id).await?.ok_or(AuthError::NotFound)?;
        if update.is_empty() {
            return Ok(true);
        }

        if let Some(username) = update.new_username() {
            if self.read().await?.username_taken_by_other(username, id) {
                return Err(AuthError::DuplicateUsername);
            }
        }

        let new_hash = match update.new_password() {
            Some(password) => Some(
                prepare_password_change(&self.hasher, &current.password_hash, password).await?,
            ),
            None => None,
        };

        self.try_commit(id, &current.password_hash, update.new_username(), new_hash)
            .await
    }

    /// Apply a prepared change if the stored hash is still `expected_hash`.
    ///
    /// The username check is repeated here because a concurrent `create` or
    /// rename may have claimed the name since it was first checked.
    async fn try_commit(
        &self,
        id: Uuid,
        expected_hash: &str,
        username: Option<&str>,
        password_hash: Option<String>,
    ) -> Result<bool, AuthError> {
        let mut table = self.write().await?;
        match table.by_id.get(&id) {
            None => return Err(AuthError::NotFound),
            Some(stored) if stored.password_hash != expected_hash => return Ok(false),
            Some(_) => {}
        }
        if let Some(username) = username {
            if table.username_taken_by_other(username, id) {
                return Err(AuthError::DuplicateUsername);
            }
        }

        table.apply(id, username, password_hash);
        Ok(true)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create(&self, username: &str, password: &str) -> Result<Uuid, AuthError> {
        // Early exit saves a hash; the write lock below is the real check.
        let taken = self.read().await?.ids_by_username.contains_key(username);
        if taken {
            return Err(AuthError::DuplicateUsername);
        }

        let password_hash = self.hasher.hash_blocking(password.to_string()).await?;
        let credential = Credential::new(username, password_hash);
        let id = credential.id;

        let mut table = self.write().await?;
        if table.ids_by_username.contains_key(username) {
            return Err(AuthError::DuplicateUsername);
        }
        table.ids_by_username.insert(username.to_string(), id);
        table.by_id.insert(id, credential);

        tracing::debug!(user_id = %id, "Credential created");
        Ok(id)
    }

    async fn find(&self, username: &str) -> Result<Option<Credential>, AuthError> {
        Ok(self.read().await?.get_by_username(username).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Credential>, AuthError> {
        Ok(self.read().await?.by_id.get(&id).cloned())
    }

    async fn verify(&self, username: &str, password: &str) -> Result<Uuid, AuthError> {
        let credential = self.read().await?.get_by_username(username).cloned();
        check_password(&self.hasher, credential, password).await
    }

    async fn update(&self, id: Uuid, update: CredentialUpdate) -> Result<(), AuthError> {
        let update = &update;
        commit_with_retries(id, move || self.attempt_update(id, update)).await
    }

    async fn delete(&self, username: &str) -> Result<(), AuthError> {
        let mut table = self.write().await?;
        if let Some(id) = table.ids_by_username.remove(username) {
            table.by_id.remove(&id);
            tracing::debug!(user_id = %id, "Credential deleted");
        }
        Ok(())
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), AuthError> {
        let mut table = self.write().await?;
        if let Some(credential) = table.by_id.remove(&id) {
            table.ids_by_username.remove(&credential.username);
            tracing::debug!(user_id = %id, "Credential deleted");
        }
        Ok(())
    }
}
