/// Password Hashing and Verification
///
/// bcrypt with a configurable cost. Hashes are salted, so hashing the same
/// password twice gives two different strings; `verify` compares in constant
/// time. The async variants move the work to tokio's blocking pool so that a
/// slow hash never stalls request handling or runs under a store lock.

use bcrypt::{hash, verify};

use crate::error::AuthError;

/// Plaintext used to build the decoy hash. Its value is irrelevant.
const DUMMY_PASSWORD: &str = "movietrack-timing-equalizer";

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: String,
}

impl PasswordHasher {
    /// Create a hasher with the given bcrypt cost
    ///
    /// # Errors
    /// Returns error if the cost is outside bcrypt's accepted range
    pub fn new(cost: u32) -> Result<Self, AuthError> {
        let dummy_hash = hash(DUMMY_PASSWORD, cost)
            .map_err(|e| AuthError::Internal(format!("Invalid bcrypt cost {}: {}", cost, e)))?;
        Ok(Self { cost, dummy_hash })
    }

    /// Hash a password using bcrypt
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        hash(password, self.cost)
            .map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against its hash
    ///
    /// # Errors
    /// Returns error if the stored hash is not a valid bcrypt string
    pub fn verify(&self, password: &str, password_hash: &str) -> Result<bool, AuthError> {
        verify(password, password_hash)
            .map_err(|e| AuthError::Internal(format!("Password verification failed: {}", e)))
    }

    /// Spend one verification worth of CPU against a decoy hash.
    ///
    /// Called when the username does not exist so that response time does not
    /// reveal whether an account is registered.
    pub fn verify_dummy(&self, password: &str) {
        let _ = verify(password, &self.dummy_hash);
    }

    pub async fn hash_blocking(&self, password: String) -> Result<String, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing worker failed: {}", e)))?
    }

    pub async fn verify_blocking(
        &self,
        password: String,
        password_hash: String,
    ) -> Result<bool, AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify(&password, &password_hash))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing worker failed: {}", e)))?
    }

    pub async fn verify_dummy_blocking(&self, password: String) -> Result<(), AuthError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || hasher.verify_dummy(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Hashing worker failed: {}", e)))
    }
}

// Neither the cost nor the decoy hash are secrets, but keep hashes out of logs
// as a rule.
impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher")
            .field("cost", &self.cost)
            .finish_non_exhaustive()
    }
}
