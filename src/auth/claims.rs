/// JWT Claims structure
///
/// Represents the payload of a signed token: the account it belongs to
/// (username and credential id), when it was issued and expires, and whether
/// it is an access or a refresh token. The credential id ties the token to
/// one account even if the username is later freed and taken by someone else. Every token also carries a unique `jti` so that two tokens issued
/// for the same subject in the same second are still distinct strings.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Credential id of the subject
    pub uid: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Unique token id
    pub jti: String,
    pub kind: TokenKind,
}

impl Claims {
    /// Create new claims
    ///
    /// # Arguments
    /// * `subject` - Username the token is issued to
    /// * `user_id` - Credential id of that username
    /// * `kind` - Access or refresh
    /// * `expiry_seconds` - Token lifetime in seconds from now
    /// * `issuer` - Issuer identifier
    pub fn new(
        subject: &str,
        user_id: Uuid,
        kind: TokenKind,
        expiry_seconds: i64,
        issuer: &str,
    ) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: subject.to_string(),
            uid: user_id.to_string(),
            iat: now,
            exp: now + expiry_seconds,
            iss: issuer.to_string(),
            jti: Uuid::new_v4().to_string(),
            kind,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// Credential id the token was issued for
    ///
    /// # Errors
    /// `TokenMalformed` if the claim is not a UUID
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.uid).map_err(|_| AuthError::TokenMalformed)
    }
}
