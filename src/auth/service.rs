/// Authentication Service
///
/// Orchestrates the credential store, the token issuer and the revocation
/// ledger into the session lifecycle:
///
/// Anonymous -> Authenticated (login) -> Refreshed (refresh, repeatable)
///           -> Revoked (logout or replay) | Expired
///
/// Holds no state of its own; everything lives in the stores, so the service
/// is cheap to clone into every worker.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::auth::jwt::{TokenIssuer, TokenPair};
use crate::error::AuthError;
use crate::repository::{Credential, CredentialStore, CredentialUpdate, RevocationLedger};

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    revocations: Arc<dyn RevocationLedger>,
    issuer: Arc<TokenIssuer>,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        revocations: Arc<dyn RevocationLedger>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            credentials,
            revocations,
            issuer: Arc::new(issuer),
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn revocations(&self) -> Arc<dyn RevocationLedger> {
        self.revocations.clone()
    }

    pub async fn register(&self, username: &str, password: &str) -> Result<Uuid, AuthError> {
        let id = self.credentials.create(username, password).await?;
        tracing::info!(user_id = %id, "Account registered");
        Ok(id)
    }

    /// Exchange a username and password for a token pair
    ///
    /// Unknown usernames and wrong passwords both fail with
    /// `AuthenticationFailed`.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let id = match self.credentials.verify(username, password).await {
            Ok(id) => id,
            Err(AuthError::NotFound) | Err(AuthError::InvalidPassword) => {
                tracing::info!("Login rejected");
                return Err(AuthError::AuthenticationFailed);
            }
            Err(e) => return Err(e),
        };

        self.issuer.issue_pair(username, id)
    }

    /// Rotate a refresh token
    ///
    /// The presented token is spent whether or not the caller uses the new
    /// pair. Of several concurrent calls with the same token exactly one
    /// succeeds; the rest fail with `TokenRevoked`. A token whose credential
    /// was deleted is `TokenRevoked` too, even if the username has been
    /// registered again since.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.issuer.decode_kind(refresh_token, TokenKind::Refresh)?;
        let credential = match self.credentials.find_by_id(claims.user_id()?).await? {
            Some(credential) => credential,
            None => {
                tracing::warn!(jti = %claims.jti, "Refresh token for a deleted credential");
                return Err(AuthError::TokenRevoked);
            }
        };

        let spent_now = self
            .revocations
            .check_and_revoke(refresh_token, claims.expires_at())
            .await?;
        if !spent_now {
            tracing::warn!(jti = %claims.jti, "Refresh token replay rejected");
            return Err(AuthError::TokenRevoked);
        }

        // Current username, so a rename shows up in the next pair
        self.issuer.issue_pair(&credential.username, credential.id)
    }

    /// Give up a refresh token
    ///
    /// Invalid tokens are not an error, but only a token this service signed
    /// is recorded. Anything that fails to decode, expired tokens included,
    /// can never be refreshed and leaves the ledger untouched.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        match self.issuer.decode(refresh_token) {
            Ok(claims) => {
                self.revocations
                    .revoke(refresh_token, claims.expires_at())
                    .await
            }
            Err(e) => {
                tracing::debug!(error = %e, "Logout with an unusable token, nothing to revoke");
                Ok(())
            }
        }
    }

    /// Validate an access token presented to a protected route
    ///
    /// The token must carry a readable `uid`; account routes go by that id.
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        let claims = self.issuer.decode_kind(access_token, TokenKind::Access)?;
        claims.user_id()?;
        Ok(claims)
    }

    /// Credential a token's `uid` points at
    pub async fn account(&self, user_id: Uuid) -> Result<Credential, AuthError> {
        self.credentials
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::NotFound)
    }

    pub async fn update_account(
        &self,
        user_id: Uuid,
        update: CredentialUpdate,
    ) -> Result<(), AuthError> {
        self.credentials.update(user_id, update).await?;
        tracing::info!(user_id = %user_id, "Account updated");
        Ok(())
    }

    pub async fn delete_account(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.credentials.delete_by_id(user_id).await?;
        tracing::info!(user_id = %user_id, "Account deleted");
        Ok(())
    }
}
