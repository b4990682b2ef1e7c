/// JWT Token Generation and Validation
///
/// `TokenIssuer` owns the signing material for the lifetime of the process.
/// It is built once from `JwtSettings` at startup and never mutated; decoding
/// is pure computation over the token and the key, so no locking is needed.

use std::str::FromStr;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::{Claims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AuthError, ConfigError};

const MIN_SECRET_LENGTH: usize = 32;

/// Access and refresh token minted together
#[derive(Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair").finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    header: Header,
    validation: Validation,
    issuer: String,
    access_ttl: i64,
    refresh_ttl: i64,
}

impl TokenIssuer {
    /// Build the issuer from settings
    ///
    /// # Errors
    /// Returns a configuration error if:
    /// - the secret is shorter than 32 bytes
    /// - the algorithm is unknown or not an HMAC algorithm
    /// - the access TTL is not positive, or the refresh TTL does not exceed it
    pub fn new(config: &JwtSettings) -> Result<Self, ConfigError> {
        if config.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} bytes",
                MIN_SECRET_LENGTH
            )));
        }

        let algorithm = Algorithm::from_str(&config.algorithm).map_err(|_| {
            ConfigError::InvalidValue(format!("unknown jwt.algorithm '{}'", config.algorithm))
        })?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.algorithm '{}' is not an HMAC algorithm",
                config.algorithm
            )));
        }

        if config.access_token_expiry <= 0 {
            return Err(ConfigError::InvalidValue(
                "jwt.access_token_expiry must be positive".to_string(),
            ));
        }
        if config.refresh_token_expiry <= config.access_token_expiry {
            return Err(ConfigError::InvalidValue(
                "jwt.refresh_token_expiry must exceed jwt.access_token_expiry".to_string(),
            ));
        }

        let mut validation = Validation::new(algorithm);
        // Verify issuer matches configuration
        validation.set_issuer(&[&config.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            header: Header::new(algorithm),
            validation,
            issuer: config.issuer.clone(),
            access_ttl: config.access_token_expiry,
            refresh_ttl: config.refresh_token_expiry,
        })
    }

    pub fn access_ttl(&self) -> i64 {
        self.access_ttl
    }

    /// Generate a new access token for a subject
    pub fn issue_access(&self, subject: &str, user_id: Uuid) -> Result<String, AuthError> {
        self.sign(&Claims::new(
            subject,
            user_id,
            TokenKind::Access,
            self.access_ttl,
            &self.issuer,
        ))
    }

    /// Generate a new refresh token for a subject
    pub fn issue_refresh(&self, subject: &str, user_id: Uuid) -> Result<String, AuthError> {
        self.sign(&Claims::new(
            subject,
            user_id,
            TokenKind::Refresh,
            self.refresh_ttl,
            &self.issuer,
        ))
    }

    pub fn issue_pair(&self, subject: &str, user_id: Uuid) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue_access(subject, user_id)?,
            refresh_token: self.issue_refresh(subject, user_id)?,
        })
    }

    pub(crate) fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        encode(&self.header, claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Validate and extract claims from a token
    ///
    /// The signature and algorithm are checked before anything else: a
    /// token that is not correctly signed is `TokenMalformed` whatever its
    /// claimed expiry. Only a correctly signed token can be `TokenExpired`.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    tracing::debug!(reason = %e, "Token rejected");
                    AuthError::TokenMalformed
                }
            })
    }

    /// Decode a token and require a specific kind
    pub fn decode_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.decode(token)?;
        if claims.kind != kind {
            tracing::debug!(expected = %kind, actual = %claims.kind, "Token kind mismatch");
            return Err(AuthError::TokenMalformed);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            algorithm: "HS256".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
        }
    }

    fn test_issuer() -> TokenIssuer {
        TokenIssuer::new(&get_test_config()).expect("valid test config")
    }

    #[test]
    fn test_issue_and_decode_access_token() {
        let issuer = test_issuer();
        let user_id = Uuid::new_v4();
        let token = issuer
            .issue_access("alice", user_id)
            .expect("Failed to generate token");
        let claims = issuer.decode(&token).expect("Failed to validate token");

        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.user_id(), Ok(user_id));
        assert_eq!(claims.kind, TokenKind::Access);
        assert_eq!(claims.iss, "test");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn test_refresh_token_outlives_access_token() {
        let issuer = test_issuer();
        let pair = issuer.issue_pair("alice", Uuid::new_v4()).unwrap();

        let access = issuer.decode(&pair.access_token).unwrap();
        let refresh = issuer.decode(&pair.refresh_token).unwrap();

        assert_eq!(refresh.kind, TokenKind::Refresh);
        assert!(refresh.exp > access.exp);
        assert_ne!(pair.access_token, pair.refresh_token);
    }

    #[test]
    fn test_invalid_token() {
        let issuer = test_issuer();
        assert_eq!(
            issuer.decode("invalid.token.here"),
            Err(AuthError::TokenMalformed)
        );
        assert_eq!(issuer.decode(""), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_tampered_token() {
        let issuer = test_issuer();
        let token = issuer.issue_access("alice", Uuid::new_v4()).unwrap();

        // Tamper with token
        let tampered = format!("{}X", token);
        assert_eq!(issuer.decode(&tampered), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_wrong_secret() {
        let issuer = test_issuer();
        let mut other_config = get_test_config();
        other_config.secret = "another-secret-key-at-least-32-characters".to_string();
        let other = TokenIssuer::new(&other_config).unwrap();

        let token = other.issue_access("alice", Uuid::new_v4()).unwrap();
        assert_eq!(issuer.decode(&token), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_wrong_algorithm() {
        let issuer = test_issuer();
        let mut other_config = get_test_config();
        other_config.algorithm = "HS512".to_string();
        let other = TokenIssuer::new(&other_config).unwrap();

        // Same secret, different algorithm
        let token = other.issue_access("alice", Uuid::new_v4()).unwrap();
        assert_eq!(issuer.decode(&token), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_unsigned_token() {
        let issuer = test_issuer();
        // {"alg":"none","typ":"JWT"} . {"sub":"alice","exp":9999999999,...}
        let unsigned = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.\
            eyJzdWIiOiJhbGljZSIsImlhdCI6MCwiZXhwIjo5OTk5OTk5OTk5LCJpc3MiOiJ0ZXN0Iiwian\
            RpIjoieCIsImtpbmQiOiJhY2Nlc3MifQ.";
        assert_eq!(issuer.decode(unsigned), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_wrong_issuer() {
        let mut config = get_test_config();
        let token = TokenIssuer::new(&config)
            .unwrap()
            .issue_access("alice", Uuid::new_v4())
            .unwrap();

        // Change issuer in validation config
        config.issuer = "wrong-issuer".to_string();
        let result = TokenIssuer::new(&config).unwrap().decode(&token);

        assert_eq!(result, Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_expired_token_with_valid_signature() {
        let issuer = test_issuer();
        let claims = Claims::new("alice", Uuid::new_v4(), TokenKind::Access, -5, "test");
        let token = issuer.sign(&claims).unwrap();

        assert_eq!(issuer.decode(&token), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_expired_and_forged_token_is_malformed() {
        let issuer = test_issuer();
        let mut other_config = get_test_config();
        other_config.secret = "another-secret-key-at-least-32-characters".to_string();
        let forger = TokenIssuer::new(&other_config).unwrap();

        let claims = Claims::new("alice", Uuid::new_v4(), TokenKind::Access, -5, "test");
        let token = forger.sign(&claims).unwrap();

        assert_eq!(issuer.decode(&token), Err(AuthError::TokenMalformed));
    }

    #[test]
    fn test_decode_kind_rejects_access_as_refresh() {
        let issuer = test_issuer();
        let access = issuer.issue_access("alice", Uuid::new_v4()).unwrap();

        assert_eq!(
            issuer.decode_kind(&access, TokenKind::Refresh),
            Err(AuthError::TokenMalformed)
        );
        assert!(issuer.decode_kind(&access, TokenKind::Access).is_ok());
    }

    #[test]
    fn test_rejects_short_secret() {
        let mut config = get_test_config();
        config.secret = "short".to_string();
        assert!(TokenIssuer::new(&config).is_err());
    }

    #[test]
    fn test_rejects_non_hmac_algorithm() {
        let mut config = get_test_config();
        config.algorithm = "RS256".to_string();
        assert!(TokenIssuer::new(&config).is_err());

        config.algorithm = "none".to_string();
        assert!(TokenIssuer::new(&config).is_err());
    }

    #[test]
    fn test_rejects_refresh_ttl_not_exceeding_access_ttl() {
        let mut config = get_test_config();
        config.refresh_token_expiry = config.access_token_expiry;
        assert!(TokenIssuer::new(&config).is_err());
    }
}
