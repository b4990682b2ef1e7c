/// Error Handling Module
///
/// Two layers:
/// 1. `AuthError`: the closed set of outcomes the credential and token core
///    can return. Transport-agnostic.
/// 2. `AppError`: what HTTP handlers return. Wraps `AuthError` together with
///    input validation and configuration failures, and maps each one to a
///    status code and a JSON body.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// ============================================================================
/// 1. CORE ERROR TAXONOMY
/// ============================================================================

/// Outcomes of credential storage, token handling and session operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    DuplicateUsername,
    NotFound,
    InvalidPassword,
    /// Login failure; does not reveal whether the username exists
    AuthenticationFailed,
    /// Field that cannot be changed through an update (carries the field name)
    ImmutableField(String),
    PasswordUnchanged,
    TokenMalformed,
    TokenExpired,
    TokenRevoked,
    /// Backing store timed out or refused the connection
    RepositoryUnavailable(String),
    /// Unexpected fault (corrupt hash, failed worker, encoder failure)
    Internal(String),
}

impl AuthError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::RepositoryUnavailable(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::DuplicateUsername => write!(f, "Username already registered"),
            AuthError::NotFound => write!(f, "Account not found"),
            AuthError::InvalidPassword => write!(f, "Invalid password"),
            AuthError::AuthenticationFailed => write!(f, "Invalid username or password"),
            AuthError::ImmutableField(field) => write!(f, "Field '{}' cannot be updated", field),
            AuthError::PasswordUnchanged => {
                write!(f, "New password cannot be the same as the old one")
            }
            AuthError::TokenMalformed => write!(f, "Invalid token"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::TokenRevoked => write!(f, "Token has been revoked"),
            AuthError::RepositoryUnavailable(msg) => write!(f, "Repository unavailable: {}", msg),
            AuthError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AuthError {}

/// Validation errors for request input
#[derive(Debug, Clone)]
pub enum ValidationError {
    EmptyField(String),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} bytes)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
        }
    }
}

impl StdError for ValidationError {}

/// Startup configuration errors. These are fatal: the process refuses to start.
#[derive(Debug)]
pub enum ConfigError {
    MissingRequired(String),
    InvalidValue(String),
    ParseError(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRequired(msg) => write!(f, "Missing required config: {}", msg),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
            ConfigError::ParseError(msg) => write!(f, "Config parse error: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// ============================================================================
/// 2. HTTP-FACING ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Auth(AuthError),
    Config(ConfigError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for AppError {}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Human-readable error message
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    /// HTTP status code
    pub status: u16,
    /// Timestamp when error occurred
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait ErrorHandler {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse);
    fn log_error(&self, request_id: &str);
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Auth(e) => match e {
                AuthError::DuplicateUsername => (StatusCode::CONFLICT, "DUPLICATE_USERNAME"),
                AuthError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                AuthError::InvalidPassword => (StatusCode::UNAUTHORIZED, "INVALID_PASSWORD"),
                AuthError::AuthenticationFailed => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS")
                }
                AuthError::ImmutableField(_) => (StatusCode::BAD_REQUEST, "IMMUTABLE_FIELD"),
                AuthError::PasswordUnchanged => (StatusCode::BAD_REQUEST, "PASSWORD_UNCHANGED"),
                AuthError::TokenMalformed => (StatusCode::UNAUTHORIZED, "TOKEN_INVALID"),
                AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "TOKEN_EXPIRED"),
                AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "TOKEN_REVOKED"),
                AuthError::RepositoryUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
                }
                AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        }
    }

    /// Message shown to clients. Server-side detail stays in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Auth(AuthError::RepositoryUnavailable(_)) => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Auth(AuthError::Internal(_)) => "Internal server error".to_string(),
            AppError::Config(_) => "Server configuration error".to_string(),
            other => other.to_string(),
        }
    }
}

impl ErrorHandler for AppError {
    fn error_response(&self, request_id: &str) -> (StatusCode, ErrorResponse) {
        let (status, code) = self.classify();
        let error_response = ErrorResponse::new(
            request_id.to_string(),
            self.public_message(),
            code.to_string(),
            status.as_u16(),
        );

        (status, error_response)
    }

    fn log_error(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(AuthError::AuthenticationFailed) => {
                tracing::warn!(request_id = request_id, "Invalid credentials attempt");
            }
            AppError::Auth(AuthError::TokenRevoked) => {
                tracing::warn!(request_id = request_id, "Revoked token presented");
            }
            AppError::Auth(e @ AuthError::RepositoryUnavailable(_))
            | AppError::Auth(e @ AuthError::Internal(_)) => {
                tracing::error!(
                    request_id = request_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Authentication backend error"
                );
            }
            AppError::Auth(e) => {
                tracing::info!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
        }
    }
}

/// Implement ResponseError for Actix-web integration
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log_error(&request_id);

        let (status, error_response) = <Self as ErrorHandler>::error_response(self, &request_id);

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        self.classify().0
    }
}

// ============================================================================
// 4. ERROR CONTEXT
// ============================================================================

/// Per-request context attached to handler logs
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub operation: String,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
        }
    }

    pub fn log_error(&self, error: &AppError) {
        if error.status_code().is_server_error() {
            tracing::error!(
                request_id = %self.request_id,
                operation = %self.operation,
                error = %error,
                "Request failed"
            );
        } else {
            tracing::warn!(
                request_id = %self.request_id,
                operation = %self.operation,
                error = %error,
                "Request rejected"
            );
        }
    }
}
