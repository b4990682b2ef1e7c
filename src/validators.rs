/// Input validators for credential requests
///
/// Runs at the HTTP boundary, before anything reaches the credential store.
/// 1. DoS Protection: length limits (bcrypt only reads the first 72 bytes)
/// 2. Username charset: letters, digits, `.`, `_`, `-`
/// 3. No control characters in passwords

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_USERNAME_LENGTH: usize = 64;
const MAX_PASSWORD_BYTES: usize = 72; // bcrypt input limit

lazy_static! {
    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9._-]+$").unwrap();
}

/// Validates a username. Case is preserved; usernames are case-sensitive.
pub fn is_valid_username(username: &str) -> Result<String, ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::EmptyField("username".to_string()));
    }

    if username.len() > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong(
            "username".to_string(),
            MAX_USERNAME_LENGTH,
        ));
    }

    if !USERNAME_REGEX.is_match(username) {
        return Err(ValidationError::InvalidFormat("username".to_string()));
    }

    Ok(username.to_string())
}

/// Validates a password
///
/// No strength policy is applied; only what the hasher cannot handle is
/// refused.
pub fn is_valid_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyField("password".to_string()));
    }

    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_BYTES,
        ));
    }

    if password.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("password".to_string()));
    }

    Ok(())
}
