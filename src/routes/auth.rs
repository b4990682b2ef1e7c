/// Authentication Routes
///
/// Handles registration, login, token refresh, logout, and the
/// authenticated account endpoints.

use std::collections::HashMap;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Claims, TokenPair};
use crate::error::{AppError, ErrorContext};
use crate::repository::CredentialUpdate;
use crate::validators::{is_valid_password, is_valid_username};

/// Registration and login request
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

/// Token refresh / logout request
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
}

/// Authentication response with access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl AuthResponse {
    fn new(pair: TokenPair, expires_in: i64) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Account information response
#[derive(Serialize)]
pub struct AccountResponse {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

/// Log a failed request with its context and hand the error back.
fn reject(context: &ErrorContext, error: impl Into<AppError>) -> AppError {
    let error = error.into();
    context.log_error(&error);
    error
}

/// POST /auth/register
///
/// # Errors
/// - 400: Invalid username or password
/// - 409: Username already registered
/// - 503: Store unavailable
pub async fn register(
    form: web::Json<CredentialsRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("account_registration");

    let username = is_valid_username(&form.username).map_err(|e| reject(&context, e))?;
    is_valid_password(&form.password).map_err(|e| reject(&context, e))?;

    let user_id = auth
        .register(&username, &form.password)
        .await
        .map_err(|e| reject(&context, e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(RegisterResponse {
        user_id: user_id.to_string(),
    }))
}

/// POST /auth/login
///
/// # Errors
/// - 400: Malformed input
/// - 401: Unknown username or wrong password (same response for both)
/// - 503: Store unavailable
pub async fn login(
    form: web::Json<CredentialsRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let username = is_valid_username(&form.username).map_err(|e| reject(&context, e))?;
    is_valid_password(&form.password).map_err(|e| reject(&context, e))?;

    let pair = auth
        .login(&username, &form.password)
        .await
        .map_err(|e| reject(&context, e))?;

    tracing::info!(request_id = %context.request_id, "User logged in successfully");

    Ok(HttpResponse::Ok().json(AuthResponse::new(pair, auth.issuer().access_ttl())))
}

/// POST /auth/refresh
///
/// Token rotation: the presented refresh token is spent and a new pair is
/// returned. Presenting a spent token again is rejected.
///
/// # Errors
/// - 401: Invalid, expired, or revoked refresh token
/// - 503: Ledger unavailable
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let pair = auth
        .refresh(&form.refresh_token)
        .await
        .map_err(|e| reject(&context, e))?;

    tracing::info!(request_id = %context.request_id, "Token refreshed successfully");

    Ok(HttpResponse::Ok().json(AuthResponse::new(pair, auth.issuer().access_ttl())))
}

/// POST /auth/logout
///
/// Always 204 for any token, valid or not, unless the ledger is unavailable.
pub async fn logout(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_logout");

    auth.logout(&form.refresh_token)
        .await
        .map_err(|e| reject(&context, e))?;

    tracing::info!(request_id = %context.request_id, "User logged out");

    Ok(HttpResponse::NoContent().finish())
}

/// GET /auth/account
///
/// **Requires valid JWT access token** in Authorization header.
pub async fn get_account(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("account_lookup");

    let user_id = claims.user_id().map_err(|e| reject(&context, e))?;
    let account = auth
        .account(user_id)
        .await
        .map_err(|e| reject(&context, e))?;

    Ok(HttpResponse::Ok().json(AccountResponse {
        id: account.id.to_string(),
        username: account.username,
        created_at: account.created_at.to_rfc3339(),
    }))
}

/// PATCH /auth/account
///
/// Body is a JSON object of field name to new value. Only `username` and
/// `password` may be changed.
///
/// # Errors
/// - 400: Immutable or unknown field, invalid value, or unchanged password
/// - 404: Account no longer exists
/// - 409: New username already taken
pub async fn update_account(
    claims: web::ReqData<Claims>,
    fields: web::Json<HashMap<String, String>>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("account_update");

    let user_id = claims.user_id().map_err(|e| reject(&context, e))?;
    let update =
        CredentialUpdate::from_fields(fields.into_inner()).map_err(|e| reject(&context, e))?;
    if let Some(username) = update.new_username() {
        is_valid_username(username).map_err(|e| reject(&context, e))?;
    }
    if let Some(password) = update.new_password() {
        is_valid_password(password).map_err(|e| reject(&context, e))?;
    }

    auth.update_account(user_id, update)
        .await
        .map_err(|e| reject(&context, e))?;

    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /auth/account
pub async fn delete_account(
    claims: web::ReqData<Claims>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("account_deletion");

    let user_id = claims.user_id().map_err(|e| reject(&context, e))?;
    auth.delete_account(user_id)
        .await
        .map_err(|e| reject(&context, e))?;

    tracing::info!(request_id = %context.request_id, "Account deleted");

    Ok(HttpResponse::NoContent().finish())
}
