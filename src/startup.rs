use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthService, PasswordHasher, TokenIssuer};
use crate::configuration::{DatabaseSettings, RepositoryBackend, Settings};
use crate::error::{AppError, AuthError, ConfigError};
use crate::logger::LoggerMiddleware;
use crate::middleware::JwtMiddleware;
use crate::repository::{
    CredentialStore, InMemoryCredentialStore, InMemoryRevocationLedger, PgCredentialStore,
    PgRevocationLedger, RevocationLedger,
};
use crate::routes::{
    delete_account, get_account, health_check, login, logout, refresh, register, update_account,
};

type Stores = (Arc<dyn CredentialStore>, Arc<dyn RevocationLedger>);

/// Build the auth service for the configured backend.
///
/// Fails on invalid settings, and for the postgres backend when the database
/// cannot be reached or migrated.
pub async fn build_auth_service(settings: &Settings) -> Result<AuthService, AppError> {
    settings.validate()?;

    let issuer = TokenIssuer::new(&settings.jwt)?;
    let hasher = PasswordHasher::new(settings.hashing.cost)
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

    let (credentials, revocations) = match settings.repository.backend {
        RepositoryBackend::Memory => memory_stores(hasher, settings.repository.timeout()),
        RepositoryBackend::Postgres => {
            let database = settings.repository.database.as_ref().ok_or_else(|| {
                ConfigError::MissingRequired("repository.database".to_string())
            })?;
            postgres_stores(database, hasher, settings.repository.timeout()).await?
        }
    };

    Ok(AuthService::new(credentials, revocations, issuer))
}

fn memory_stores(hasher: PasswordHasher, timeout: Duration) -> Stores {
    tracing::info!("Using in-memory credential store");
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(InMemoryCredentialStore::new(hasher, timeout));
    let revocations: Arc<dyn RevocationLedger> = Arc::new(InMemoryRevocationLedger::new(timeout));
    (credentials, revocations)
}

async fn postgres_stores(
    database: &DatabaseSettings,
    hasher: PasswordHasher,
    timeout: Duration,
) -> Result<Stores, AuthError> {
    tracing::info!(
        host = %database.host,
        database = %database.database_name,
        "Attempting to connect to database"
    );
    let pool = PgPoolOptions::new()
        .max_connections(database.max_connections)
        .acquire_timeout(timeout)
        .connect(&database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create connection pool");
            AuthError::RepositoryUnavailable(e.to_string())
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| AuthError::Internal(format!("Migration failed: {}", e)))?;
    tracing::info!("Database connection pool created and migrated");

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(PgCredentialStore::new(pool.clone(), hasher, timeout));
    let revocations: Arc<dyn RevocationLedger> = Arc::new(PgRevocationLedger::new(pool, timeout));
    Ok((credentials, revocations))
}

/// Periodically drop expired entries from the revocation ledger.
pub fn spawn_revocation_pruner(
    ledger: Arc<dyn RevocationLedger>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick fires immediately; nothing to prune at startup.
        interval.tick().await;
        loop {
            interval.tick().await;
            match ledger.prune_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Pruned expired revocation entries"),
                Err(e) => tracing::warn!(error = %e, "Revocation pruning failed"),
            }
        }
    })
}

pub fn run(listener: TcpListener, auth: AuthService) -> Result<Server, std::io::Error> {
    let auth_data = web::Data::new(auth.clone());

    let server = HttpServer::new(move || {
        App::new()
            .wrap(LoggerMiddleware)
            .app_data(auth_data.clone())
            .route("/health_check", web::get().to(health_check))
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(register))
                    .route("/login", web::post().to(login))
                    .route("/refresh", web::post().to(refresh))
                    .route("/logout", web::post().to(logout))
                    // Protected routes (require JWT access token)
                    .service(
                        web::resource("/account")
                            .wrap(JwtMiddleware::new(auth.clone()))
                            .route(web::get().to(get_account))
                            .route(web::patch().to(update_account))
                            .route(web::delete().to(delete_account)),
                    ),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
