use std::time::Duration;

use crate::error::ConfigError;

const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

#[derive(serde::Deserialize, Clone, Debug)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub jwt: JwtSettings,
    pub hashing: HashingSettings,
    pub repository: RepositorySettings,
    #[serde(default)]
    pub revocation: RevocationSettings,
}

#[derive(serde::Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
}

impl ApplicationSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// JWT authentication settings
#[derive(serde::Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    #[serde(default = "default_algorithm")]
    pub algorithm: String,
    pub access_token_expiry: i64,   // seconds (e.g., 900 for 15 minutes)
    pub refresh_token_expiry: i64,  // seconds (e.g., 604800 for 7 days)
    pub issuer: String,
}

fn default_algorithm() -> String {
    "HS256".to_string()
}

// The signing secret must never end up in logs.
impl std::fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"[redacted]")
            .field("algorithm", &self.algorithm)
            .field("access_token_expiry", &self.access_token_expiry)
            .field("refresh_token_expiry", &self.refresh_token_expiry)
            .field("issuer", &self.issuer)
            .finish()
    }
}

/// Password hashing settings
#[derive(serde::Deserialize, Clone, Debug)]
pub struct HashingSettings {
    /// bcrypt cost factor (log2 rounds)
    pub cost: u32,
}

#[derive(serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryBackend {
    Memory,
    Postgres,
}

/// Where credentials and revoked tokens live
#[derive(serde::Deserialize, Clone, Debug)]
pub struct RepositorySettings {
    pub backend: RepositoryBackend,
    /// Upper bound on any single store call, in milliseconds
    pub timeout_ms: u64,
    pub database: Option<DatabaseSettings>,
}

impl RepositorySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(serde::Deserialize, Clone)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub database_name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl std::fmt::Debug for DatabaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseSettings")
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_name", &self.database_name)
            .finish()
    }
}

impl DatabaseSettings {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database_name
        )
    }
}

/// Revocation ledger housekeeping
#[derive(serde::Deserialize, Clone, Debug)]
pub struct RevocationSettings {
    pub prune_interval_secs: u64,
}

impl Default for RevocationSettings {
    fn default() -> Self {
        Self {
            prune_interval_secs: 300,
        }
    }
}

impl Settings {
    /// Reject values the service cannot run with.
    ///
    /// JWT-specific checks (secret length, algorithm family, TTL ordering)
    /// are done by `TokenIssuer::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(&self.hashing.cost) {
            return Err(ConfigError::InvalidValue(format!(
                "hashing.cost must be between {} and {}",
                MIN_BCRYPT_COST, MAX_BCRYPT_COST
            )));
        }

        if self.repository.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "repository.timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.repository.backend == RepositoryBackend::Postgres
            && self.repository.database.is_none()
        {
            return Err(ConfigError::MissingRequired(
                "repository.database (required by the postgres backend)".to_string(),
            ));
        }

        if self.revocation.prune_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "revocation.prune_interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load settings from `configuration.yaml` (optional) and `APP_`-prefixed
/// environment variables, e.g. `APP_JWT__SECRET`.
pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("configuration").required(false))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    settings.try_deserialize::<Settings>()
}
