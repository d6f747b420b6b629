//! Process configuration, read from the environment at startup.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: Vec<u8>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub signed_url_secret: Vec<u8>,
    pub upload_url_ttl: Duration,
    pub download_url_ttl: Duration,
    pub attachment_max_size_bytes: i64,
    pub require_tls: bool,
    pub object_store_base_url: String,
    pub object_store_list_endpoint: String,
    pub object_store_bearer_token: String,
    pub reconcile_tick_secs: u64,
    pub reconcile_stale_after_secs: i64,
    pub reconcile_scan_limit: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

impl AppConfig {
    /// Load configuration from environment variables, applying the same
    /// defaults a local/dev deployment would expect.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?.into_bytes();
        let signed_url_secret = required("SIGNED_URL_SECRET")?.into_bytes();

        Ok(Self {
            database_url,
            jwt_secret,
            access_token_ttl: Duration::from_secs(parse_u64_or("ACCESS_TOKEN_TTL_SECS", 900)?),
            refresh_token_ttl: Duration::from_secs(parse_u64_or(
                "REFRESH_TOKEN_TTL_SECS",
                60 * 60 * 24 * 30,
            )?),
            signed_url_secret,
            upload_url_ttl: Duration::from_secs(parse_u64_or("UPLOAD_URL_TTL_SECS", 900)?),
            download_url_ttl: Duration::from_secs(parse_u64_or("DOWNLOAD_URL_TTL_SECS", 300)?),
            attachment_max_size_bytes: parse_i64_or(
                "ATTACHMENT_MAX_BYTES",
                5 * 1024 * 1024 * 1024,
            )?,
            require_tls: parse_bool_or("REQUIRE_TLS", true)?,
            object_store_base_url: std::env::var("OBJECT_STORE_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9000/eln-attachments".to_string()),
            object_store_list_endpoint: std::env::var("OBJECT_STORE_LIST_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000/eln-attachments/_list".to_string()),
            object_store_bearer_token: std::env::var("OBJECT_STORE_BEARER_TOKEN").unwrap_or_default(),
            reconcile_tick_secs: parse_u64_or("RECONCILE_TICK_SECS", 300)?,
            reconcile_stale_after_secs: parse_i64_or("RECONCILE_STALE_AFTER_SECS", 3600)?,
            reconcile_scan_limit: parse_i64_or("RECONCILE_SCAN_LIMIT", 500)?,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::Missing(key))
}

fn parse_u64_or(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_i64_or(key: &'static str, default: i64) -> Result<i64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}

fn parse_bool_or(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key, raw)),
        Err(_) => Ok(default),
    }
}
