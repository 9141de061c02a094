use chrono::{FixedOffset, Offset, Utc};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum Deployment {
    Local,
    Dev,
    Stage,
    Prod,
}

impl Deployment {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            "stage" | "staging" => Self::Stage,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Detection
    pub leak_flow_threshold: f64,
    pub high_usage_volume_threshold: Option<f64>,

    // Alerting
    pub alert_dedup_open: bool,

    // Ingestion
    pub reject_inactive_meters: bool,
    pub storage_timeout_ms: u64,

    // Aggregation
    pub bucket_utc_offset: FixedOffset,

    // API settings
    pub api_host: String,
    pub api_port: u16,

    // Rate limiting
    pub disable_rate_limiting: bool,
    pub rate_limit_ingest_per_second: u64,
    pub rate_limit_ingest_burst: u32,
    pub rate_limit_query_per_second: u64,
    pub rate_limit_query_burst: u32,

    // Caching
    pub cache_ttl_seconds: u64,
    pub cache_max_bytes: u64,

    // Application metadata
    pub deployment: Deployment,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            leak_flow_threshold: 5.0,
            high_usage_volume_threshold: None,
            alert_dedup_open: false,
            reject_inactive_meters: true,
            storage_timeout_ms: 5000,
            bucket_utc_offset: Utc.fix(),
            api_host: "0.0.0.0".to_string(),
            api_port: 3000,
            disable_rate_limiting: false,
            rate_limit_ingest_per_second: 20,
            rate_limit_ingest_burst: 100,
            rate_limit_query_per_second: 5,
            rate_limit_query_burst: 60,
            cache_ttl_seconds: 300,
            cache_max_bytes: 67_108_864, // 64MB
            deployment: Deployment::Local,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparseable numeric settings fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if `DATABASE_URL` is not set, and
    /// `ConfigError::Invalid` if `BUCKET_UTC_OFFSET` is not an offset such as `+02:00`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let bucket_utc_offset = match env::var("BUCKET_UTC_OFFSET") {
            Ok(raw) => raw
                .trim()
                .parse::<FixedOffset>()
                .map_err(|_| ConfigError::Invalid("BUCKET_UTC_OFFSET", raw))?,
            Err(_) => defaults.bucket_utc_offset,
        };

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Detection
            leak_flow_threshold: env_or("LEAK_FLOW_THRESHOLD", defaults.leak_flow_threshold),
            high_usage_volume_threshold: env::var("HIGH_USAGE_VOLUME_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok()),

            // Alerting
            alert_dedup_open: env_or("ALERT_DEDUP_OPEN", defaults.alert_dedup_open),

            // Ingestion
            reject_inactive_meters: env_or(
                "REJECT_INACTIVE_METERS",
                defaults.reject_inactive_meters,
            ),
            storage_timeout_ms: env_or("STORAGE_TIMEOUT_MS", defaults.storage_timeout_ms),

            // Aggregation
            bucket_utc_offset,

            // API settings
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port: env_or("API_PORT", defaults.api_port),

            // Rate limiting
            disable_rate_limiting: env_or("DISABLE_RATE_LIMITING", defaults.disable_rate_limiting),
            rate_limit_ingest_per_second: env_or(
                "RATE_LIMIT_INGEST_PER_SECOND",
                defaults.rate_limit_ingest_per_second,
            ),
            rate_limit_ingest_burst: env_or(
                "RATE_LIMIT_INGEST_BURST",
                defaults.rate_limit_ingest_burst,
            ),
            rate_limit_query_per_second: env_or(
                "RATE_LIMIT_QUERY_PER_SECOND",
                defaults.rate_limit_query_per_second,
            ),
            rate_limit_query_burst: env_or("RATE_LIMIT_QUERY_BURST", defaults.rate_limit_query_burst),

            // Caching
            cache_ttl_seconds: env_or("CACHE_TTL_SECONDS", defaults.cache_ttl_seconds),
            cache_max_bytes: env_or("CACHE_MAX_BYTES", defaults.cache_max_bytes),

            // Application metadata
            deployment: Deployment::from_str(
                &env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string()),
            ),
        })
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
