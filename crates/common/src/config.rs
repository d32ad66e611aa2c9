//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Redis configuration.
    pub redis: RedisConfig,
    /// Federation configuration.
    pub federation: FederationConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this instance.
    pub url: String,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Redis configuration (job queue backing store).
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis keys.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

/// Federation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// Whether federation is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Instance name announced in metadata documents.
    pub instance_name: String,
    /// Instance description.
    #[serde(default)]
    pub instance_description: Option<String>,
    /// Base64-encoded Ed25519 signing key used to sign outbound fetches
    /// made on behalf of the instance itself. Generated at first boot when
    /// absent.
    #[serde(default)]
    pub instance_private_key: Option<String>,
    /// Freshness TTL for cached remote actors, in seconds.
    #[serde(default = "default_actor_ttl")]
    pub actor_ttl_secs: i64,
    /// Freshness TTL for cached remote instances, in seconds.
    #[serde(default = "default_instance_ttl")]
    pub instance_ttl_secs: i64,
    /// Maximum accepted skew between a signature's claimed timestamp and
    /// local time, in seconds.
    #[serde(default = "default_clock_skew")]
    pub clock_skew_secs: i64,
    /// Number of concurrent inbox workers.
    #[serde(default = "default_workers")]
    pub inbox_workers: usize,
    /// Number of concurrent delivery workers.
    #[serde(default = "default_workers")]
    pub deliver_workers: usize,
    /// Maximum retry attempts before a job is dead-lettered.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Timeout for outbound HTTP requests, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

fn default_redis_prefix() -> String {
    "versia".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_actor_ttl() -> i64 {
    24 * 60 * 60
}

const fn default_instance_ttl() -> i64 {
    24 * 60 * 60
}

const fn default_clock_skew() -> i64 {
    5 * 60
}

const fn default_workers() -> usize {
    4
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `VERSIA_ENV`)
    /// 3. Environment variables with `VERSIA_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("VERSIA_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("VERSIA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("VERSIA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
