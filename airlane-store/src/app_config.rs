use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub geocoder: GeocoderConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_coordinate_ttl")]
    pub coordinate_ttl_seconds: u64,
}

fn default_coordinate_ttl() -> u64 { 30 * 24 * 3600 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocoderConfig {
    pub base_url: String,
    pub user_agent: String,
    #[serde(default = "default_geocoder_timeout")]
    pub timeout_ms: u64,
    /// Total calls per lookup, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_geocoder_timeout() -> u64 { 5_000 }
fn default_max_attempts() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 200 }
fn default_max_backoff() -> u64 { 5_000 }

impl GeocoderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// How long a reservation waits for the per-flight lock
    #[serde(default = "default_lock_wait")]
    pub lock_wait_ms: u64,
    /// Lifetime of an unconfirmed seat hold
    #[serde(default = "default_hold_ttl")]
    pub hold_ttl_seconds: u64,
}

fn default_lock_wait() -> u64 { 2_000 }
fn default_hold_ttl() -> u64 { 120 }

impl LedgerConfig {
    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn hold_ttl(&self) -> Duration {
        Duration::from_secs(self.hold_ttl_seconds)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `AIRLANE__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("AIRLANE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
