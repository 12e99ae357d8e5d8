//! Application configuration.
//!
//! Loaded from a YAML file (default `config/config.yaml`), with the secrets
//! overridable from the environment so deployments never commit them.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_log_file")]
    pub file: String,
    /// "hourly", "daily" or anything else for a single file.
    #[serde(default = "default_rotation")]
    pub rotation: String,
    #[serde(default)]
    pub use_json: bool,
}

/// Periods, batches and leases for the background workers.
///
/// The claim lease must outlive the worst-case handling of one task but stay
/// inside the user-visible cancellation window.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_flush_period")]
    pub flush_period_secs: u64,
    #[serde(default = "default_drain_period")]
    pub drain_period_secs: u64,
    #[serde(default = "default_recover_period")]
    pub recover_period_secs: u64,
    #[serde(default = "default_claim_batch")]
    pub claim_batch: i64,
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_cancel_delay")]
    pub cancel_delay_secs: u64,
}

impl AppConfig {
    /// Read the YAML file at `path`, then apply environment overrides
    /// (`DATABASE_URL`, `REDIS_URL`, `JWT_SECRET`).
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut cfg: AppConfig = serde_yaml::from_str(&raw)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            cfg.database.url = url;
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            cfg.redis.url = url;
        }
        if let Ok(secret) = std::env::var("JWT_SECRET") {
            cfg.auth.jwt_secret = secret;
        }
        Ok(cfg)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl WorkerConfig {
    pub fn flush_period(&self) -> Duration {
        Duration::from_secs(self.flush_period_secs)
    }
    pub fn drain_period(&self) -> Duration {
        Duration::from_secs(self.drain_period_secs)
    }
    pub fn recover_period(&self) -> Duration {
        Duration::from_secs(self.recover_period_secs)
    }
    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
    pub fn cancel_delay(&self) -> Duration {
        Duration::from_secs(self.cancel_delay_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: default_log_dir(),
            file: default_log_file(),
            rotation: default_rotation(),
            use_json: false,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            flush_period_secs: default_flush_period(),
            drain_period_secs: default_drain_period(),
            recover_period_secs: default_recover_period(),
            claim_batch: default_claim_batch(),
            claim_lease_secs: default_claim_lease(),
            retry_delay_secs: default_retry_delay(),
            cancel_delay_secs: default_cancel_delay(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_pool_size() -> u32 {
    10
}
fn default_jwt_secret() -> String {
    "change-me".to_string()
}
fn default_token_ttl_hours() -> i64 {
    24
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_log_file() -> String {
    "flashmart.log".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_flush_period() -> u64 {
    10
}
fn default_drain_period() -> u64 {
    10
}
fn default_recover_period() -> u64 {
    60
}
fn default_claim_batch() -> i64 {
    100
}
fn default_claim_lease() -> u64 {
    300
}
fn default_retry_delay() -> u64 {
    60
}
fn default_cancel_delay() -> u64 {
    900
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_fills_worker_defaults() {
        let cfg: AppConfig = serde_yaml::from_str(
            "database:\n  url: postgres://localhost/flashmart\nredis:\n  url: redis://localhost\n",
        )
        .unwrap();
        assert_eq!(cfg.workers.flush_period_secs, 10);
        assert_eq!(cfg.workers.claim_batch, 100);
        assert_eq!(cfg.workers.claim_lease_secs, 300);
        assert_eq!(cfg.workers.cancel_delay_secs, 900);
        assert_eq!(cfg.server.port, 8080);
    }

    #[test]
    fn worker_durations_convert() {
        let w = WorkerConfig::default();
        assert_eq!(w.cancel_delay(), Duration::from_secs(900));
        assert_eq!(w.recover_period(), Duration::from_secs(60));
    }
}
