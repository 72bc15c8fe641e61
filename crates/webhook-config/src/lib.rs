//! Environment-sourced settings for the daemon binary.
//!
//! Production injects env vars directly; `load()` additionally tries an
//! optional `.env.local` file first, for local development, and falls back
//! to documented defaults for anything unset.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use webhook_retry::RetryConfig;
use webhook_worker::WorkerConfig;

pub const ENV_DOWNSTREAM_URL: &str = "WEBHOOK_DOWNSTREAM_URL";
pub const ENV_MAX_RETRY_ATTEMPTS: &str = "WEBHOOK_MAX_RETRY_ATTEMPTS";
pub const ENV_INITIAL_RETRY_DELAY_SECS: &str = "WEBHOOK_INITIAL_RETRY_DELAY_SECS";
pub const ENV_MAX_RETRY_DELAY_SECS: &str = "WEBHOOK_MAX_RETRY_DELAY_SECS";
pub const ENV_WORKER_POLL_INTERVAL_SECS: &str = "WEBHOOK_WORKER_POLL_INTERVAL_SECS";
pub const ENV_WORKER_CONCURRENCY: &str = "WEBHOOK_WORKER_CONCURRENCY";
pub const ENV_DOWNSTREAM_TIMEOUT_SECS: &str = "WEBHOOK_DOWNSTREAM_TIMEOUT_SECS";
pub const ENV_STALE_PROCESSING_THRESHOLD_SECS: &str = "WEBHOOK_STALE_PROCESSING_THRESHOLD_SECS";
pub const ENV_DAEMON_ADDR: &str = "WEBHOOK_DAEMON_ADDR";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub downstream_url: String,
    pub worker: WorkerConfig,
    pub daemon_addr: SocketAddr,
}

/// Load `.env.local` if present (dev convenience; silent if missing), then
/// read settings from the process environment. `database_url` is the only
/// setting with no default — it must be present.
pub fn load() -> Result<Settings> {
    let _ = dotenvy::from_filename(".env.local");

    let database_url = std::env::var(webhook_store_env_key())
        .with_context(|| format!("missing env var {}", webhook_store_env_key()))?;

    let downstream_url = env_or(ENV_DOWNSTREAM_URL, "http://127.0.0.1:9090/webhook");

    let retry = RetryConfig {
        initial_delay: Duration::from_secs(env_parse_or(ENV_INITIAL_RETRY_DELAY_SECS, 1)?),
        max_delay: Duration::from_secs(env_parse_or(ENV_MAX_RETRY_DELAY_SECS, 60)?),
        max_attempts: env_parse_or(ENV_MAX_RETRY_ATTEMPTS, 5)?,
    };

    let worker = WorkerConfig {
        poll_interval: Duration::from_secs(env_parse_or(ENV_WORKER_POLL_INTERVAL_SECS, 2)?),
        concurrency: env_parse_or(ENV_WORKER_CONCURRENCY, 10)?,
        downstream_timeout: Duration::from_secs(env_parse_or(ENV_DOWNSTREAM_TIMEOUT_SECS, 10)?),
        stale_processing_threshold: Duration::from_secs(env_parse_or(
            ENV_STALE_PROCESSING_THRESHOLD_SECS,
            60,
        )?),
        retry,
    };

    let daemon_addr = env_or(ENV_DAEMON_ADDR, "127.0.0.1:8080")
        .parse()
        .with_context(|| format!("invalid {ENV_DAEMON_ADDR}"))?;

    Ok(Settings {
        database_url,
        downstream_url,
        worker,
        daemon_addr,
    })
}

fn webhook_store_env_key() -> &'static str {
    webhook_store::ENV_DB_URL
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_or_falls_back_on_missing_var() {
        std::env::remove_var("WEBHOOK_TEST_UNSET_VAR");
        let v: u32 = env_parse_or("WEBHOOK_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn env_parse_or_parses_present_var() {
        std::env::set_var("WEBHOOK_TEST_SET_VAR", "7");
        let v: u32 = env_parse_or("WEBHOOK_TEST_SET_VAR", 42).unwrap();
        assert_eq!(v, 7);
        std::env::remove_var("WEBHOOK_TEST_SET_VAR");
    }
}
