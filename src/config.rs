use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Process-wide configuration loaded once from the environment at startup (§6).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub broker_url: Option<String>,
    pub http_port: u16,
    pub default_time_limit_ms: i32,
    pub default_memory_mb: i32,
    pub max_concurrent_executions: usize,
    pub log_level: String,
    pub worker_poll_interval: Duration,
    pub worker_heartbeat_interval: Duration,
    pub repair_sweep_interval: Duration,
    pub repair_sweep_margin: Duration,
    pub shutdown_grace_period: Duration,
}

impl Config {
    /// Load configuration from environment variables, applying the defaults from §6.
    ///
    /// Required fields (`DATABASE_URL`) fail fast here rather than at first use.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            broker_url: env::var("BROKER_URL").ok(),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("HTTP_PORT must be a valid port number")?,
            default_time_limit_ms: env::var("DEFAULT_TIME_LIMIT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("DEFAULT_TIME_LIMIT_MS must be an integer")?,
            default_memory_mb: env::var("DEFAULT_MEMORY_MB")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .context("DEFAULT_MEMORY_MB must be an integer")?,
            max_concurrent_executions: env::var("MAX_CONCURRENT_EXECUTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .context("MAX_CONCURRENT_EXECUTIONS must be an integer")?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            worker_poll_interval: Duration::from_millis(
                env::var("WORKER_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "250".to_string())
                    .parse()
                    .context("WORKER_POLL_INTERVAL_MS must be an integer")?,
            ),
            worker_heartbeat_interval: Duration::from_millis(
                env::var("WORKER_HEARTBEAT_INTERVAL_MS")
                    .unwrap_or_else(|_| "5000".to_string())
                    .parse()
                    .context("WORKER_HEARTBEAT_INTERVAL_MS must be an integer")?,
            ),
            repair_sweep_interval: Duration::from_millis(
                env::var("REPAIR_SWEEP_INTERVAL_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()
                    .context("REPAIR_SWEEP_INTERVAL_MS must be an integer")?,
            ),
            repair_sweep_margin: Duration::from_millis(
                env::var("REPAIR_SWEEP_MARGIN_MS")
                    .unwrap_or_else(|_| "15000".to_string())
                    .parse()
                    .context("REPAIR_SWEEP_MARGIN_MS must be an integer")?,
            ),
            shutdown_grace_period: Duration::from_millis(
                env::var("SHUTDOWN_GRACE_PERIOD_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()
                    .context("SHUTDOWN_GRACE_PERIOD_MS must be an integer")?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_when_only_database_url_is_set() {
        // SAFETY: tests run single-threaded within this module's env mutations are local intent;
        // a stray DATABASE_URL from the outer environment would make this flaky, so set it explicitly.
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        std::env::remove_var("HTTP_PORT");
        std::env::remove_var("BROKER_URL");

        let config = Config::from_env().unwrap();
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.default_time_limit_ms, 5000);
        assert_eq!(config.default_memory_mb, 256);
        assert_eq!(config.max_concurrent_executions, 10);
        assert!(config.broker_url.is_none());
    }
}
