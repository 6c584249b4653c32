//! Server configuration from command-line flags and environment variables.

use std::time::Duration;

use accrual::{PoolConfig, RetryPolicy};
use clap::Parser;

/// Server configuration.
///
/// Each setting is read from its flag, then its environment variable, then
/// the default. A `.env` file in the working directory is loaded first.
#[derive(Parser, Debug, Clone)]
#[command(name = "api")]
#[command(about = "Cashback ledger API with the accrual reconciliation worker")]
pub struct Config {
    /// Address the HTTP server listens on
    #[arg(short = 'a', long, env = "RUN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub run_address: String,

    /// PostgreSQL connection string; orders are kept in memory when absent
    #[arg(short = 'd', long, env = "DATABASE_URI")]
    pub database_uri: Option<String>,

    /// Base address of the accrual service
    #[arg(short = 'r', long, env = "ACCRUAL_SYSTEM_ADDRESS")]
    pub accrual_system_address: String,

    /// Number of concurrent accrual workers
    #[arg(long, env = "ACCRUAL_WORKERS", default_value_t = 10)]
    pub accrual_workers: usize,

    /// Capacity of the accrual work queue
    #[arg(long, env = "ACCRUAL_QUEUE_CAPACITY", default_value_t = 100)]
    pub accrual_queue_capacity: usize,

    /// Timeout of a single accrual request, in seconds
    #[arg(long, env = "ACCRUAL_TIMEOUT_SECS", default_value_t = 5)]
    pub accrual_timeout_secs: u64,

    /// Retries after transient accrual failures; 0 disables retrying
    #[arg(long, env = "ACCRUAL_MAX_RETRIES", default_value_t = 5)]
    pub accrual_max_retries: u32,

    /// Longest cooldown honored from a `Retry-After` header, in seconds
    #[arg(long, env = "ACCRUAL_MAX_COOLDOWN_SECS", default_value_t = 300)]
    pub accrual_max_cooldown_secs: u64,
}

impl Config {
    /// Loads `.env`, then parses the process arguments and environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self::parse()
    }

    /// Request timeout for the accrual client.
    pub fn accrual_timeout(&self) -> Duration {
        Duration::from_secs(self.accrual_timeout_secs)
    }

    /// Worker pool settings.
    pub fn pool_config(&self) -> PoolConfig {
        let retry = RetryPolicy {
            max_attempts: self.accrual_max_retries,
            ..RetryPolicy::default()
        };
        PoolConfig::default()
            .with_workers(self.accrual_workers)
            .with_queue_capacity(self.accrual_queue_capacity)
            .with_retry(retry)
            .with_max_cooldown(Duration::from_secs(self.accrual_max_cooldown_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["api", "-r", "localhost:8081"]).unwrap();
        assert_eq!(config.run_address, "0.0.0.0:8080");
        assert_eq!(config.accrual_system_address, "localhost:8081");
        assert_eq!(config.accrual_timeout(), Duration::from_secs(5));
        assert_eq!(config.pool_config(), PoolConfig::default());
    }

    #[test]
    fn test_short_flags() {
        let config = Config::try_parse_from([
            "api",
            "-a",
            "127.0.0.1:9000",
            "-d",
            "postgres://localhost/ledger",
            "-r",
            "http://accrual:8080",
        ])
        .unwrap();
        assert_eq!(config.run_address, "127.0.0.1:9000");
        assert_eq!(
            config.database_uri.as_deref(),
            Some("postgres://localhost/ledger")
        );
    }

    #[test]
    fn test_pool_settings() {
        let config = Config::try_parse_from([
            "api",
            "-r",
            "localhost:8081",
            "--accrual-workers",
            "3",
            "--accrual-queue-capacity",
            "9",
            "--accrual-max-retries",
            "0",
            "--accrual-max-cooldown-secs",
            "45",
        ])
        .unwrap();
        let pool = config.pool_config();
        assert_eq!(pool.workers, 3);
        assert_eq!(pool.queue_capacity, 9);
        assert_eq!(pool.retry, RetryPolicy::disabled());
        assert_eq!(pool.max_cooldown, Duration::from_secs(45));
    }

    #[test]
    fn test_accrual_address_is_required() {
        // Only meaningful when the variable is not set in the test environment.
        if std::env::var_os("ACCRUAL_SYSTEM_ADDRESS").is_none() {
            assert!(Config::try_parse_from(["api"]).is_err());
        }
    }
}
