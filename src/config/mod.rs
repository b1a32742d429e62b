//! Configuration handling for the service.
//!
//! Everything is read from environment variables with development defaults,
//! so a bare `cargo run` against local Redis/Elasticsearch/NLP containers
//! works without any setup. Numeric values are validated at load time; a
//! malformed value is a startup failure, not something to limp along with.

use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Environment variable names. Keeping them public lets tests and deploy
/// tooling refer to them without stringly-typed duplication.
pub const ENV_SERVER_PORT: &str = "SERVER_PORT";
pub const ENV_QUEUE_CAPACITY: &str = "QUEUE_CAPACITY";
pub const ENV_NUM_WORKERS: &str = "NUM_WORKERS";
pub const ENV_ELASTICSEARCH_URL: &str = "ELASTICSEARCH_URL";
pub const ENV_INDEX_NAME: &str = "INDEX_NAME";
pub const ENV_BULK_THRESHOLD: &str = "BULK_THRESHOLD";
pub const ENV_FLUSH_INTERVAL: &str = "FLUSH_INTERVAL";
pub const ENV_MAX_RETRIES: &str = "MAX_RETRIES";
pub const ENV_REDIS_HOST: &str = "REDIS_HOST";
pub const ENV_REDIS_PORT: &str = "REDIS_PORT";
pub const ENV_REDIS_PASSWORD: &str = "REDIS_PASSWORD";
pub const ENV_REDIS_DB: &str = "REDIS_DB";
pub const ENV_NLP_SERVICE_URL: &str = "NLP_SERVICE_URL";
pub const ENV_NLP_BATCH_SIZE: &str = "NLP_BATCH_SIZE";
pub const ENV_NLP_BATCH_TIMEOUT_MS: &str = "NLP_BATCH_TIMEOUT_MS";
pub const ENV_SPAM_BLOCK_THRESHOLD: &str = "SPAM_BLOCK_THRESHOLD";
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

const DEFAULT_SERVER_PORT: &str = "8080";
const DEFAULT_QUEUE_CAPACITY: usize = 1000;
const DEFAULT_NUM_WORKERS: usize = 4;
const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200/_bulk";
const DEFAULT_INDEX_NAME: &str = "search_engine_index";
const DEFAULT_BULK_THRESHOLD: usize = 3;
const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_REDIS_HOST: &str = "localhost";
const DEFAULT_REDIS_PORT: &str = "6379";
const DEFAULT_REDIS_PASSWORD: &str = "";
const DEFAULT_REDIS_DB: i64 = 0;
const DEFAULT_NLP_SERVICE_URL: &str = "http://localhost:5000/nlp";
const DEFAULT_NLP_BATCH_SIZE: usize = 10;
const DEFAULT_NLP_BATCH_TIMEOUT_MS: u64 = 200;
const DEFAULT_SPAM_BLOCK_THRESHOLD: u32 = 10;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Runtime configuration for the whole pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server_port: String,
    pub queue_capacity: usize,
    pub num_workers: usize,

    pub elasticsearch_url: String,
    pub index_name: String,
    pub bulk_threshold: usize,
    pub flush_interval_secs: u64,
    pub max_retries: u32,

    pub redis_host: String,
    pub redis_port: String,
    pub redis_password: String,
    pub redis_db: i64,

    pub nlp_service_url: String,
    pub nlp_batch_size: usize,
    pub nlp_batch_timeout_ms: u64,

    pub spam_block_threshold: u32,

    pub log_level: String,
}

impl Config {
    /// Load from environment variables, falling back to development defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self {
            server_port: string_env(ENV_SERVER_PORT, DEFAULT_SERVER_PORT),
            queue_capacity: parsed_env(ENV_QUEUE_CAPACITY, DEFAULT_QUEUE_CAPACITY)?,
            num_workers: parsed_env(ENV_NUM_WORKERS, DEFAULT_NUM_WORKERS)?,
            elasticsearch_url: string_env(ENV_ELASTICSEARCH_URL, DEFAULT_ELASTICSEARCH_URL),
            index_name: string_env(ENV_INDEX_NAME, DEFAULT_INDEX_NAME),
            bulk_threshold: parsed_env(ENV_BULK_THRESHOLD, DEFAULT_BULK_THRESHOLD)?,
            flush_interval_secs: parsed_env(ENV_FLUSH_INTERVAL, DEFAULT_FLUSH_INTERVAL_SECS)?,
            max_retries: parsed_env(ENV_MAX_RETRIES, DEFAULT_MAX_RETRIES)?,
            redis_host: string_env(ENV_REDIS_HOST, DEFAULT_REDIS_HOST),
            redis_port: string_env(ENV_REDIS_PORT, DEFAULT_REDIS_PORT),
            redis_password: string_env(ENV_REDIS_PASSWORD, DEFAULT_REDIS_PASSWORD),
            redis_db: parsed_env(ENV_REDIS_DB, DEFAULT_REDIS_DB)?,
            nlp_service_url: string_env(ENV_NLP_SERVICE_URL, DEFAULT_NLP_SERVICE_URL),
            nlp_batch_size: parsed_env(ENV_NLP_BATCH_SIZE, DEFAULT_NLP_BATCH_SIZE)?,
            nlp_batch_timeout_ms: parsed_env(
                ENV_NLP_BATCH_TIMEOUT_MS,
                DEFAULT_NLP_BATCH_TIMEOUT_MS,
            )?,
            spam_block_threshold: parsed_env(
                ENV_SPAM_BLOCK_THRESHOLD,
                DEFAULT_SPAM_BLOCK_THRESHOLD,
            )?,
            log_level: string_env(ENV_LOG_LEVEL, DEFAULT_LOG_LEVEL),
        };

        // A pool with zero workers would accept pages and index nothing.
        if config.num_workers == 0 {
            config.num_workers = 1;
        }

        Ok(config)
    }
}

fn string_env(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_env<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| ConfigError::InvalidValue {
                field: key,
                reason: err.to_string(),
            }),
        Err(_) => Ok(default),
    }
}

/// Errors that can occur while building a configuration.
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Ensure environment-variable manipulating tests run serially.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ALL_KEYS: &[&str] = &[
        ENV_SERVER_PORT,
        ENV_QUEUE_CAPACITY,
        ENV_NUM_WORKERS,
        ENV_ELASTICSEARCH_URL,
        ENV_INDEX_NAME,
        ENV_BULK_THRESHOLD,
        ENV_FLUSH_INTERVAL,
        ENV_MAX_RETRIES,
        ENV_REDIS_HOST,
        ENV_REDIS_PORT,
        ENV_REDIS_PASSWORD,
        ENV_REDIS_DB,
        ENV_NLP_SERVICE_URL,
        ENV_NLP_BATCH_SIZE,
        ENV_NLP_BATCH_TIMEOUT_MS,
        ENV_SPAM_BLOCK_THRESHOLD,
        ENV_LOG_LEVEL,
    ];

    fn clear_env() {
        for key in ALL_KEYS {
            unsafe {
                env::remove_var(key);
            }
        }
    }

    #[test]
    fn defaults_when_env_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.server_port, DEFAULT_SERVER_PORT);
        assert_eq!(cfg.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(cfg.num_workers, DEFAULT_NUM_WORKERS);
        assert_eq!(cfg.elasticsearch_url, DEFAULT_ELASTICSEARCH_URL);
        assert_eq!(cfg.index_name, DEFAULT_INDEX_NAME);
        assert_eq!(cfg.bulk_threshold, DEFAULT_BULK_THRESHOLD);
        assert_eq!(cfg.flush_interval_secs, DEFAULT_FLUSH_INTERVAL_SECS);
        assert_eq!(cfg.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(cfg.nlp_batch_size, DEFAULT_NLP_BATCH_SIZE);
        assert_eq!(cfg.spam_block_threshold, DEFAULT_SPAM_BLOCK_THRESHOLD);
        assert_eq!(cfg.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn overrides_when_env_present() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(ENV_SERVER_PORT, "9999");
            env::set_var(ENV_QUEUE_CAPACITY, "10");
            env::set_var(ENV_NUM_WORKERS, "2");
            env::set_var(ENV_NLP_BATCH_SIZE, "25");
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.server_port, "9999");
        assert_eq!(cfg.queue_capacity, 10);
        assert_eq!(cfg.num_workers, 2);
        assert_eq!(cfg.nlp_batch_size, 25);
        clear_env();
    }

    #[test]
    fn malformed_numeric_is_an_error() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(ENV_QUEUE_CAPACITY, "not-a-number");
        }
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains(ENV_QUEUE_CAPACITY));
        clear_env();
    }

    #[test]
    fn zero_workers_clamps_to_one() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            env::set_var(ENV_NUM_WORKERS, "0");
        }
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.num_workers, 1);
        clear_env();
    }
}
