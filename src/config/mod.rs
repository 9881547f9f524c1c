//! Application configuration management

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, bail};

/// Console log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path, or a `sqlite:` URL
    pub database_url: String,

    /// Connection pool size
    pub database_max_connections: u32,

    /// Worker tasks per parallel indexing pass
    pub indexer_workers: usize,

    /// Candidate count above which a pass goes parallel
    pub parallel_threshold: usize,

    /// How long shutdown waits for running passes
    pub shutdown_timeout: Duration,

    /// Optional JSON file of libraries applied at startup
    pub libraries_seed_path: Option<PathBuf>,

    pub log_format: LogFormat,

    /// Buffered lines on the live log stream
    pub live_log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "./data/shelfkeeper.db".to_string(),
            database_max_connections: 5,
            indexer_workers: 4,
            parallel_threshold: 50,
            shutdown_timeout: Duration::from_secs(30),
            libraries_seed_path: None,
            log_format: LogFormat::Pretty,
            live_log_capacity: 1000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or(defaults.database_url);

        let indexer_workers = lookup("INDEXER_WORKERS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.indexer_workers);
        if indexer_workers == 0 {
            bail!("INDEXER_WORKERS must be at least 1");
        }

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            database_url,

            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),

            indexer_workers,

            parallel_threshold: lookup("INDEXER_PARALLEL_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.parallel_threshold),

            shutdown_timeout: lookup("SHUTDOWN_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),

            libraries_seed_path: lookup("LIBRARIES_SEED_PATH")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            log_format,
            live_log_capacity: lookup("LIVE_LOG_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.live_log_capacity),
        })
    }
}
