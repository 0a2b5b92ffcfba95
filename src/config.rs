//! Runtime configuration for the ELT pipeline.
//!
//! Values come from environment variables (a `.env` file is loaded by the
//! binary before this runs). CLI flags may override the data directory
//! afterwards via [`Config::with_data_dir`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::transform::impute::ImputationFallback;

/// Parse an optional environment value with a default.
macro_rules! parse_env_or {
    ($lookup:expr, $var_name:expr, $ty:ty, $default:expr) => {
        $lookup($var_name)
            .map(|v| v.parse::<$ty>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 300;

/// Effective configuration, immutable once loaded.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding `raw/`, `analytics/` and the database.
    pub data_dir: PathBuf,

    /// Explicit database path; defaults to `<data_dir>/air_quality.db`.
    pub db_path_override: Option<PathBuf>,

    /// Base seed for the synthetic generator.
    pub seed: u64,

    /// What to do when a station has nothing to impute from.
    pub imputation_fallback: ImputationFallback,

    /// Retry attempts per stage in the `run` command.
    pub retries: u32,

    /// Fixed delay between stage retries.
    pub retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new("data")
    }
}

impl Config {
    /// Configuration with defaults rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            db_path_override: None,
            seed: DEFAULT_SEED,
            imputation_fallback: ImputationFallback::Fail,
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Optional:
    /// - `AIRQ_DATA_DIR` – data root (default: `data`)
    /// - `AIRQ_DB_PATH` – database file (default: `<data_dir>/air_quality.db`)
    /// - `AIRQ_SEED` – generator seed (default: 42)
    /// - `AIRQ_IMPUTATION_FALLBACK` – `fail` or `global-mean` (default: `fail`)
    /// - `AIRQ_RETRIES` – stage retries (default: 3)
    /// - `AIRQ_RETRY_DELAY_SECS` – delay between retries (default: 300)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup("AIRQ_DATA_DIR").unwrap_or_else(|| "data".to_string());
        let db_path_override = lookup("AIRQ_DB_PATH").map(PathBuf::from);
        let seed = parse_env_or!(lookup, "AIRQ_SEED", u64, DEFAULT_SEED);
        let imputation_fallback = parse_env_or!(
            lookup,
            "AIRQ_IMPUTATION_FALLBACK",
            ImputationFallback,
            ImputationFallback::Fail
        );
        let retries = parse_env_or!(lookup, "AIRQ_RETRIES", u32, DEFAULT_RETRIES);
        let retry_delay_secs =
            parse_env_or!(lookup, "AIRQ_RETRY_DELAY_SECS", u64, DEFAULT_RETRY_DELAY_SECS);

        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            db_path_override,
            seed,
            imputation_fallback,
            retries,
            retry_delay: Duration::from_secs(retry_delay_secs),
        })
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn analytics_dir(&self) -> PathBuf {
        self.data_dir.join("analytics")
    }

    /// CSV handed from extract to load.
    pub fn extract_path(&self) -> PathBuf {
        self.raw_dir().join("air_quality_extracted.csv")
    }

    /// Parquet snapshot of the raw table written by load.
    pub fn raw_parquet_path(&self) -> PathBuf {
        self.raw_dir().join("raw_data_air_quality.parquet")
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path_override
            .clone()
            .unwrap_or_else(|| self.data_dir.join("air_quality.db"))
    }

    /// Log the effective configuration.
    pub fn log_config(&self) {
        tracing::info!("Configuration loaded:");
        tracing::info!("  AIRQ_DATA_DIR            : {}", self::display(&self.data_dir));
        tracing::info!("  AIRQ_DB_PATH             : {}", self::display(&self.db_path()));
        tracing::info!("  AIRQ_SEED                : {}", self.seed);
        tracing::info!("  AIRQ_IMPUTATION_FALLBACK : {}", self.imputation_fallback);
        tracing::info!("  AIRQ_RETRIES             : {}", self.retries);
        tracing::info!("  AIRQ_RETRY_DELAY_SECS    : {}", self.retry_delay.as_secs());
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
