//! Error types for the air-quality ELT pipeline.

use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// Stages never retry internally; the caller decides what to do based on
/// [`PipelineError::is_retryable`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The raw table has not been created yet.
    #[error("raw table `{table}` does not exist; run the load stage first")]
    MissingRawData { table: &'static str },

    /// The raw table exists but holds no rows.
    #[error("raw table `{table}` is empty; run the load stage first")]
    EmptyRawData { table: &'static str },

    /// The extract file the loader reads from is missing.
    #[error("extract file not found: {path}; run the extract stage first")]
    ExtractNotFound { path: String },

    /// A station has no observations to average for a nullable field.
    #[error("cannot impute `{field}` for station {station_id}: no non-null observations")]
    UndefinedImputation { station_id: String, field: &'static str },

    /// A stored row could not be decoded into a reading.
    #[error("invalid raw record at row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    /// A post-transform invariant did not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl PipelineError {
    /// Returns `true` if re-running the failed stage may succeed.
    ///
    /// Storage and I/O failures are transient; missing preconditions, bad data
    /// and invariant violations are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Sqlite(_) | Self::Arrow(_) | Self::Parquet(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
