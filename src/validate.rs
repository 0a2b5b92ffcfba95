//! Post-transform invariant checks.

use std::fmt;

use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::store::{ANALYTICS_TABLE, LOAD_AUDIT_TABLE, NullCounts, RAW_TABLE, Store};

/// Outcome of comparing the stores against the last load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub raw_count: usize,
    pub analytics_count: usize,
    /// Null counts recorded when the raw table was loaded.
    pub baseline_nulls: NullCounts,
    /// Null counts of the raw table now.
    pub current_nulls: NullCounts,
}

impl ValidationReport {
    pub fn row_counts_match(&self) -> bool {
        self.raw_count == self.analytics_count
    }

    pub fn raw_untouched(&self) -> bool {
        self.baseline_nulls == self.current_nulls
    }

    pub fn passed(&self) -> bool {
        self.row_counts_match() && self.raw_untouched()
    }

    fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        if !self.row_counts_match() {
            failures.push(format!(
                "analytics has {} rows but raw has {}",
                self.analytics_count, self.raw_count
            ));
        }
        if !self.raw_untouched() {
            failures.push(format!(
                "raw null counts changed since load: {:?} -> {:?}",
                self.baseline_nulls, self.current_nulls
            ));
        }
        failures
    }
}

fn verdict(ok: bool) -> &'static str {
    if ok { "OK" } else { "FAILED" }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Validation {}", if self.passed() { "passed" } else { "failed" })?;
        writeln!(
            f,
            "  row counts    : raw={} analytics={} [{}]",
            self.raw_count,
            self.analytics_count,
            verdict(self.row_counts_match())
        )?;
        let (b, c) = (&self.baseline_nulls, &self.current_nulls);
        writeln!(
            f,
            "  raw nulls     : pm25 {}/{} pm10 {}/{} no2 {}/{} o3 {}/{} (load/now) [{}]",
            b.pm25,
            c.pm25,
            b.pm10,
            c.pm10,
            b.no2,
            c.no2,
            b.o3,
            c.o3,
            verdict(self.raw_untouched())
        )?;
        write!(f, "  nulls imputed : {}", c.total())
    }
}

/// Collects the counts needed for validation without judging them.
pub fn inspect(store: &Store) -> Result<ValidationReport> {
    for table in [RAW_TABLE, ANALYTICS_TABLE] {
        if !store.table_exists(table)? {
            return Err(PipelineError::MissingRawData { table });
        }
    }
    let audit = store.load_audit()?.ok_or(PipelineError::MissingRawData {
        table: LOAD_AUDIT_TABLE,
    })?;

    Ok(ValidationReport {
        raw_count: store.raw_count()?,
        analytics_count: store.analytics_count()?,
        baseline_nulls: audit.nulls,
        current_nulls: store.raw_null_counts()?,
    })
}

/// Checks row-count parity and raw-table immutability.
///
/// # Errors
///
/// [`PipelineError::InvariantViolation`] if either check fails;
/// [`PipelineError::MissingRawData`] if the tables or load audit are absent.
#[tracing::instrument(skip(config))]
pub fn validate(config: &Config) -> Result<ValidationReport> {
    let store = Store::open(&config.db_path())?;
    let report = inspect(&store)?;

    for line in report.to_string().lines() {
        info!("{line}");
    }

    if !report.passed() {
        let failures = report.failures().join("; ");
        error!(%failures, "Validation failed");
        return Err(PipelineError::InvariantViolation(failures));
    }

    Ok(report)
}
