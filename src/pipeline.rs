//! In-process runner for the full Extract, Load, Transform, Validate sequence.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::extract::{self, DateRange};
use crate::transform::types::SummaryStats;
use crate::validate::ValidationReport;
use crate::{load, transform, validate};

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retries: config.retries,
            delay: config.retry_delay,
        }
    }

    /// Runs `op`, retrying retryable failures up to `retries` times.
    pub fn run<T, F>(&self, stage: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt <= self.retries => {
                    warn!(
                        stage,
                        attempt,
                        retries = self.retries,
                        delay_secs = self.delay.as_secs(),
                        error = %e,
                        "Stage failed, retrying"
                    );
                    std::thread::sleep(self.delay);
                }
                Err(e) => {
                    error!(stage, attempt, error = %e, "Stage failed");
                    return Err(e);
                }
            }
        }
    }
}

/// What a full run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub extracted: usize,
    pub loaded: usize,
    pub summary: SummaryStats,
    pub report: ValidationReport,
}

/// Runs every stage in order, stopping at the first unrecoverable failure.
#[tracing::instrument(skip(config))]
pub fn run(config: &Config, range: DateRange) -> Result<RunOutcome> {
    let policy = RetryPolicy::from_config(config);
    let extract_path = config.extract_path();

    let extracted = policy.run("extract", || extract::extract(&extract_path, range, config.seed))?;
    let audit = policy.run("load", || load::load(config))?;
    let summary = policy.run("transform", || transform::transform(config))?;
    let report = policy.run("validate", || validate::validate(config))?;

    info!(
        extracted,
        loaded = audit.row_count,
        analytics = report.analytics_count,
        "Pipeline run complete"
    );

    Ok(RunOutcome {
        extracted,
        loaded: audit.row_count,
        summary,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::cell::Cell;
    use std::io;

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_retries_transient_failures() {
        let calls = Cell::new(0);

        let value = policy(3)
            .run("load", || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(io::Error::other("disk busy").into())
                } else {
                    Ok(7)
                }
            })
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_gives_up_after_retry_budget() {
        let calls = Cell::new(0);

        let result: Result<()> = policy(2).run("load", || {
            calls.set(calls.get() + 1);
            Err(io::Error::other("disk full").into())
        });

        assert!(matches!(result, Err(PipelineError::Io(_))));
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_does_not_retry_precondition_failures() {
        let calls = Cell::new(0);

        let result: Result<()> = policy(5).run("transform", || {
            calls.set(calls.get() + 1);
            Err(PipelineError::EmptyRawData { table: "raw" })
        });

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
