//! Transform stage: raw readings in, enriched table and aggregate views out.

pub mod aggregate;
pub mod aqi;
pub mod impute;
pub mod types;
pub mod utility;

use tracing::info;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::export;
use crate::reading::Reading;
use crate::store::{RAW_TABLE, Store};

use self::types::{Aggregates, EnrichedReading, SummaryStats};

/// Imputes, scores and aggregates an in-memory set of raw readings.
///
/// Pure: the result depends only on `readings` and `fallback`.
pub fn enrich(
    readings: &[Reading],
    fallback: impute::ImputationFallback,
) -> Result<(Vec<EnrichedReading>, Aggregates)> {
    let imputed = impute::impute(readings, fallback)?;

    let rows: Vec<EnrichedReading> = readings
        .iter()
        .zip(imputed)
        .map(|(reading, pollutants)| EnrichedReading::from_imputed(reading, pollutants))
        .collect();

    let aggregates = aggregate::aggregate(&rows);
    Ok((rows, aggregates))
}

/// Rebuilds the analytics tables and export artifacts from the raw table.
///
/// Safe to re-run: every derived table and file is replaced.
///
/// # Errors
///
/// [`PipelineError::MissingRawData`] when the raw table has never been loaded,
/// [`PipelineError::EmptyRawData`] when it holds no rows.
#[tracing::instrument(skip(config), fields(db = %config.db_path().display()))]
pub fn transform(config: &Config) -> Result<SummaryStats> {
    let mut store = Store::open(&config.db_path())?;

    if !store.table_exists(RAW_TABLE)? {
        return Err(PipelineError::MissingRawData { table: RAW_TABLE });
    }
    let readings = store.read_raw()?;
    if readings.is_empty() {
        return Err(PipelineError::EmptyRawData { table: RAW_TABLE });
    }

    let (rows, aggregates) = enrich(&readings, config.imputation_fallback)?;
    store.replace_analytics(&rows, &aggregates)?;

    let written = export::export_all(&config.analytics_dir(), &rows, &aggregates)?;

    let summary = aggregates.summary;
    info!(
        records = summary.total_records,
        days = summary.total_days,
        stations = summary.total_stations,
        avg_pm25 = summary.avg_pm25,
        max_pm25 = summary.max_pm25,
        avg_aqi = summary.avg_aqi,
        max_aqi = summary.max_aqi,
        pct_good = summary.pct_good,
        pct_moderate = summary.pct_moderate,
        pct_unhealthy = summary.pct_unhealthy,
        artifacts = written.len(),
        "Transform complete"
    );

    Ok(summary)
}
