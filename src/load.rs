use std::path::Path;

use csv::ReaderBuilder;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::export;
use crate::reading::Reading;
use crate::store::{LoadAudit, Store};

/// Parses the extract CSV exactly as written; empty pollutant fields stay `None`.
pub fn read_extract(path: &Path) -> Result<Vec<Reading>> {
    if !path.exists() {
        return Err(PipelineError::ExtractNotFound {
            path: path.display().to_string(),
        });
    }

    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let readings = reader
        .deserialize::<Reading>()
        .collect::<std::result::Result<Vec<_>, _>>()?;

    debug!(path = %path.display(), rows = readings.len(), "Extract CSV parsed");
    Ok(readings)
}

/// Replaces the raw table with the extract and snapshots it to Parquet.
///
/// Returns the audit recorded for this load.
#[tracing::instrument(skip(config), fields(csv = %config.extract_path().display()))]
pub fn load(config: &Config) -> Result<LoadAudit> {
    let readings = read_extract(&config.extract_path())?;

    let mut store = Store::open(&config.db_path())?;
    let audit = store.replace_raw(&readings)?;

    let snapshot = config.raw_parquet_path();
    export::write_parquet(&snapshot, &export::raw_batch(&readings)?)?;

    info!(
        rows = audit.row_count,
        pm25_nulls = audit.nulls.pm25,
        pm10_nulls = audit.nulls.pm10,
        no2_nulls = audit.nulls.no2,
        o3_nulls = audit.nulls.o3,
        snapshot = %snapshot.display(),
        "Raw data loaded"
    );

    Ok(audit)
}
