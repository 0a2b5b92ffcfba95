//! Materializes the analytics dataset as Parquet files and dashboard JSON.
//!
//! Every artifact is written to a temporary sibling and renamed over the
//! target, so each file is either the previous version or the new one.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Date32Array, Float64Array, StringArray, TimestampSecondArray, UInt32Array, UInt64Array,
};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::reading::Reading;
use crate::transform::types::{Aggregates, DailyStat, EnrichedReading, HourlyPattern, StationSummary};

pub const ANALYTICS_PARQUET: &str = "analytics_air_quality.parquet";
pub const DAILY_PARQUET: &str = "daily_stats.parquet";
pub const HOURLY_PARQUET: &str = "hourly_patterns.parquet";
pub const STATIONS_PARQUET: &str = "station_summary.parquet";
pub const DAILY_JSON: &str = "daily_stats.json";
pub const HOURLY_JSON: &str = "hourly_patterns.json";
pub const STATIONS_JSON: &str = "station_summary.json";
pub const SUMMARY_JSON: &str = "summary_stats.json";

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn date32(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn epoch_seconds(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp()
}

fn strings<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from(values.collect::<Vec<_>>()))
}

fn floats(values: impl Iterator<Item = f64>) -> ArrayRef {
    Arc::new(Float64Array::from(values.collect::<Vec<_>>()))
}

fn nullable_floats(values: impl Iterator<Item = Option<f64>>) -> ArrayRef {
    Arc::new(Float64Array::from(values.collect::<Vec<_>>()))
}

fn counts(values: impl Iterator<Item = usize>) -> ArrayRef {
    Arc::new(UInt64Array::from(values.map(|v| v as u64).collect::<Vec<_>>()))
}

fn dates(values: impl Iterator<Item = NaiveDate>) -> ArrayRef {
    Arc::new(Date32Array::from(values.map(date32).collect::<Vec<_>>()))
}

fn timestamps(values: impl Iterator<Item = NaiveDateTime>) -> ArrayRef {
    Arc::new(TimestampSecondArray::from(
        values.map(epoch_seconds).collect::<Vec<_>>(),
    ))
}

/// Arrow batch of the raw table; pollutant columns stay nullable.
pub fn raw_batch(rows: &[Reading]) -> Result<RecordBatch> {
    let batch = RecordBatch::try_from_iter_with_nullable(vec![
        ("station_id", strings(rows.iter().map(|r| r.station_id.as_str())), false),
        ("station_type", strings(rows.iter().map(|r| r.station_type.as_str())), false),
        ("timestamp", timestamps(rows.iter().map(|r| r.timestamp)), false),
        ("pm25", nullable_floats(rows.iter().map(|r| r.pm25)), true),
        ("pm10", nullable_floats(rows.iter().map(|r| r.pm10)), true),
        ("no2", nullable_floats(rows.iter().map(|r| r.no2)), true),
        ("o3", nullable_floats(rows.iter().map(|r| r.o3)), true),
        ("so2", nullable_floats(rows.iter().map(|r| r.so2)), true),
        ("co", nullable_floats(rows.iter().map(|r| r.co)), true),
        ("temperature", floats(rows.iter().map(|r| r.temperature)), false),
        ("humidity", floats(rows.iter().map(|r| r.humidity)), false),
    ])?;
    Ok(batch)
}

/// Arrow batch of the enriched analytics table.
pub fn enriched_batch(rows: &[EnrichedReading]) -> Result<RecordBatch> {
    let batch = RecordBatch::try_from_iter_with_nullable(vec![
        ("station_id", strings(rows.iter().map(|r| r.station_id.as_str())), false),
        ("station_type", strings(rows.iter().map(|r| r.station_type.as_str())), false),
        ("timestamp", timestamps(rows.iter().map(|r| r.timestamp)), false),
        ("pm25", floats(rows.iter().map(|r| r.pm25)), false),
        ("pm10", floats(rows.iter().map(|r| r.pm10)), false),
        ("no2", floats(rows.iter().map(|r| r.no2)), false),
        ("o3", floats(rows.iter().map(|r| r.o3)), false),
        ("so2", nullable_floats(rows.iter().map(|r| r.so2)), true),
        ("co", nullable_floats(rows.iter().map(|r| r.co)), true),
        ("temperature", floats(rows.iter().map(|r| r.temperature)), false),
        ("humidity", floats(rows.iter().map(|r| r.humidity)), false),
        ("aqi", floats(rows.iter().map(|r| r.aqi)), false),
        ("health_category", strings(rows.iter().map(|r| r.health_category.label())), false),
        ("health_color", strings(rows.iter().map(|r| r.health_color)), false),
        (
            "hour",
            Arc::new(UInt32Array::from(rows.iter().map(|r| r.hour).collect::<Vec<_>>())) as ArrayRef,
            false,
        ),
        (
            "day_of_week",
            Arc::new(UInt32Array::from(rows.iter().map(|r| r.day_of_week).collect::<Vec<_>>())) as ArrayRef,
            false,
        ),
        ("date", dates(rows.iter().map(|r| r.date)), false),
    ])?;
    Ok(batch)
}

fn hourly_batch(rows: &[HourlyPattern]) -> Result<RecordBatch> {
    let batch = RecordBatch::try_from_iter_with_nullable(vec![
        (
            "hour",
            Arc::new(UInt32Array::from(rows.iter().map(|r| r.hour).collect::<Vec<_>>())) as ArrayRef,
            false,
        ),
        ("avg_pm25", floats(rows.iter().map(|r| r.avg_pm25)), false),
        ("avg_pm10", floats(rows.iter().map(|r| r.avg_pm10)), false),
        ("avg_no2", floats(rows.iter().map(|r| r.avg_no2)), false),
        ("avg_o3", floats(rows.iter().map(|r| r.avg_o3)), false),
        ("avg_aqi", floats(rows.iter().map(|r| r.avg_aqi)), false),
        ("measurements", counts(rows.iter().map(|r| r.measurements)), false),
    ])?;
    Ok(batch)
}

fn daily_batch(rows: &[DailyStat]) -> Result<RecordBatch> {
    let batch = RecordBatch::try_from_iter_with_nullable(vec![
        ("date", dates(rows.iter().map(|r| r.date)), false),
        ("station_id", strings(rows.iter().map(|r| r.station_id.as_str())), false),
        ("station_type", strings(rows.iter().map(|r| r.station_type.as_str())), false),
        ("avg_pm25", floats(rows.iter().map(|r| r.avg_pm25)), false),
        ("max_pm25", floats(rows.iter().map(|r| r.max_pm25)), false),
        ("min_pm25", floats(rows.iter().map(|r| r.min_pm25)), false),
        ("avg_pm10", floats(rows.iter().map(|r| r.avg_pm10)), false),
        ("avg_no2", floats(rows.iter().map(|r| r.avg_no2)), false),
        ("avg_o3", floats(rows.iter().map(|r| r.avg_o3)), false),
        ("avg_aqi", floats(rows.iter().map(|r| r.avg_aqi)), false),
        ("max_aqi", floats(rows.iter().map(|r| r.max_aqi)), false),
        ("measurements", counts(rows.iter().map(|r| r.measurements)), false),
        ("good_hours", counts(rows.iter().map(|r| r.good_hours)), false),
        ("unhealthy_hours", counts(rows.iter().map(|r| r.unhealthy_hours)), false),
    ])?;
    Ok(batch)
}

fn station_batch(rows: &[StationSummary]) -> Result<RecordBatch> {
    let batch = RecordBatch::try_from_iter_with_nullable(vec![
        ("station_id", strings(rows.iter().map(|r| r.station_id.as_str())), false),
        ("station_type", strings(rows.iter().map(|r| r.station_type.as_str())), false),
        ("avg_pm25", floats(rows.iter().map(|r| r.avg_pm25)), false),
        ("avg_aqi", floats(rows.iter().map(|r| r.avg_aqi)), false),
        ("max_aqi", floats(rows.iter().map(|r| r.max_aqi)), false),
        ("total_measurements", counts(rows.iter().map(|r| r.total_measurements)), false),
        ("pct_good", floats(rows.iter().map(|r| r.pct_good)), false),
        ("pct_unhealthy", floats(rows.iter().map(|r| r.pct_unhealthy)), false),
    ])?;
    Ok(batch)
}

/// Writes through a temporary sibling file, then renames it over `path`.
fn replace_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(File) -> Result<()>,
{
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let file = File::create(&tmp)?;
    if let Err(e) = write(file) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Writes a single record batch as a Snappy-compressed Parquet file.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<()> {
    replace_file(path, |file| {
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;
        Ok(())
    })?;
    debug!(path = %path.display(), rows = batch.num_rows(), "Parquet written");
    Ok(())
}

/// Serializes `value` as JSON. Arrays come out as one object per row.
pub fn write_json(path: &Path, value: &impl Serialize, pretty: bool) -> Result<()> {
    replace_file(path, |file| {
        let mut writer = BufWriter::new(file);
        if pretty {
            serde_json::to_writer_pretty(&mut writer, value)?;
        } else {
            serde_json::to_writer(&mut writer, value)?;
        }
        writer.flush()?;
        Ok(())
    })?;
    debug!(path = %path.display(), "JSON written");
    Ok(())
}

/// Object-safe handle over the serializable views, so they can share one writer closure.
trait JsonView {
    fn write_json(&self, path: &Path, pretty: bool) -> Result<()>;
}

impl<T: Serialize> JsonView for T {
    fn write_json(&self, path: &Path, pretty: bool) -> Result<()> {
        write_json(path, self, pretty)
    }
}

/// Writes every analytics artifact into `dir` and returns their paths.
#[tracing::instrument(skip(rows, aggregates), fields(dir = %dir.display()))]
pub fn export_all(dir: &Path, rows: &[EnrichedReading], aggregates: &Aggregates) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    let mut parquet = |name: &str, batch: RecordBatch| -> Result<()> {
        let path = dir.join(name);
        write_parquet(&path, &batch)?;
        written.push(path);
        Ok(())
    };

    parquet(ANALYTICS_PARQUET, enriched_batch(rows)?)?;
    parquet(DAILY_PARQUET, daily_batch(&aggregates.daily)?)?;
    parquet(HOURLY_PARQUET, hourly_batch(&aggregates.hourly)?)?;
    parquet(STATIONS_PARQUET, station_batch(&aggregates.stations)?)?;

    let mut json = |name: &str, value: &dyn JsonView, pretty: bool| -> Result<()> {
        let path = dir.join(name);
        value.write_json(&path, pretty)?;
        written.push(path);
        Ok(())
    };

    json(HOURLY_JSON, &aggregates.hourly, false)?;
    json(STATIONS_JSON, &aggregates.stations, false)?;
    json(DAILY_JSON, &aggregates.daily, false)?;
    json(SUMMARY_JSON, &aggregates.summary, true)?;

    info!(artifacts = written.len(), "Export complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::StationType;
    use crate::transform::aggregate::aggregate;
    use crate::transform::types::ImputedPollutants;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    fn sample_rows() -> Vec<EnrichedReading> {
        (0..3)
            .map(|hour| {
                let reading = Reading {
                    station_id: "ST004".to_string(),
                    station_type: StationType::Traffic,
                    timestamp: NaiveDate::from_ymd_opt(2025, 11, 1)
                        .unwrap()
                        .and_hms_opt(hour, 0, 0)
                        .unwrap(),
                    pm25: None,
                    pm10: Some(80.0),
                    no2: Some(45.0),
                    o3: Some(33.0),
                    so2: Some(11.0),
                    co: Some(1.1),
                    temperature: 21.0,
                    humidity: 65.0,
                };
                let pollutants = ImputedPollutants {
                    pm25: 40.0 + hour as f64,
                    pm10: 80.0,
                    no2: 45.0,
                    o3: 33.0,
                };
                EnrichedReading::from_imputed(&reading, pollutants)
            })
            .collect()
    }

    #[test]
    fn test_date32_counts_from_unix_epoch() {
        assert_eq!(date32(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()), 0);
        assert_eq!(date32(NaiveDate::from_ymd_opt(1970, 1, 2).unwrap()), 1);
    }

    #[test]
    fn test_export_all_writes_every_artifact() {
        let dir = tempdir().unwrap();
        let rows = sample_rows();
        let aggregates = aggregate(&rows);

        let written = export_all(dir.path(), &rows, &aggregates).unwrap();

        assert_eq!(written.len(), 8);
        for path in &written {
            assert!(path.exists(), "missing {}", path.display());
        }
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_enriched_parquet_keeps_row_count() {
        let dir = tempdir().unwrap();
        let rows = sample_rows();
        let path = dir.path().join(ANALYTICS_PARQUET);

        write_parquet(&path, &enriched_batch(&rows).unwrap()).unwrap();

        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let total: usize = reader.map(|b| b.unwrap().num_rows()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_json_arrays_are_row_objects() {
        let dir = tempdir().unwrap();
        let rows = sample_rows();
        let aggregates = aggregate(&rows);
        export_all(dir.path(), &rows, &aggregates).unwrap();

        let hourly: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(HOURLY_JSON)).unwrap()).unwrap();
        let first = &hourly.as_array().unwrap()[0];
        assert_eq!(first["hour"], 0);
        assert_eq!(first["avg_pm25"], 40.0);
        assert_eq!(first["measurements"], 1);

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join(SUMMARY_JSON)).unwrap()).unwrap();
        assert_eq!(summary["total_records"], 3);
        assert_eq!(summary["total_stations"], 1);
    }

    #[test]
    fn test_rewrite_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("view.json");

        write_json(&path, &vec![1, 2, 3], false).unwrap();
        write_json(&path, &vec![4], false).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[4]");
    }
}
