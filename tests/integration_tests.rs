use std::fs;
use std::time::Duration;

use airq_elt::config::Config;
use airq_elt::error::PipelineError;
use airq_elt::export::{DAILY_JSON, HOURLY_JSON, STATIONS_JSON, SUMMARY_JSON};
use airq_elt::extract::{self, DateRange, STATIONS};
use airq_elt::store::{NullCounts, Store};
use airq_elt::{load, pipeline, transform, validate};
use chrono::NaiveDate;
use serde_json::Value;
use tempfile::TempDir;

fn config(dir: &TempDir) -> Config {
    let mut config = Config::new(dir.path());
    config.retry_delay = Duration::ZERO;
    config
}

fn one_day() -> DateRange {
    DateRange::Single(NaiveDate::from_ymd_opt(2025, 11, 1).unwrap())
}

fn extract_and_load(config: &Config, range: DateRange) {
    extract::extract(&config.extract_path(), range, config.seed).unwrap();
    load::load(config).unwrap();
}

fn read_json(config: &Config, name: &str) -> Value {
    let text = fs::read_to_string(config.analytics_dir().join(name)).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[test]
fn test_one_day_end_to_end_summary() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    extract_and_load(&config, one_day());

    let summary = transform::transform(&config).unwrap();

    assert_eq!(summary.total_records, 120);
    assert_eq!(summary.total_stations, 5);
    assert_eq!(summary.total_days, 1);

    let json = read_json(&config, SUMMARY_JSON);
    assert_eq!(json["total_records"], 120);
    assert_eq!(json["total_stations"], 5);

    let hourly = read_json(&config, HOURLY_JSON);
    let hours: Vec<u64> = hourly
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["hour"].as_u64().unwrap())
        .collect();
    assert_eq!(hours, (0..24).collect::<Vec<_>>());

    assert_eq!(read_json(&config, STATIONS_JSON).as_array().unwrap().len(), STATIONS.len());
    assert_eq!(read_json(&config, DAILY_JSON).as_array().unwrap().len(), STATIONS.len());
}

#[test]
fn test_transform_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    extract_and_load(&config, DateRange::Span {
        start: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
        days: 3,
    });

    let read_all = || {
        [HOURLY_JSON, DAILY_JSON, STATIONS_JSON, SUMMARY_JSON]
            .map(|name| fs::read(config.analytics_dir().join(name)).unwrap())
    };

    let first_summary = transform::transform(&config).unwrap();
    let first = read_all();
    let second_summary = transform::transform(&config).unwrap();
    let second = read_all();

    assert_eq!(first_summary, second_summary);
    assert_eq!(first, second);

    let store = Store::open(&config.db_path()).unwrap();
    assert_eq!(store.analytics_count().unwrap(), 360);
    assert_eq!(store.count("daily_stats").unwrap(), 15);
}

#[test]
fn test_raw_nulls_survive_transform() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let range = DateRange::Span {
        start: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
        days: 5,
    };
    extract_and_load(&config, range);
    let expected = NullCounts::from_readings(&extract::generate(range, config.seed));
    assert!(expected.pm25 > 0);

    transform::transform(&config).unwrap();

    let store = Store::open(&config.db_path()).unwrap();
    assert_eq!(store.raw_null_counts().unwrap(), expected);
    assert_eq!(store.load_audit().unwrap().unwrap().nulls, expected);
}

#[test]
fn test_validate_after_transform() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    extract_and_load(&config, one_day());
    transform::transform(&config).unwrap();

    let report = validate::validate(&config).unwrap();

    assert!(report.passed());
    assert_eq!(report.raw_count, 120);
    assert_eq!(report.analytics_count, 120);
}

#[test]
fn test_transform_before_load_fails() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let err = transform::transform(&config).unwrap_err();

    assert!(matches!(err, PipelineError::MissingRawData { .. }));
    assert!(!config.analytics_dir().join(SUMMARY_JSON).exists());
}

#[test]
fn test_pipeline_run() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let range = DateRange::Span {
        start: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap(),
        days: 2,
    };

    let outcome = pipeline::run(&config, range).unwrap();

    assert_eq!(outcome.extracted, 240);
    assert_eq!(outcome.loaded, 240);
    assert_eq!(outcome.summary.total_days, 2);
    assert!(outcome.report.passed());
}
