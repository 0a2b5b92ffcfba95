//! Synthetic air-quality generator.
//!
//! Produces hourly readings for a fixed set of monitoring stations with
//! rush-hour and weekend effects and a small share of missing values, then
//! writes them to the extract CSV consumed by the loader.

use std::path::Path;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use csv::WriterBuilder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::error::Result;
use crate::reading::{Reading, StationType};
use crate::store::NullCounts;
use crate::transform::utility::round_to;

/// Monitoring stations and their site types.
pub const STATIONS: [(&str, StationType); 5] = [
    ("ST001", StationType::Urban),
    ("ST002", StationType::Industrial),
    ("ST003", StationType::Residential),
    ("ST004", StationType::Traffic),
    ("ST005", StationType::Background),
];

/// First generated day when no explicit date is requested.
pub const DEFAULT_START: (i32, u32, u32) = (2025, 11, 1);
pub const DEFAULT_DAYS: u32 = 30;

const RUSH_HOURS: [u32; 6] = [7, 8, 9, 17, 18, 19];
const RUSH_FACTOR: f64 = 1.5;
const WEEKEND_FACTOR: f64 = 0.7;

const PM25_MISSING_RATE: f64 = 0.05;
const NO2_MISSING_RATE: f64 = 0.03;
const O3_MISSING_RATE: f64 = 0.02;

/// Typical PM2.5 level (µg/m³) for each kind of site.
fn base_pm25(station_type: StationType) -> f64 {
    match station_type {
        StationType::Urban => 35.0,
        StationType::Industrial => 55.0,
        StationType::Residential => 25.0,
        StationType::Traffic => 45.0,
        StationType::Background => 15.0,
    }
}

/// Which days to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRange {
    /// A single day.
    Single(NaiveDate),
    /// `days` consecutive days starting at `start`.
    Span { start: NaiveDate, days: u32 },
}

impl DateRange {
    pub fn dates(&self) -> Vec<NaiveDate> {
        match *self {
            DateRange::Single(date) => vec![date],
            DateRange::Span { start, days } => (0..days)
                .map(|i| start + Duration::days(i64::from(i)))
                .collect(),
        }
    }
}

/// Seed for one generated day, derived from the base seed.
///
/// Each day gets its own stream, so regenerating a single date reproduces the
/// same readings as a multi-day run.
pub fn day_seed(base_seed: u64, date: NaiveDate) -> u64 {
    let day = u64::from(date.num_days_from_ce().unsigned_abs());
    base_seed ^ day.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Generates 24 hourly readings per station for `date` using `rng`.
pub fn generate_day<R: Rng>(rng: &mut R, date: NaiveDate) -> Vec<Reading> {
    let is_weekend = matches!(date.weekday(), Weekday::Sat | Weekday::Sun);
    let weekend_factor = if is_weekend { WEEKEND_FACTOR } else { 1.0 };

    let mut readings = Vec::with_capacity(STATIONS.len() * 24);

    for (station_id, station_type) in STATIONS {
        let pm25_base = base_pm25(station_type);
        let pm10_base = pm25_base * 1.8;

        for hour in 0..24 {
            let rush_factor = if RUSH_HOURS.contains(&hour) { RUSH_FACTOR } else { 1.0 };
            let traffic = rush_factor * weekend_factor;

            let Some(timestamp) = date.and_hms_opt(hour, 0, 0) else {
                continue;
            };

            let mut reading = Reading {
                station_id: station_id.to_string(),
                station_type,
                timestamp,
                pm25: Some(round_to(pm25_base * traffic * rng.gen_range(0.7..1.3), 2)),
                pm10: Some(round_to(pm10_base * traffic * rng.gen_range(0.6..1.4), 2)),
                no2: Some(round_to(30.0 * traffic * rng.gen_range(0.8..1.2), 2)),
                o3: Some(round_to(rng.gen_range(20.0..80.0), 2)),
                so2: Some(round_to(rng.gen_range(5.0..20.0), 2)),
                co: Some(round_to(0.8 * rush_factor * rng.gen_range(0.6..1.4), 2)),
                temperature: round_to(rng.gen_range(10.0..35.0), 1),
                humidity: round_to(rng.gen_range(40.0_f64..90.0).min(100.0), 1),
            };

            if rng.gen_bool(PM25_MISSING_RATE) {
                reading.pm25 = None;
            }
            if rng.gen_bool(NO2_MISSING_RATE) {
                reading.no2 = None;
            }
            if rng.gen_bool(O3_MISSING_RATE) {
                reading.o3 = None;
            }

            readings.push(reading);
        }
    }

    readings
}

/// Generates readings for every day in `range`, one seeded stream per day.
pub fn generate(range: DateRange, base_seed: u64) -> Vec<Reading> {
    range
        .dates()
        .into_iter()
        .flat_map(|date| {
            let mut rng = StdRng::seed_from_u64(day_seed(base_seed, date));
            generate_day(&mut rng, date)
        })
        .collect()
}

/// Writes readings to `path` as CSV, replacing any existing file.
pub fn write_csv(path: &Path, readings: &[Reading]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new().has_headers(true).from_path(path)?;
    for reading in readings {
        writer.serialize(reading)?;
    }
    writer.flush()?;

    debug!(path = %path.display(), rows = readings.len(), "Extract CSV written");
    Ok(())
}

/// Generates synthetic readings and writes the extract CSV.
#[tracing::instrument(skip(path), fields(path = %path.display()))]
pub fn extract(path: &Path, range: DateRange, base_seed: u64) -> Result<usize> {
    let readings = generate(range, base_seed);
    write_csv(path, &readings)?;

    let nulls = NullCounts::from_readings(&readings);
    let dates = range.dates();
    info!(
        records = readings.len(),
        first_date = ?dates.first(),
        last_date = ?dates.last(),
        stations = STATIONS.len(),
        missing_pm25 = nulls.pm25,
        missing_no2 = nulls.no2,
        missing_o3 = nulls.o3,
        "Extracted synthetic readings"
    );

    Ok(readings.len())
}
