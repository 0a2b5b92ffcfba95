//! Data types produced by the transform stage.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::reading::{Reading, StationType, timestamp_format};
use crate::transform::aqi::{AirQuality, HealthCategory};

/// A cleaned reading: imputed pollutants plus AQI and calendar fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedReading {
    pub station_id: String,
    pub station_type: StationType,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub pm25: f64,
    pub pm10: f64,
    pub no2: f64,
    pub o3: f64,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: f64,
    pub health_category: HealthCategory,
    pub health_color: &'static str,
    pub hour: u32,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u32,
    pub date: NaiveDate,
}

/// Pollutant values after imputation, before enrichment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImputedPollutants {
    pub pm25: f64,
    pub pm10: f64,
    pub no2: f64,
    pub o3: f64,
}

impl EnrichedReading {
    /// Derives AQI, category and calendar fields for one imputed row.
    pub fn from_imputed(reading: &Reading, pollutants: ImputedPollutants) -> Self {
        let quality = AirQuality::from_pm25(pollutants.pm25);
        let timestamp = reading.timestamp;

        Self {
            station_id: reading.station_id.clone(),
            station_type: reading.station_type,
            timestamp,
            pm25: pollutants.pm25,
            pm10: pollutants.pm10,
            no2: pollutants.no2,
            o3: pollutants.o3,
            so2: reading.so2,
            co: reading.co,
            temperature: reading.temperature,
            humidity: reading.humidity,
            aqi: quality.aqi,
            health_category: quality.category,
            health_color: quality.color(),
            hour: timestamp.hour(),
            day_of_week: timestamp.weekday().num_days_from_sunday(),
            date: timestamp.date(),
        }
    }
}

/// Mean pollution per hour of day across all stations and dates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyPattern {
    pub hour: u32,
    pub avg_pm25: f64,
    pub avg_pm10: f64,
    pub avg_no2: f64,
    pub avg_o3: f64,
    pub avg_aqi: f64,
    pub measurements: usize,
}

/// Per-station statistics for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    pub station_id: String,
    pub station_type: StationType,
    pub avg_pm25: f64,
    pub max_pm25: f64,
    pub min_pm25: f64,
    pub avg_pm10: f64,
    pub avg_no2: f64,
    pub avg_o3: f64,
    pub avg_aqi: f64,
    pub max_aqi: f64,
    pub measurements: usize,
    pub good_hours: usize,
    pub unhealthy_hours: usize,
}

/// Lifetime statistics for one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationSummary {
    pub station_id: String,
    pub station_type: StationType,
    pub avg_pm25: f64,
    pub avg_aqi: f64,
    pub max_aqi: f64,
    pub total_measurements: usize,
    pub pct_good: f64,
    pub pct_unhealthy: f64,
}

/// Single-record overview of the whole analytics dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_records: usize,
    pub total_days: usize,
    pub total_stations: usize,
    pub avg_pm25: f64,
    pub max_pm25: f64,
    pub avg_aqi: f64,
    pub max_aqi: f64,
    pub pct_good: f64,
    pub pct_moderate: f64,
    pub pct_unhealthy: f64,
}

/// Every derived view of one transform run.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates {
    pub hourly: Vec<HourlyPattern>,
    pub daily: Vec<DailyStat>,
    pub stations: Vec<StationSummary>,
    pub summary: SummaryStats,
}
