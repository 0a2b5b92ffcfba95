//! Raw sensor readings as produced by the generator and kept in the raw store.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp layout used in the extract CSV and the raw table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of monitoring site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StationType {
    Urban,
    Industrial,
    Residential,
    Traffic,
    Background,
}

impl StationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StationType::Urban => "urban",
            StationType::Industrial => "industrial",
            StationType::Residential => "residential",
            StationType::Traffic => "traffic",
            StationType::Background => "background",
        }
    }
}

impl fmt::Display for StationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "urban" => Ok(StationType::Urban),
            "industrial" => Ok(StationType::Industrial),
            "residential" => Ok(StationType::Residential),
            "traffic" => Ok(StationType::Traffic),
            "background" => Ok(StationType::Background),
            other => Err(format!("unknown station type `{other}`")),
        }
    }
}

/// One hourly measurement, exactly as extracted. Pollutants may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: String,
    pub station_type: StationType,
    #[serde(with = "timestamp_format")]
    pub timestamp: NaiveDateTime,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub so2: Option<f64>,
    pub co: Option<f64>,
    pub temperature: f64,
    pub humidity: f64,
}

/// Pollutant columns that may be null in the raw data and get imputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullableField {
    Pm25,
    Pm10,
    No2,
    O3,
}

impl NullableField {
    /// Column name in the raw and analytics tables.
    pub fn name(&self) -> &'static str {
        match self {
            NullableField::Pm25 => "pm25",
            NullableField::Pm10 => "pm10",
            NullableField::No2 => "no2",
            NullableField::O3 => "o3",
        }
    }

    pub fn get(&self, reading: &Reading) -> Option<f64> {
        match self {
            NullableField::Pm25 => reading.pm25,
            NullableField::Pm10 => reading.pm10,
            NullableField::No2 => reading.no2,
            NullableField::O3 => reading.o3,
        }
    }
}

/// Serde adapter for the `YYYY-MM-DD HH:MM:SS` timestamp layout.
pub mod timestamp_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_station_type_round_trips_through_str() {
        for ty in [
            StationType::Urban,
            StationType::Industrial,
            StationType::Residential,
            StationType::Traffic,
            StationType::Background,
        ] {
            assert_eq!(ty.as_str().parse::<StationType>(), Ok(ty));
        }
        assert!("suburban".parse::<StationType>().is_err());
    }

    #[test]
    fn test_reading_csv_row_keeps_empty_fields_as_none() {
        let data = "station_id,station_type,timestamp,pm25,pm10,no2,o3,so2,co,temperature,humidity\n\
                    ST001,urban,2025-11-01 07:00:00,,50.5,,40,10,0.8,22.5,60.1\n";
        let mut rdr = csv::Reader::from_reader(data.as_bytes());
        let reading: Reading = rdr.deserialize().next().unwrap().unwrap();

        assert_eq!(reading.station_id, "ST001");
        assert_eq!(reading.station_type, StationType::Urban);
        assert_eq!(reading.timestamp.format(TIMESTAMP_FORMAT).to_string(), "2025-11-01 07:00:00");
        assert_eq!(reading.pm25, None);
        assert_eq!(reading.pm10, Some(50.5));
        assert_eq!(reading.no2, None);
        assert_eq!(NullableField::O3.get(&reading), Some(40.0));
    }
}
