//! Fills missing pollutant readings with per-station means.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::reading::{NullableField, Reading};
use crate::transform::types::ImputedPollutants;

/// Policy for a station that has no non-null value to average for a field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImputationFallback {
    /// Abort the run with [`PipelineError::UndefinedImputation`].
    #[default]
    Fail,
    /// Use the field's mean across all stations instead.
    GlobalMean,
}

impl FromStr for ImputationFallback {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fail" => Ok(ImputationFallback::Fail),
            "global-mean" => Ok(ImputationFallback::GlobalMean),
            other => Err(format!("expected `fail` or `global-mean`, got `{other}`")),
        }
    }
}

impl fmt::Display for ImputationFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImputationFallback::Fail => f.write_str("fail"),
            ImputationFallback::GlobalMean => f.write_str("global-mean"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SumCount {
    sum: f64,
    count: usize,
}

impl SumCount {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Means of one nullable field, per station and over the whole dataset.
#[derive(Debug, Default)]
pub struct FieldMeans<'a> {
    by_station: BTreeMap<&'a str, SumCount>,
    overall: SumCount,
}

impl<'a> FieldMeans<'a> {
    /// Averages the non-null values of `field` for every station in `readings`.
    pub fn compute(readings: &'a [Reading], field: NullableField) -> Self {
        let mut means = FieldMeans::default();

        for reading in readings {
            let entry = means.by_station.entry(reading.station_id.as_str()).or_default();
            if let Some(value) = field.get(reading) {
                entry.push(value);
                means.overall.push(value);
            }
        }

        means
    }

    /// Mean of the station's non-null values, `None` if it has none.
    pub fn station_mean(&self, station_id: &str) -> Option<f64> {
        self.by_station.get(station_id).and_then(SumCount::mean)
    }

    pub fn overall_mean(&self) -> Option<f64> {
        self.overall.mean()
    }

    /// Stations present in the data with no value to average.
    pub fn undefined_stations(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.by_station
            .iter()
            .filter(|(_, sc)| sc.count == 0)
            .map(|(station, _)| *station)
    }
}

/// Replacement value for each station, resolved once per field.
struct FillValues<'a> {
    field: NullableField,
    by_station: BTreeMap<&'a str, f64>,
    filled: usize,
}

impl<'a> FillValues<'a> {
    fn resolve(
        readings: &'a [Reading],
        field: NullableField,
        fallback: ImputationFallback,
    ) -> Result<Self> {
        let means = FieldMeans::compute(readings, field);
        let mut by_station = BTreeMap::new();

        for (station, sc) in &means.by_station {
            if let Some(mean) = sc.mean() {
                by_station.insert(*station, mean);
            }
        }

        if let Some(station) = means.undefined_stations().next() {
            match (fallback, means.overall_mean()) {
                (ImputationFallback::GlobalMean, Some(global)) => {
                    for station in means.undefined_stations() {
                        warn!(
                            station_id = station,
                            field = field.name(),
                            global_mean = global,
                            "Station has no observations, imputing dataset mean"
                        );
                        by_station.insert(station, global);
                    }
                }
                _ => {
                    return Err(PipelineError::UndefinedImputation {
                        station_id: station.to_string(),
                        field: field.name(),
                    });
                }
            }
        }

        Ok(Self {
            field,
            by_station,
            filled: 0,
        })
    }

    fn value_for(&mut self, reading: &Reading) -> Result<f64> {
        if let Some(value) = self.field.get(reading) {
            return Ok(value);
        }
        self.filled += 1;
        self.by_station
            .get(reading.station_id.as_str())
            .copied()
            .ok_or_else(|| PipelineError::UndefinedImputation {
                station_id: reading.station_id.clone(),
                field: self.field.name(),
            })
    }
}

/// Produces a null-free pollutant set for every reading, in input order.
///
/// Each null in `pm25`, `pm10`, `no2` or `o3` is replaced by the mean of the
/// non-null values of the same field at the same station. Non-null values are
/// kept as they are. The input is never modified.
///
/// # Errors
///
/// Returns [`PipelineError::UndefinedImputation`] if a station has no
/// observations for a field and `fallback` is [`ImputationFallback::Fail`]
/// (or the whole dataset has none).
pub fn impute(readings: &[Reading], fallback: ImputationFallback) -> Result<Vec<ImputedPollutants>> {
    let mut pm25 = FillValues::resolve(readings, NullableField::Pm25, fallback)?;
    let mut pm10 = FillValues::resolve(readings, NullableField::Pm10, fallback)?;
    let mut no2 = FillValues::resolve(readings, NullableField::No2, fallback)?;
    let mut o3 = FillValues::resolve(readings, NullableField::O3, fallback)?;

    let imputed = readings
        .iter()
        .map(|r| {
            Ok(ImputedPollutants {
                pm25: pm25.value_for(r)?,
                pm10: pm10.value_for(r)?,
                no2: no2.value_for(r)?,
                o3: o3.value_for(r)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        pm25 = pm25.filled,
        pm10 = pm10.filled,
        no2 = no2.filled,
        o3 = o3.filled,
        "Imputed missing values"
    );

    Ok(imputed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::StationType;
    use chrono::NaiveDate;

    fn reading(station: &str, hour: u32, pm25: Option<f64>) -> Reading {
        Reading {
            station_id: station.to_string(),
            station_type: StationType::Urban,
            timestamp: NaiveDate::from_ymd_opt(2025, 11, 1)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            pm25,
            pm10: Some(40.0),
            no2: Some(30.0),
            o3: Some(20.0),
            so2: Some(10.0),
            co: Some(0.8),
            temperature: 22.0,
            humidity: 60.0,
        }
    }

    #[test]
    fn test_null_takes_station_mean() {
        let readings = vec![
            reading("ST001", 0, Some(10.0)),
            reading("ST001", 1, Some(20.0)),
            reading("ST001", 2, Some(30.0)),
            reading("ST001", 3, None),
        ];

        let imputed = impute(&readings, ImputationFallback::Fail).unwrap();

        assert_eq!(imputed.len(), 4);
        assert_eq!(imputed[3].pm25, 20.0);
        assert_eq!(imputed[0].pm25, 10.0);
        assert_eq!(imputed[2].pm25, 30.0);
    }

    #[test]
    fn test_means_are_per_station() {
        let readings = vec![
            reading("ST001", 0, Some(10.0)),
            reading("ST001", 1, None),
            reading("ST002", 0, Some(100.0)),
            reading("ST002", 1, None),
        ];

        let imputed = impute(&readings, ImputationFallback::Fail).unwrap();

        assert_eq!(imputed[1].pm25, 10.0);
        assert_eq!(imputed[3].pm25, 100.0);
    }

    #[test]
    fn test_input_is_left_untouched() {
        let readings = vec![reading("ST001", 0, Some(10.0)), reading("ST001", 1, None)];
        let before = readings.clone();

        impute(&readings, ImputationFallback::Fail).unwrap();

        assert_eq!(readings, before);
    }

    #[test]
    fn test_station_without_observations_fails_by_default() {
        let readings = vec![
            reading("ST001", 0, Some(10.0)),
            reading("ST002", 0, None),
            reading("ST002", 1, None),
        ];

        let err = impute(&readings, ImputationFallback::Fail).unwrap_err();

        match err {
            PipelineError::UndefinedImputation { station_id, field } => {
                assert_eq!(station_id, "ST002");
                assert_eq!(field, "pm25");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_global_mean_fallback() {
        let readings = vec![
            reading("ST001", 0, Some(10.0)),
            reading("ST001", 1, Some(30.0)),
            reading("ST002", 0, None),
        ];

        let imputed = impute(&readings, ImputationFallback::GlobalMean).unwrap();

        assert_eq!(imputed[2].pm25, 20.0);
    }

    #[test]
    fn test_global_mean_fallback_fails_without_any_data() {
        let readings = vec![reading("ST001", 0, None), reading("ST002", 0, None)];

        let err = impute(&readings, ImputationFallback::GlobalMean).unwrap_err();

        assert!(matches!(err, PipelineError::UndefinedImputation { .. }));
    }

    #[test]
    fn test_field_means_reports_undefined_stations() {
        let readings = vec![reading("ST001", 0, Some(1.0)), reading("ST002", 0, None)];
        let means = FieldMeans::compute(&readings, NullableField::Pm25);

        assert_eq!(means.station_mean("ST001"), Some(1.0));
        assert_eq!(means.station_mean("ST002"), None);
        assert_eq!(means.undefined_stations().collect::<Vec<_>>(), vec!["ST002"]);
    }

    #[test]
    fn test_fallback_parses_from_str() {
        assert_eq!("fail".parse::<ImputationFallback>(), Ok(ImputationFallback::Fail));
        assert_eq!("global-mean".parse::<ImputationFallback>(), Ok(ImputationFallback::GlobalMean));
        assert!("median".parse::<ImputationFallback>().is_err());
    }
}
