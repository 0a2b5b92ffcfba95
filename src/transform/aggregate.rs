use std::collections::{BTreeMap, BTreeSet};

use crate::transform::aqi::HealthCategory;
use crate::transform::types::{
    Aggregates, DailyStat, EnrichedReading, HourlyPattern, StationSummary, SummaryStats,
};
use crate::transform::utility::{Accumulator, pct, round_to};

/// Decimal places kept for averages and extremes.
const VALUE_DECIMALS: i32 = 2;
/// Decimal places kept for percentages.
const PCT_DECIMALS: i32 = 1;

/// Running statistics for one group of enriched readings.
#[derive(Debug, Default, Clone)]
struct GroupStats {
    pm25: Accumulator,
    pm10: Accumulator,
    no2: Accumulator,
    o3: Accumulator,
    aqi: Accumulator,
    good: usize,
    moderate: usize,
    unhealthy: usize,
}

impl GroupStats {
    fn push(&mut self, row: &EnrichedReading) {
        self.pm25.push(row.pm25);
        self.pm10.push(row.pm10);
        self.no2.push(row.no2);
        self.o3.push(row.o3);
        self.aqi.push(row.aqi);

        match row.health_category {
            HealthCategory::Good => self.good += 1,
            HealthCategory::Moderate => self.moderate += 1,
            c if c.is_unhealthy() => self.unhealthy += 1,
            _ => {}
        }
    }

    fn count(&self) -> usize {
        self.aqi.count
    }
}

fn avg(acc: &Accumulator) -> f64 {
    round_to(acc.mean(), VALUE_DECIMALS)
}

fn rounded(value: f64) -> f64 {
    round_to(value, VALUE_DECIMALS)
}

fn share(part: usize, total: usize) -> f64 {
    round_to(pct(part, total), PCT_DECIMALS)
}

fn group_by<K, F>(rows: &[EnrichedReading], key: F) -> BTreeMap<K, GroupStats>
where
    K: Ord,
    F: Fn(&EnrichedReading) -> K,
{
    let mut groups: BTreeMap<K, GroupStats> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().push(row);
    }
    groups
}

/// Mean pollutant levels per hour of day, ordered by hour.
///
/// Hours with no readings are omitted rather than zero-filled.
pub fn hourly_patterns(rows: &[EnrichedReading]) -> Vec<HourlyPattern> {
    group_by(rows, |r| r.hour)
        .into_iter()
        .map(|(hour, g)| HourlyPattern {
            hour,
            avg_pm25: avg(&g.pm25),
            avg_pm10: avg(&g.pm10),
            avg_no2: avg(&g.no2),
            avg_o3: avg(&g.o3),
            avg_aqi: avg(&g.aqi),
            measurements: g.count(),
        })
        .collect()
}

/// Per-station, per-day statistics, ordered by date then station.
pub fn daily_stats(rows: &[EnrichedReading]) -> Vec<DailyStat> {
    group_by(rows, |r| (r.date, r.station_id.clone(), r.station_type))
        .into_iter()
        .map(|((date, station_id, station_type), g)| DailyStat {
            date,
            station_id,
            station_type,
            avg_pm25: avg(&g.pm25),
            max_pm25: rounded(g.pm25.max),
            min_pm25: rounded(g.pm25.min),
            avg_pm10: avg(&g.pm10),
            avg_no2: avg(&g.no2),
            avg_o3: avg(&g.o3),
            avg_aqi: avg(&g.aqi),
            max_aqi: rounded(g.aqi.max),
            measurements: g.count(),
            good_hours: g.good,
            unhealthy_hours: g.unhealthy,
        })
        .collect()
}

/// Lifetime statistics per station, ordered by station id.
pub fn station_summaries(rows: &[EnrichedReading]) -> Vec<StationSummary> {
    group_by(rows, |r| (r.station_id.clone(), r.station_type))
        .into_iter()
        .map(|((station_id, station_type), g)| StationSummary {
            station_id,
            station_type,
            avg_pm25: avg(&g.pm25),
            avg_aqi: avg(&g.aqi),
            max_aqi: rounded(g.aqi.max),
            total_measurements: g.count(),
            pct_good: share(g.good, g.count()),
            pct_unhealthy: share(g.unhealthy, g.count()),
        })
        .collect()
}

/// Dataset-wide overview. All zeros for empty input.
pub fn summary_stats(rows: &[EnrichedReading]) -> SummaryStats {
    let mut all = GroupStats::default();
    let mut days = BTreeSet::new();
    let mut stations = BTreeSet::new();

    for row in rows {
        all.push(row);
        days.insert(row.date);
        stations.insert(row.station_id.as_str());
    }

    let total = all.count();
    let (max_pm25, max_aqi) = if total == 0 {
        (0.0, 0.0)
    } else {
        (rounded(all.pm25.max), rounded(all.aqi.max))
    };

    SummaryStats {
        total_records: total,
        total_days: days.len(),
        total_stations: stations.len(),
        avg_pm25: avg(&all.pm25),
        max_pm25,
        avg_aqi: avg(&all.aqi),
        max_aqi,
        pct_good: share(all.good, total),
        pct_moderate: share(all.moderate, total),
        pct_unhealthy: share(all.unhealthy, total),
    }
}

/// Computes every aggregate view over the enriched dataset.
pub fn aggregate(rows: &[EnrichedReading]) -> Aggregates {
    Aggregates {
        hourly: hourly_patterns(rows),
        daily: daily_stats(rows),
        stations: station_summaries(rows),
        summary: summary_stats(rows),
    }
}
