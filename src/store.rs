//! SQLite-backed raw and analytics stores.
//!
//! The raw table is replaced wholesale by each load and is only ever read by
//! the transform. The analytics table and the aggregate tables are dropped and
//! rebuilt in a single transaction on every transform run.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::reading::{Reading, StationType, TIMESTAMP_FORMAT};
use crate::transform::types::{Aggregates, EnrichedReading};

pub const RAW_TABLE: &str = "raw_data_air_quality";
pub const ANALYTICS_TABLE: &str = "analytics_air_quality";
pub const LOAD_AUDIT_TABLE: &str = "load_audit";

const DATE_FORMAT: &str = "%Y-%m-%d";

const CREATE_RAW: &str = "
    DROP TABLE IF EXISTS raw_data_air_quality;
    CREATE TABLE raw_data_air_quality (
        station_id   TEXT NOT NULL,
        station_type TEXT NOT NULL,
        timestamp    TEXT NOT NULL,
        pm25         REAL,
        pm10         REAL,
        no2          REAL,
        o3           REAL,
        so2          REAL,
        co           REAL,
        temperature  REAL NOT NULL,
        humidity     REAL NOT NULL
    );
    DROP TABLE IF EXISTS load_audit;
    CREATE TABLE load_audit (
        row_count  INTEGER NOT NULL,
        pm25_nulls INTEGER NOT NULL,
        pm10_nulls INTEGER NOT NULL,
        no2_nulls  INTEGER NOT NULL,
        o3_nulls   INTEGER NOT NULL
    );
";

const CREATE_ANALYTICS: &str = "
    DROP TABLE IF EXISTS analytics_air_quality;
    CREATE TABLE analytics_air_quality (
        station_id      TEXT NOT NULL,
        station_type    TEXT NOT NULL,
        timestamp       TEXT NOT NULL,
        pm25            REAL NOT NULL,
        pm10            REAL NOT NULL,
        no2             REAL NOT NULL,
        o3              REAL NOT NULL,
        so2             REAL,
        co              REAL,
        temperature     REAL NOT NULL,
        humidity        REAL NOT NULL,
        aqi             REAL NOT NULL,
        health_category TEXT NOT NULL,
        health_color    TEXT NOT NULL,
        hour            INTEGER NOT NULL,
        day_of_week     INTEGER NOT NULL,
        date            TEXT NOT NULL
    );
    DROP TABLE IF EXISTS hourly_patterns;
    CREATE TABLE hourly_patterns (
        hour         INTEGER PRIMARY KEY,
        avg_pm25     REAL NOT NULL,
        avg_pm10     REAL NOT NULL,
        avg_no2      REAL NOT NULL,
        avg_o3       REAL NOT NULL,
        avg_aqi      REAL NOT NULL,
        measurements INTEGER NOT NULL
    );
    DROP TABLE IF EXISTS daily_stats;
    CREATE TABLE daily_stats (
        date            TEXT NOT NULL,
        station_id      TEXT NOT NULL,
        station_type    TEXT NOT NULL,
        avg_pm25        REAL NOT NULL,
        max_pm25        REAL NOT NULL,
        min_pm25        REAL NOT NULL,
        avg_pm10        REAL NOT NULL,
        avg_no2         REAL NOT NULL,
        avg_o3          REAL NOT NULL,
        avg_aqi         REAL NOT NULL,
        max_aqi         REAL NOT NULL,
        measurements    INTEGER NOT NULL,
        good_hours      INTEGER NOT NULL,
        unhealthy_hours INTEGER NOT NULL
    );
    DROP TABLE IF EXISTS station_summary;
    CREATE TABLE station_summary (
        station_id         TEXT NOT NULL,
        station_type       TEXT NOT NULL,
        avg_pm25           REAL NOT NULL,
        avg_aqi            REAL NOT NULL,
        max_aqi            REAL NOT NULL,
        total_measurements INTEGER NOT NULL,
        pct_good           REAL NOT NULL,
        pct_unhealthy      REAL NOT NULL
    );
";

/// Null counts of the imputable pollutant columns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NullCounts {
    pub pm25: usize,
    pub pm10: usize,
    pub no2: usize,
    pub o3: usize,
}

impl NullCounts {
    pub fn from_readings(readings: &[Reading]) -> Self {
        let count = |f: fn(&Reading) -> Option<f64>| readings.iter().filter(|r| f(r).is_none()).count();
        Self {
            pm25: count(|r| r.pm25),
            pm10: count(|r| r.pm10),
            no2: count(|r| r.no2),
            o3: count(|r| r.o3),
        }
    }

    pub fn total(&self) -> usize {
        self.pm25 + self.pm10 + self.no2 + self.o3
    }
}

/// Row count and null counts captured when the raw table was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadAudit {
    pub row_count: usize,
    pub nulls: NullCounts,
}

/// Handle on the pipeline database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens (or creates) the database file, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "Opening store");
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Drops and recreates the raw table, inserts `readings` unchanged and
    /// records a [`LoadAudit`], all in one transaction.
    pub fn replace_raw(&mut self, readings: &[Reading]) -> Result<LoadAudit> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(CREATE_RAW)?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO raw_data_air_quality
                 (station_id, station_type, timestamp, pm25, pm10, no2, o3, so2, co, temperature, humidity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for r in readings {
                stmt.execute(params![
                    r.station_id,
                    r.station_type.as_str(),
                    r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    r.pm25,
                    r.pm10,
                    r.no2,
                    r.o3,
                    r.so2,
                    r.co,
                    r.temperature,
                    r.humidity,
                ])?;
            }
        }

        let audit = LoadAudit {
            row_count: count_rows(&tx, RAW_TABLE)?,
            nulls: null_counts(&tx)?,
        };
        tx.execute(
            "INSERT INTO load_audit (row_count, pm25_nulls, pm10_nulls, no2_nulls, o3_nulls)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                audit.row_count as i64,
                audit.nulls.pm25 as i64,
                audit.nulls.pm10 as i64,
                audit.nulls.no2 as i64,
                audit.nulls.o3 as i64,
            ],
        )?;
        tx.commit()?;

        Ok(audit)
    }

    pub fn raw_count(&self) -> Result<usize> {
        count_rows(&self.conn, RAW_TABLE)
    }

    /// Current null counts of the raw table.
    pub fn raw_null_counts(&self) -> Result<NullCounts> {
        null_counts(&self.conn)
    }

    /// Audit row written by the last load, if any.
    pub fn load_audit(&self) -> Result<Option<LoadAudit>> {
        if !self.table_exists(LOAD_AUDIT_TABLE)? {
            return Ok(None);
        }
        let audit = self
            .conn
            .query_row(
                "SELECT row_count, pm25_nulls, pm10_nulls, no2_nulls, o3_nulls FROM load_audit",
                [],
                |row| {
                    Ok(LoadAudit {
                        row_count: row.get::<_, i64>(0)? as usize,
                        nulls: NullCounts {
                            pm25: row.get::<_, i64>(1)? as usize,
                            pm10: row.get::<_, i64>(2)? as usize,
                            no2: row.get::<_, i64>(3)? as usize,
                            o3: row.get::<_, i64>(4)? as usize,
                        },
                    })
                },
            )
            .optional()?;
        Ok(audit)
    }

    /// Reads the raw table in insertion order.
    pub fn read_raw(&self) -> Result<Vec<Reading>> {
        let mut stmt = self.conn.prepare(
            "SELECT station_id, station_type, timestamp, pm25, pm10, no2, o3, so2, co, temperature, humidity
             FROM raw_data_air_quality ORDER BY rowid",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                [
                    row.get::<_, Option<f64>>(3)?,
                    row.get::<_, Option<f64>>(4)?,
                    row.get::<_, Option<f64>>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, Option<f64>>(7)?,
                    row.get::<_, Option<f64>>(8)?,
                ],
                row.get::<_, f64>(9)?,
                row.get::<_, f64>(10)?,
            ))
        })?;

        let mut readings = Vec::new();
        for (idx, row) in rows.enumerate() {
            let (station_id, station_type, timestamp, [pm25, pm10, no2, o3, so2, co], temperature, humidity) =
                row?;

            let station_type = station_type
                .parse::<StationType>()
                .map_err(|reason| PipelineError::InvalidRecord { row: idx, reason })?;
            let timestamp = NaiveDateTime::parse_from_str(&timestamp, TIMESTAMP_FORMAT).map_err(|e| {
                PipelineError::InvalidRecord {
                    row: idx,
                    reason: format!("bad timestamp `{timestamp}`: {e}"),
                }
            })?;

            readings.push(Reading {
                station_id,
                station_type,
                timestamp,
                pm25,
                pm10,
                no2,
                o3,
                so2,
                co,
                temperature,
                humidity,
            });
        }

        Ok(readings)
    }

    /// Rebuilds the analytics table and all aggregate tables in one transaction.
    pub fn replace_analytics(&mut self, rows: &[EnrichedReading], aggregates: &Aggregates) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(CREATE_ANALYTICS)?;

        insert_enriched(&tx, rows)?;
        insert_aggregates(&tx, aggregates)?;

        tx.commit()?;
        Ok(())
    }

    pub fn analytics_count(&self) -> Result<usize> {
        count_rows(&self.conn, ANALYTICS_TABLE)
    }

    /// Row count of an arbitrary table.
    pub fn count(&self, table: &str) -> Result<usize> {
        count_rows(&self.conn, table)
    }
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(n as usize)
}

fn null_counts(conn: &Connection) -> Result<NullCounts> {
    let counts = conn.query_row(
        "SELECT COUNT(*) - COUNT(pm25), COUNT(*) - COUNT(pm10), COUNT(*) - COUNT(no2), COUNT(*) - COUNT(o3)
         FROM raw_data_air_quality",
        [],
        |row| {
            Ok(NullCounts {
                pm25: row.get::<_, i64>(0)? as usize,
                pm10: row.get::<_, i64>(1)? as usize,
                no2: row.get::<_, i64>(2)? as usize,
                o3: row.get::<_, i64>(3)? as usize,
            })
        },
    )?;
    Ok(counts)
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn insert_enriched(tx: &Transaction<'_>, rows: &[EnrichedReading]) -> Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO analytics_air_quality
         (station_id, station_type, timestamp, pm25, pm10, no2, o3, so2, co, temperature, humidity,
          aqi, health_category, health_color, hour, day_of_week, date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
    )?;
    for r in rows {
        stmt.execute(params![
            r.station_id,
            r.station_type.as_str(),
            r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            r.pm25,
            r.pm10,
            r.no2,
            r.o3,
            r.so2,
            r.co,
            r.temperature,
            r.humidity,
            r.aqi,
            r.health_category.label(),
            r.health_color,
            r.hour,
            r.day_of_week,
            format_date(r.date),
        ])?;
    }
    Ok(())
}

fn insert_aggregates(tx: &Transaction<'_>, aggregates: &Aggregates) -> Result<()> {
    let mut hourly = tx.prepare(
        "INSERT INTO hourly_patterns (hour, avg_pm25, avg_pm10, avg_no2, avg_o3, avg_aqi, measurements)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for h in &aggregates.hourly {
        hourly.execute(params![
            h.hour,
            h.avg_pm25,
            h.avg_pm10,
            h.avg_no2,
            h.avg_o3,
            h.avg_aqi,
            h.measurements as i64,
        ])?;
    }

    let mut daily = tx.prepare(
        "INSERT INTO daily_stats
         (date, station_id, station_type, avg_pm25, max_pm25, min_pm25, avg_pm10, avg_no2, avg_o3,
          avg_aqi, max_aqi, measurements, good_hours, unhealthy_hours)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?;
    for d in &aggregates.daily {
        daily.execute(params![
            format_date(d.date),
            d.station_id,
            d.station_type.as_str(),
            d.avg_pm25,
            d.max_pm25,
            d.min_pm25,
            d.avg_pm10,
            d.avg_no2,
            d.avg_o3,
            d.avg_aqi,
            d.max_aqi,
            d.measurements as i64,
            d.good_hours as i64,
            d.unhealthy_hours as i64,
        ])?;
    }

    let mut stations = tx.prepare(
        "INSERT INTO station_summary
         (station_id, station_type, avg_pm25, avg_aqi, max_aqi, total_measurements, pct_good, pct_unhealthy)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    for s in &aggregates.stations {
        stations.execute(params![
            s.station_id,
            s.station_type.as_str(),
            s.avg_pm25,
            s.avg_aqi,
            s.max_aqi,
            s.total_measurements as i64,
            s.pct_good,
            s.pct_unhealthy,
        ])?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn reading(station: &str, hour: u32, pm25: Option<f64>, no2: Option<f64>) -> Reading {
        Reading {
            station_id: station.to_string(),
            station_type: StationType::Industrial,
            timestamp: NaiveDate::from_ymd_opt(2025, 11, 3)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
            pm25,
            pm10: Some(70.0),
            no2,
            o3: Some(35.5),
            so2: Some(9.1),
            co: Some(1.2),
            temperature: 18.4,
            humidity: 71.0,
        }
    }

    #[test]
    fn test_replace_raw_round_trips_readings() {
        let mut store = Store::open_in_memory().unwrap();
        let readings = vec![
            reading("ST002", 0, Some(55.2), None),
            reading("ST002", 1, None, Some(28.0)),
        ];

        let audit = store.replace_raw(&readings).unwrap();

        assert_eq!(audit.row_count, 2);
        assert_eq!(audit.nulls.pm25, 1);
        assert_eq!(audit.nulls.no2, 1);
        assert_eq!(audit.nulls.o3, 0);
        assert_eq!(store.read_raw().unwrap(), readings);
        assert_eq!(store.load_audit().unwrap(), Some(audit));
    }

    #[test]
    fn test_replace_raw_drops_previous_contents() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .replace_raw(&vec![reading("ST001", 0, Some(1.0), Some(1.0)); 3])
            .unwrap();
        store.replace_raw(&[reading("ST001", 0, None, None)]).unwrap();

        assert_eq!(store.raw_count().unwrap(), 1);
        assert_eq!(store.raw_null_counts().unwrap().total(), 2);
    }

    #[test]
    fn test_missing_tables_are_reported() {
        let store = Store::open_in_memory().unwrap();

        assert!(!store.table_exists(RAW_TABLE).unwrap());
        assert_eq!(store.load_audit().unwrap(), None);
    }

    #[test]
    fn test_null_counts_from_readings_match_store() {
        let mut store = Store::open_in_memory().unwrap();
        let readings = vec![
            reading("ST001", 0, None, None),
            reading("ST001", 1, None, Some(3.0)),
            reading("ST001", 2, Some(4.0), Some(3.0)),
        ];
        store.replace_raw(&readings).unwrap();

        assert_eq!(NullCounts::from_readings(&readings), store.raw_null_counts().unwrap());
    }

    #[test]
    fn test_invalid_station_type_is_reported() {
        let store = Store::open_in_memory().unwrap();
        store.conn.execute_batch(CREATE_RAW).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO raw_data_air_quality VALUES ('ST009', 'suburban', '2025-11-01 00:00:00',
                 1, 1, 1, 1, 1, 1, 20, 50)",
                [],
            )
            .unwrap();

        let err = store.read_raw().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRecord { row: 0, .. }));
    }
}
