//! Durable observation table backed by SQLite.
//!
//! Rows are keyed by the observation instant (UTC epoch seconds), which is
//! also the sort key for every range query. The table is created lazily by
//! the first merge so that [`ObservationStore::table_exists`] reflects whether
//! any run has loaded data yet.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

use crate::{
    merge::{MergeMode, MergeOutcome},
    model::EnrichedObservation,
};

pub const TABLE: &str = "weather_data";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS weather_data (
    timestamp                 INTEGER PRIMARY KEY,
    temperature_c             REAL NOT NULL,
    apparent_temperature_c    REAL NOT NULL,
    relative_humidity         REAL NOT NULL CHECK (relative_humidity BETWEEN 0 AND 1),
    precipitation_probability REAL NOT NULL CHECK (precipitation_probability BETWEEN 0 AND 1),
    is_day                    INTEGER NOT NULL CHECK (is_day IN (0, 1)),
    pressure_at_location      REAL NOT NULL CHECK (pressure_at_location > 0)
);";

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Capability the pipeline needs from durable storage.
pub trait ObservationStore {
    fn table_exists(&self) -> Result<bool>;

    /// Apply `records` atomically under `mode`. On error nothing is applied.
    fn upsert(&mut self, records: &[EnrichedObservation], mode: MergeMode)
    -> Result<MergeOutcome>;

    /// Rows with `start <= timestamp < end`, ascending by timestamp.
    fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EnrichedObservation>>;
}

/// SQLite-backed observation store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn row_count(&self) -> Result<usize> {
        if !self.table_exists()? {
            return Ok(0);
        }
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM weather_data", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

impl ObservationStore for SqliteStore {
    fn table_exists(&self) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![TABLE],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn upsert(
        &mut self,
        records: &[EnrichedObservation],
        mode: MergeMode,
    ) -> Result<MergeOutcome> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(SCHEMA)?;

        if mode == MergeMode::Recreate {
            tx.execute("DELETE FROM weather_data", [])?;
        }

        let mut outcome = MergeOutcome::default();
        {
            // Only key conflicts are skipped; CHECK and NOT NULL failures abort.
            let mut stmt = tx.prepare(
                "INSERT INTO weather_data (timestamp, temperature_c, apparent_temperature_c, \
                 relative_humidity, precipitation_probability, is_day, pressure_at_location) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(timestamp) DO NOTHING",
            )?;

            for r in records {
                let changed = stmt.execute(params![
                    r.timestamp.timestamp(),
                    r.temperature_c,
                    r.apparent_temperature_c,
                    r.relative_humidity,
                    r.precipitation_probability,
                    r.is_day,
                    r.pressure_at_location,
                ])?;
                if changed == 1 {
                    outcome.inserted += 1;
                } else {
                    outcome.skipped += 1;
                }
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn query_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EnrichedObservation>> {
        if !self.table_exists()? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT timestamp, temperature_c, apparent_temperature_c, relative_humidity, \
             precipitation_probability, is_day, pressure_at_location \
             FROM weather_data WHERE timestamp >= ?1 AND timestamp < ?2 \
             ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![start.timestamp(), end.timestamp()], |row| {
            Ok(StoredRow {
                timestamp: row.get(0)?,
                temperature_c: row.get(1)?,
                apparent_temperature_c: row.get(2)?,
                relative_humidity: row.get(3)?,
                precipitation_probability: row.get(4)?,
                is_day: row.get(5)?,
                pressure_at_location: row.get(6)?,
            })
        })?;

        rows.map(|row| row?.into_observation()).collect()
    }
}

struct StoredRow {
    timestamp: i64,
    temperature_c: f64,
    apparent_temperature_c: f64,
    relative_humidity: f64,
    precipitation_probability: f64,
    is_day: i64,
    pressure_at_location: f64,
}

impl StoredRow {
    fn into_observation(self) -> Result<EnrichedObservation> {
        let timestamp = DateTime::<Utc>::from_timestamp(self.timestamp, 0).ok_or_else(|| {
            StoreError::Corrupt(format!("timestamp {} is out of range", self.timestamp))
        })?;
        let is_day = match self.is_day {
            0 => false,
            1 => true,
            other => {
                return Err(StoreError::Corrupt(format!(
                    "is_day = {other} at timestamp {}",
                    self.timestamp
                )));
            }
        };

        Ok(EnrichedObservation {
            timestamp,
            temperature_c: self.temperature_c,
            apparent_temperature_c: self.apparent_temperature_c,
            relative_humidity: self.relative_humidity,
            precipitation_probability: self.precipitation_probability,
            is_day,
            pressure_at_location: self.pressure_at_location,
        })
    }
}
