//! Append-only SQLite history of readings.
//!
//! One connection behind a mutex; every call holds the lock for its own
//! transaction, so an append from the scheduler and an export read from the
//! command listener never interleave inside the database.

use crate::error::PersistError;
use crate::reading::{CompassPoint, Precipitation, Reading, StoredReading};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS weather (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    temperature REAL NOT NULL,
    wind_direction TEXT NOT NULL,
    wind_speed REAL NOT NULL,
    pressure REAL NOT NULL,
    precipitation TEXT NOT NULL
);
"#;

#[derive(Debug)]
pub struct ReadingStore {
    conn: Mutex<Connection>,
    location: String,
}

impl ReadingStore {
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PersistError::CreateDir {
                path: PathBuf::from(parent),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, PersistError> {
        Self::init(Connection::open_in_memory()?, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self, PersistError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistError> {
        self.conn.lock().map_err(|_| PersistError::LockPoisoned)
    }

    /// Durably appends one reading and returns its row id.
    pub fn append(&self, reading: &Reading) -> Result<i64, PersistError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"
            INSERT INTO weather (timestamp, temperature, wind_direction, wind_speed, pressure, precipitation)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                reading.timestamp,
                reading.temperature,
                reading.wind_direction.label(),
                reading.wind_speed,
                reading.pressure,
                reading.precipitation.as_str(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// The `limit` most recently appended readings, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredReading>, PersistError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rows = {
            let mut stmt = tx.prepare(
                r#"
                SELECT id, timestamp, temperature, wind_direction, wind_speed, pressure, precipitation
                FROM weather
                ORDER BY id DESC
                LIMIT ?1
                "#,
            )?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let mapped = stmt.query_map(params![limit], stored_reading_from_row)?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };
        tx.commit()?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<u64, PersistError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM weather", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

fn stored_reading_from_row(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    let timestamp: DateTime<Utc> = row.get(1)?;
    let direction: String = row.get(3)?;
    let wind_direction = CompassPoint::from_label(&direction).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown wind direction {direction:?}").into(),
        )
    })?;
    Ok(StoredReading {
        id: row.get(0)?,
        reading: Reading {
            timestamp,
            temperature: row.get(2)?,
            wind_direction,
            wind_speed: row.get(4)?,
            pressure: row.get(5)?,
            precipitation: Precipitation::from_stored(row.get(6)?),
        },
    })
}
