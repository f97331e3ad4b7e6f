//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use stratus_types::{Condition, ForecastRecord, Granularity, Location, NewLocation};

use crate::error::{Error, Result};
use crate::models::StoredForecast;
use crate::queries::{ForecastQuery, LocationQuery};
use crate::schema;

/// SQLite-based store for locations and forecasts.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Cheap round trip used by readiness checks.
    pub fn ping(&self) -> Result<()> {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<OffsetDateTime>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(secs) => OffsetDateTime::from_unix_timestamp(secs)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e))),
        None => Ok(None),
    }
}

fn granularity(row: &Row<'_>, idx: usize) -> rusqlite::Result<Granularity> {
    let label: String = row.get(idx)?;
    label
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get(0)?,
        name: row.get(1)?,
        region: row.get(2)?,
        country: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        created_at: timestamp(row, 6)?,
        last_modified_at: optional_timestamp(row, 7)?,
        deleted_at: optional_timestamp(row, 8)?,
    })
}

fn forecast_from_row(row: &Row<'_>) -> rusqlite::Result<StoredForecast> {
    Ok(StoredForecast {
        id: row.get(0)?,
        location_id: row.get(1)?,
        temperature_c: row.get(2)?,
        temperature_f: row.get(3)?,
        humidity: row.get(4)?,
        wind_speed_kph: row.get(5)?,
        condition: Condition {
            text: row.get(6)?,
            icon: row.get(7)?,
        },
        forecast_time: timestamp(row, 8)?,
        granularity: granularity(row, 9)?,
        created_at: timestamp(row, 10)?,
        last_modified_at: optional_timestamp(row, 11)?,
    })
}

// Location registry
impl Store {
    /// Register a new location.
    pub fn insert_location(&self, location: &NewLocation) -> Result<Location> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        self.conn.execute(
            "INSERT INTO locations (name, region, country, latitude, longitude, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                location.name,
                location.region,
                location.country,
                location.latitude,
                location.longitude,
                now
            ],
        )?;

        let id = self.conn.last_insert_rowid();
        info!("Registered location {} ({})", location.name, id);

        self.get_location(id)?.ok_or(Error::LocationNotFound(id))
    }

    /// Get a live location by id.
    pub fn get_location(&self, id: i64) -> Result<Option<Location>> {
        let location = self
            .conn
            .query_row(
                "SELECT id, name, region, country, latitude, longitude, created_at, last_modified_at, deleted_at
                 FROM locations WHERE id = ? AND deleted_at IS NULL",
                [id],
                location_from_row,
            )
            .optional()?;

        Ok(location)
    }

    /// List live locations matching the query.
    pub fn get_locations(&self, query: &LocationQuery) -> Result<Vec<Location>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let locations = stmt
            .query_map(params_ref.as_slice(), location_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(locations)
    }

    /// Count live locations.
    pub fn count_locations(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM locations WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;

        Ok(count as u64)
    }

    /// Mark a location as deleted. Its forecasts stay on disk but the
    /// location no longer resolves for sync or queries.
    pub fn soft_delete_location(&self, id: i64) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let changed = self.conn.execute(
            "UPDATE locations SET deleted_at = ?2, last_modified_at = ?2
             WHERE id = ?1 AND deleted_at IS NULL",
            rusqlite::params![id, now],
        )?;

        if changed == 0 {
            return Err(Error::LocationNotFound(id));
        }

        info!("Soft-deleted location {}", id);
        Ok(())
    }
}

// Forecast operations
impl Store {
    /// Insert or overwrite forecast records by their natural key
    /// `(location_id, forecast_time, granularity)`.
    ///
    /// The whole batch runs in one transaction: either every record is
    /// written or none is. Returns the number of records written.
    pub fn bulk_upsert_forecasts(&self, records: &[ForecastRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let tx = self.conn.unchecked_transaction()?;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO weathers (location_id, temperature_c, temperature_f, humidity,
                 wind_speed_kph, condition_text, condition_icon, forecast_time, granularity, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(location_id, forecast_time, granularity) DO UPDATE SET
                    temperature_c = excluded.temperature_c,
                    temperature_f = excluded.temperature_f,
                    humidity = excluded.humidity,
                    wind_speed_kph = excluded.wind_speed_kph,
                    condition_text = excluded.condition_text,
                    condition_icon = excluded.condition_icon,
                    last_modified_at = excluded.created_at",
            )?;

            for record in records {
                stmt.execute(rusqlite::params![
                    record.location_id,
                    record.temperature_c,
                    record.temperature_f,
                    record.humidity,
                    record.wind_speed_kph,
                    record.condition.text,
                    record.condition.icon,
                    record.forecast_time.unix_timestamp(),
                    record.granularity.as_str(),
                    now,
                ])?;
            }
        }

        tx.commit()?;
        debug!("Upserted {} forecast records", records.len());
        Ok(records.len())
    }

    /// Query live forecasts.
    pub fn query_forecasts(&self, query: &ForecastQuery) -> Result<Vec<StoredForecast>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let forecasts = stmt
            .query_map(params_ref.as_slice(), forecast_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(forecasts)
    }

    /// Count live forecasts, optionally for one location.
    pub fn count_forecasts(&self, location_id: Option<i64>) -> Result<u64> {
        let count: i64 = match location_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM weathers WHERE deleted_at IS NULL AND location_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM weathers WHERE deleted_at IS NULL",
                [],
                |row| row.get(0),
            )?,
        };

        Ok(count as u64)
    }
}
