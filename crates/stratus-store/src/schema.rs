//! Database schema and migrations.

use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
        info!("Created schema version {}", SCHEMA_VERSION);
    } else if version < SCHEMA_VERSION {
        migrate(conn, version)?;
    } else if version > SCHEMA_VERSION {
        warn!(
            "Database schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        );
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Timestamps are unix seconds. `deleted_at` is the soft-delete marker on
/// both tables.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            region TEXT NOT NULL,
            country TEXT NOT NULL,
            latitude REAL NOT NULL DEFAULT 0,
            longitude REAL NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            last_modified_at INTEGER,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_locations_name ON locations(name);

        CREATE TABLE IF NOT EXISTS weathers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            location_id INTEGER NOT NULL REFERENCES locations(id),
            temperature_c REAL NOT NULL,
            temperature_f REAL NOT NULL,
            humidity INTEGER NOT NULL,
            wind_speed_kph REAL NOT NULL,
            condition_text TEXT NOT NULL,
            condition_icon TEXT NOT NULL,
            forecast_time INTEGER NOT NULL,
            granularity TEXT NOT NULL CHECK (granularity IN ('day', 'hour')),
            created_at INTEGER NOT NULL,
            last_modified_at INTEGER,
            deleted_at INTEGER,
            UNIQUE(location_id, forecast_time, granularity)
        );
        CREATE INDEX IF NOT EXISTS idx_weathers_location_time
            ON weathers(location_id, forecast_time);
        "#,
    )?;

    Ok(())
}

/// Run migrations from `old_version` to current.
fn migrate(conn: &Connection, old_version: i32) -> Result<()> {
    info!(
        "Migrating schema from version {} to {}",
        old_version, SCHEMA_VERSION
    );
    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}
