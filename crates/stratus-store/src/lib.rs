//! SQLite persistence for Stratus locations and forecasts.
//!
//! This crate stores the location registry and the normalized forecast time
//! series. Forecast writes are idempotent upserts on the natural key
//! `(location_id, forecast_time, granularity)`; deletes are soft.
//!
//! # Example
//!
//! ```
//! use stratus_store::{ForecastQuery, Store};
//! use stratus_types::{Condition, ForecastRecord, Granularity, NewLocation};
//! use time::macros::datetime;
//!
//! let store = Store::open_in_memory()?;
//! let jakarta = store.insert_location(&NewLocation {
//!     name: "Jakarta".into(),
//!     region: "Jakarta Raya".into(),
//!     country: "Indonesia".into(),
//!     latitude: -6.21,
//!     longitude: 106.85,
//! })?;
//!
//! let record = ForecastRecord {
//!     location_id: jakarta.id,
//!     temperature_c: 28.4,
//!     temperature_f: 83.1,
//!     humidity: 74,
//!     wind_speed_kph: 11.2,
//!     condition: Condition::default(),
//!     forecast_time: datetime!(2026-10-18 00:00 UTC),
//!     granularity: Granularity::Day,
//! };
//!
//! // Writing the same record twice leaves a single row.
//! store.bulk_upsert_forecasts(&[record.clone()])?;
//! store.bulk_upsert_forecasts(&[record])?;
//! assert_eq!(store.count_forecasts(Some(jakarta.id))?, 1);
//!
//! let rows = store.query_forecasts(&ForecastQuery::new().location(jakarta.id))?;
//! assert_eq!(rows[0].humidity, 74);
//! # Ok::<(), stratus_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::StoredForecast;
pub use queries::{ForecastQuery, LocationQuery};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/stratus/stratus.db`
/// - macOS: `~/Library/Application Support/stratus/stratus.db`
/// - Windows: `C:\Users\<user>\AppData\Local\stratus\stratus.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("stratus")
        .join("stratus.db")
}
