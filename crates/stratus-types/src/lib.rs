//! Shared domain types for the Stratus forecast sync service.
//!
//! This crate holds the values that flow between the provider client
//! (stratus-core), the SQLite store (stratus-store) and the HTTP service
//! (stratus-service).
//!
//! # Example
//!
//! ```
//! use stratus_types::{Condition, ForecastRecord, Granularity};
//! use time::macros::datetime;
//!
//! let record = ForecastRecord {
//!     location_id: 1,
//!     temperature_c: 28.4,
//!     temperature_f: 83.1,
//!     humidity: 74,
//!     wind_speed_kph: 11.2,
//!     condition: Condition { text: "Patchy rain nearby".into(), icon: String::new() },
//!     forecast_time: datetime!(2026-10-18 00:00 UTC),
//!     granularity: Granularity::Day,
//! };
//! assert_eq!(record.natural_key().2, Granularity::Day);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{Condition, ForecastRecord, Granularity, Location, LocationSort, NewLocation};
