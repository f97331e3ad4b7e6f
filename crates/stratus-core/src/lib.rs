//! Forecast provider client, retry and normalization for Stratus.
//!
//! This crate covers the write side of the forecast pipeline up to the
//! database: fetch a multi-day forecast from WeatherAPI with exponential
//! backoff, then flatten it into [`ForecastRecord`]s keyed by
//! `(location_id, forecast_time, granularity)`.
//!
//! # Modules
//!
//! - [`retry`]: [`BackoffPolicy`] and [`retry_with_backoff`]
//! - [`provider`]: the [`ForecastSource`] trait and [`WeatherApiClient`]
//! - [`payload`]: serde types for the provider response
//! - [`normalize`]: day/hour flattening
//! - [`mock`]: [`MockSource`] for tests
//!
//! # Example
//!
//! ```
//! use stratus_core::{ForecastSource, MockSource, mock::sample_payload, normalize};
//! use time::macros::date;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stratus_core::Error> {
//!     let source = MockSource::new();
//!     source.set_payload("Jakarta", sample_payload("Jakarta", date!(2026-10-18), 3)).await;
//!
//!     let payload = source.fetch_forecast("Jakarta", 3, &CancellationToken::new()).await?;
//!     let records = normalize(42, &payload);
//!     assert_eq!(records.len(), 3 * 25);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mock;
pub mod normalize;
pub mod payload;
pub mod provider;
pub mod retry;

pub use error::{Error, Result};
pub use mock::MockSource;
pub use normalize::{MalformedEntry, normalize};
pub use payload::ForecastPayload;
pub use provider::{DEFAULT_BASE_URL, DEFAULT_FORECAST_DAYS, ForecastSource, WeatherApiClient};
pub use retry::{BackoffPolicy, retry_with_backoff};

pub use stratus_types::{Condition, ForecastRecord, Granularity};
