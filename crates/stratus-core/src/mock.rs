//! In-memory forecast source for testing.
//!
//! [`MockSource`] implements [`ForecastSource`] without any network access.
//! Payloads are registered per location name; names without a payload fail
//! the way the real client does after exhausting its retries.
//!
//! # Features
//!
//! - **Failure injection**: fail a location for the next N requests, or always
//! - **Request log**: every `(name, days)` pair is recorded in call order
//! - **Sample payloads**: [`sample_payload`] builds realistic day/hour data

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use time::Date;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::payload::{
    DayAggregate, ForecastBlock, ForecastDay, ForecastPayload, HourEntry, ProviderCondition,
    ProviderLocation,
};
use crate::provider::{ForecastSource, effective_days};

/// A scripted [`ForecastSource`].
///
/// ```
/// use stratus_core::{ForecastSource, MockSource, mock::sample_payload};
/// use time::macros::date;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockSource::new();
///     source.set_payload("Jakarta", sample_payload("Jakarta", date!(2026-10-18), 2)).await;
///
///     let payload = source
///         .fetch_forecast("Jakarta", 2, &CancellationToken::new())
///         .await
///         .unwrap();
///     assert_eq!(payload.day_count(), 2);
///     assert!(source.fetch_forecast("Nowhere", 2, &CancellationToken::new()).await.is_err());
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockSource {
    payloads: RwLock<HashMap<String, ForecastPayload>>,
    /// Remaining forced failures per name (`u32::MAX` = always).
    failures: RwLock<HashMap<String, u32>>,
    requests: RwLock<Vec<(String, u32)>>,
    request_count: AtomicU32,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the payload returned for `name`.
    pub async fn set_payload(&self, name: &str, payload: ForecastPayload) {
        self.payloads.write().await.insert(name.to_string(), payload);
    }

    /// Fail the next `count` requests for `name`.
    pub async fn fail_next(&self, name: &str, count: u32) {
        self.failures.write().await.insert(name.to_string(), count);
    }

    /// Fail every request for `name`.
    pub async fn fail_always(&self, name: &str) {
        self.fail_next(name, u32::MAX).await;
    }

    /// Requests received so far, as `(name, effective days)`.
    pub async fn requests(&self) -> Vec<(String, u32)> {
        self.requests.read().await.clone()
    }

    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::Relaxed)
    }

    async fn take_failure(&self, name: &str) -> bool {
        let mut failures = self.failures.write().await;
        match failures.get_mut(name) {
            Some(0) | None => false,
            Some(remaining) => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
        }
    }
}

fn fetch_error(name: &str, status: u16, body: &str) -> Error {
    Error::Fetch {
        location: name.to_string(),
        source: Box::new(Error::Status {
            status,
            body: body.to_string(),
        }),
    }
}

#[async_trait]
impl ForecastSource for MockSource {
    async fn fetch_forecast(
        &self,
        location_name: &str,
        days: u32,
        cancel: &CancellationToken,
    ) -> Result<ForecastPayload> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.requests
            .write()
            .await
            .push((location_name.to_string(), effective_days(days)));

        if self.take_failure(location_name).await {
            return Err(fetch_error(location_name, 503, "mock failure"));
        }

        self.payloads
            .read()
            .await
            .get(location_name)
            .cloned()
            .ok_or_else(|| fetch_error(location_name, 400, "No matching location found."))
    }
}

/// Build a payload with `days` consecutive days starting at `first_day`,
/// each carrying 24 hourly entries.
pub fn sample_payload(location_name: &str, first_day: Date, days: u32) -> ForecastPayload {
    let forecastday = (0..days)
        .map(|offset| {
            let date = first_day.saturating_add(time::Duration::days(i64::from(offset)));
            let label = format!(
                "{:04}-{:02}-{:02}",
                date.year(),
                u8::from(date.month()),
                date.day()
            );
            let base = 24.0 + f64::from(offset);

            let hour = (0..24u8)
                .map(|h| HourEntry {
                    time: format!("{} {:02}:00", label, h),
                    temp_c: base + f64::from(h % 12) * 0.5,
                    temp_f: (base + f64::from(h % 12) * 0.5) * 1.8 + 32.0,
                    humidity: 60.0 + f64::from(h),
                    wind_kph: 5.0 + f64::from(h % 6),
                    condition: ProviderCondition {
                        text: "Partly cloudy".into(),
                        icon: "//cdn.weatherapi.com/weather/64x64/day/116.png".into(),
                        code: 1003,
                    },
                })
                .collect();

            ForecastDay {
                date: label,
                day: DayAggregate {
                    avgtemp_c: base + 2.5,
                    avgtemp_f: (base + 2.5) * 1.8 + 32.0,
                    maxwind_kph: 10.0,
                    avghumidity: 72.0,
                    condition: ProviderCondition {
                        text: "Patchy rain nearby".into(),
                        icon: "//cdn.weatherapi.com/weather/64x64/day/176.png".into(),
                        code: 1063,
                    },
                    ..Default::default()
                },
                hour,
            }
        })
        .collect();

    ForecastPayload {
        location: ProviderLocation {
            name: location_name.to_string(),
            ..Default::default()
        },
        forecast: ForecastBlock { forecastday },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use time::macros::date;

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let source = MockSource::new();
        source
            .set_payload("Oslo", sample_payload("Oslo", date!(2026-10-18), 1))
            .await;
        source.fail_next("Oslo", 1).await;
        let cancel = CancellationToken::new();

        let first = source.fetch_forecast("Oslo", 0, &cancel).await;
        assert!(matches!(first, Err(Error::Fetch { .. })));
        assert!(source.fetch_forecast("Oslo", 0, &cancel).await.is_ok());

        assert_eq!(source.request_count(), 2);
        assert_eq!(source.requests().await[0], ("Oslo".to_string(), 14));
    }

    #[tokio::test]
    async fn test_cancelled_is_not_recorded() {
        let source = MockSource::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = source.fetch_forecast("Oslo", 1, &cancel).await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(source.request_count(), 0);
    }

    #[test]
    fn test_sample_payload_normalizes_fully() {
        let payload = sample_payload("Oslo", date!(2026-12-31), 2);
        assert_eq!(payload.forecast.forecastday[1].date, "2027-01-01");
        assert_eq!(normalize(1, &payload).len(), 2 * 25);
    }
}
