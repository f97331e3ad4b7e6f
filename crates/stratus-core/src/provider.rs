//! Forecast provider abstraction and the WeatherAPI HTTP client.
//!
//! [`ForecastSource`] is the seam the sync orchestrator depends on. The
//! production implementation is [`WeatherApiClient`]; tests use
//! [`MockSource`](crate::mock::MockSource).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use stratus_core::{BackoffPolicy, ForecastSource, WeatherApiClient};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), stratus_core::Error> {
//! let client = WeatherApiClient::new(
//!     "https://api.weatherapi.com/v1",
//!     "my-key",
//!     Duration::from_secs(10),
//!     BackoffPolicy::default(),
//! )?;
//!
//! let payload = client
//!     .fetch_forecast("Jakarta", 3, &CancellationToken::new())
//!     .await?;
//! println!("{} days", payload.day_count());
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::payload::ForecastPayload;
use crate::retry::{BackoffPolicy, retry_with_backoff};

/// Days requested when the caller passes `0`. This is the provider maximum.
pub const DEFAULT_FORECAST_DAYS: u32 = 14;

/// Default WeatherAPI endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// Longest slice of an error body kept in [`Error::Status`].
const MAX_ERROR_BODY: usize = 500;

/// Source of multi-day forecasts.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Fetch up to `days` days of forecast for `location_name`.
    ///
    /// `days == 0` means [`DEFAULT_FORECAST_DAYS`]. Transient failures are
    /// retried; the final failure is an [`Error::Fetch`] naming the location.
    /// Cancellation is returned as a bare [`Error::Cancelled`].
    async fn fetch_forecast(
        &self,
        location_name: &str,
        days: u32,
        cancel: &CancellationToken,
    ) -> Result<ForecastPayload>;
}

/// Resolve the requested day count.
pub fn effective_days(days: u32) -> u32 {
    if days == 0 { DEFAULT_FORECAST_DAYS } else { days }
}

/// HTTP client for `GET {base_url}/forecast.json`.
#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    policy: BackoffPolicy,
}

impl WeatherApiClient {
    /// Create a client with its own connection pool and request timeout.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        policy: BackoffPolicy,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Self::with_client(base_url, api_key, client, policy)
    }

    /// Create a client around an existing reqwest [`Client`].
    pub fn with_client(
        base_url: &str,
        api_key: impl Into<String>,
        client: Client,
        policy: BackoffPolicy,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::InvalidConfig(format!(
                "base URL must start with http:// or https://, got: {}",
                base_url
            )));
        }

        let api_key = api_key.into();
        if api_key.is_empty() {
            warn!("Weather API key is empty; provider requests will be rejected");
        }

        Ok(Self {
            client,
            base_url,
            api_key,
            policy,
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_once(&self, location_name: &str, days: u32) -> Result<ForecastPayload> {
        let url = format!("{}/forecast.json", self.base_url);
        let days = days.to_string();

        debug!("GET {} q={} days={}", url, location_name, days);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", location_name),
                ("days", days.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ForecastSource for WeatherApiClient {
    async fn fetch_forecast(
        &self,
        location_name: &str,
        days: u32,
        cancel: &CancellationToken,
    ) -> Result<ForecastPayload> {
        let days = effective_days(days);
        let operation = format!("fetch_forecast({})", location_name);

        let result = retry_with_backoff(&self.policy, &operation, cancel, || {
            self.fetch_once(location_name, days)
        })
        .await;

        match result {
            Ok(payload) => {
                debug!(
                    "Fetched {} days / {} hours for {}",
                    payload.day_count(),
                    payload.hour_count(),
                    location_name
                );
                Ok(payload)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => Err(Error::Fetch {
                location: location_name.to_string(),
                source: Box::new(e),
            }),
        }
    }
}
