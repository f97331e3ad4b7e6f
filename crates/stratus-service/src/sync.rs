//! Forecast sync orchestration.
//!
//! One run resolves the target locations, then for each location in turn
//! fetches, normalizes and upserts its forecast. A failing location is
//! logged and recorded; the run moves on to the next one.

use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use stratus_core::{ForecastSource, normalize};
use stratus_store::LocationQuery;
use stratus_types::Location;

use crate::repository::{ForecastRepository, LocationRegistry};

/// Locations synced per run when the request does not say.
pub const DEFAULT_SYNC_LIMIT: u32 = 10;

/// Parameters of one sync run. Zero values select the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Only this location.
    pub location_id: Option<i64>,
    /// Maximum number of locations (0 means [`DEFAULT_SYNC_LIMIT`]).
    pub limit: u32,
    /// Days of forecast to request (0 means 14).
    pub forecast_days: u32,
}

/// Outcome counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Locations selected for the run.
    pub locations: usize,
    /// Locations whose records were committed.
    pub synced: usize,
    /// Records written across all synced locations.
    pub records: usize,
}

/// A location that could not be synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFailure {
    pub location_id: i64,
    pub name: String,
    pub message: String,
}

impl std::fmt::Display for LocationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name, self.location_id, self.message)
    }
}

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to get locations: {0}")]
    Registry(#[from] stratus_store::Error),

    #[error(
        "{} of {} locations failed to sync: {}",
        .failures.len(),
        .report.locations,
        format_failures(.failures)
    )]
    Partial {
        failures: Vec<LocationFailure>,
        report: SyncReport,
    },

    #[error("{}", cancelled_message(.report, .failures))]
    Cancelled {
        /// Failures collected before the run was cancelled.
        failures: Vec<LocationFailure>,
        report: SyncReport,
    },
}

fn cancelled_message(report: &SyncReport, failures: &[LocationFailure]) -> String {
    let mut message = format!(
        "sync cancelled after {} of {} locations",
        report.synced, report.locations
    );
    if !failures.is_empty() {
        message.push_str(&format!(
            "; {} failed before cancellation: {}",
            failures.len(),
            format_failures(failures)
        ));
    }
    message
}

fn format_failures(failures: &[LocationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Drives fetch, normalize and upsert for a set of locations.
#[derive(Clone)]
pub struct SyncService {
    registry: Arc<dyn LocationRegistry>,
    repository: Arc<dyn ForecastRepository>,
    source: Arc<dyn ForecastSource>,
}

impl SyncService {
    pub fn new(
        registry: Arc<dyn LocationRegistry>,
        repository: Arc<dyn ForecastRepository>,
        source: Arc<dyn ForecastSource>,
    ) -> Self {
        Self {
            registry,
            repository,
            source,
        }
    }

    /// Run one sync.
    ///
    /// Locations are processed sequentially. Records already committed for
    /// earlier locations stay committed when a later one fails or the run is
    /// cancelled.
    pub async fn sync_weather(
        &self,
        request: &SyncRequest,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        let limit = if request.limit == 0 {
            DEFAULT_SYNC_LIMIT
        } else {
            request.limit
        };

        let mut query = LocationQuery::new().limit(limit);
        if let Some(id) = request.location_id.filter(|id| *id > 0) {
            query = query.id(id);
        }

        let locations = self.registry.get_locations(&query).await?;
        if locations.is_empty() {
            warn!("No locations to sync (request: {:?})", request);
        }

        let mut report = SyncReport {
            locations: locations.len(),
            ..Default::default()
        };
        let mut failures = Vec::new();

        for location in &locations {
            if cancel.is_cancelled() {
                info!("Sync cancelled before {}", location.name);
                return Err(SyncError::Cancelled { failures, report });
            }

            match self
                .sync_location(location, request.forecast_days, cancel)
                .await
            {
                Ok(written) => {
                    report.synced += 1;
                    report.records += written;
                    info!(
                        "sync weather data success: {} ({} records)",
                        location.name, written
                    );
                }
                Err(LocationError::Cancelled) => {
                    info!("Sync cancelled while fetching {}", location.name);
                    return Err(SyncError::Cancelled { failures, report });
                }
                Err(LocationError::Failed(message)) => {
                    warn!("Failed to sync {}: {}", location.name, message);
                    failures.push(LocationFailure {
                        location_id: location.id,
                        name: location.name.clone(),
                        message,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SyncError::Partial { failures, report })
        }
    }

    async fn sync_location(
        &self,
        location: &Location,
        forecast_days: u32,
        cancel: &CancellationToken,
    ) -> Result<usize, LocationError> {
        let payload = self
            .source
            .fetch_forecast(&location.name, forecast_days, cancel)
            .await
            .map_err(|e| {
                if e.is_cancelled() {
                    LocationError::Cancelled
                } else {
                    LocationError::Failed(e.to_string())
                }
            })?;

        let records = normalize(location.id, &payload);

        self.repository
            .bulk_upsert(&records)
            .await
            .map_err(|e| LocationError::Failed(format!("failed to bulk upsert weather data: {}", e)))
    }
}

enum LocationError {
    Cancelled,
    Failed(String),
}
