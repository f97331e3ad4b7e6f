//! Forecast sync worker and HTTP REST API for Stratus.
//!
//! This crate provides a service that:
//! - Periodically fetches forecasts for registered locations from WeatherAPI
//! - Normalizes and upserts them into the local database
//! - Serves forecasts through a TTL cache
//! - Exposes a REST API for locations, weather queries and manual syncs
//!
//! # REST API Endpoints
//!
//! - `GET /health` - Liveness
//! - `GET /ready` - Store and cache reachability
//! - `GET /api/v1/locations` - Paginated, searchable location list
//! - `POST /api/v1/locations` - Register a location
//! - `GET /api/v1/weathers?locationID=` - Forecast page with the current entry
//! - `POST /api/v1/weathers/sync` - Run a sync now
//! - `GET /api/v1/worker` - Background worker counters
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/stratus/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [provider]
//! api_key = "your-weatherapi-key"
//!
//! [worker]
//! period_secs = 3600
//! limit = 10
//! forecast_days = 14
//! ```
//!
//! Environment variables such as `PORT`, `WEATHER_API_KEY` and
//! `WORKER_PERIOD_SECONDS` override the file; see [`Config::apply_env`].

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub mod api;
pub mod cache;
pub mod config;
pub mod query;
pub mod repository;
pub mod state;
pub mod sync;
pub mod worker;

pub use cache::{CacheError, MemoryCache, TtlCache};
pub use config::{Config, ConfigError};
pub use query::{QueryError, WeatherItem, WeatherQueryResult, WeatherQueryService};
pub use repository::{ForecastRepository, LocationRegistry};
pub use state::AppState;
pub use sync::{SyncError, SyncReport, SyncRequest, SyncService};
pub use worker::{Worker, WorkerStats};

/// The full HTTP application: API routes plus tracing and CORS layers.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Cancel `shutdown` once `signal` fires.
///
/// If the signal listener itself fails, the error is logged and the token is
/// left alone so the service keeps running.
pub async fn cancel_on_signal<F>(signal: F, shutdown: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("Received Ctrl-C, shutting down");
            shutdown.cancel();
        }
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}
