//! Application state shared across handlers and the worker.
//!
//! # Locks
//!
//! - **`store`** (Mutex): one SQLite connection. Held only for the duration
//!   of a single statement or transaction, never across provider calls.
//! - **`config`** (RwLock): read by handlers, written only at startup.
//!
//! When both are needed, take `config` first.

use std::sync::Arc;

use stratus_core::ForecastSource;
use stratus_store::Store;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::cache::TtlCache;
use crate::config::Config;
use crate::query::WeatherQueryService;
use crate::repository::LocationRegistry;
use crate::sync::SyncService;
use crate::worker::{Worker, WorkerStats};

/// Shared application state.
pub struct AppState {
    /// The data store, also serving as forecast repository.
    pub store: Arc<Mutex<Store>>,
    /// Location access for the API handlers.
    pub registry: Arc<dyn LocationRegistry>,
    pub config: RwLock<Config>,
    pub cache: Arc<dyn TtlCache>,
    pub sync: SyncService,
    pub query: WeatherQueryService,
    /// Stats of the background worker, if one is running.
    pub worker_stats: Arc<WorkerStats>,
    /// Cancelled on shutdown; threaded into every sync.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the services around `store`, `source` and `cache`.
    pub fn new(
        store: Store,
        config: Config,
        source: Arc<dyn ForecastSource>,
        cache: Arc<dyn TtlCache>,
    ) -> Arc<Self> {
        let store = Arc::new(Mutex::new(store));
        let sync = SyncService::new(store.clone(), store.clone(), source);
        let query = WeatherQueryService::new(store.clone(), store.clone(), Arc::clone(&cache))
            .with_ttl(config.cache.ttl());

        Arc::new(Self {
            registry: store.clone(),
            store,
            config: RwLock::new(config),
            cache,
            sync,
            query,
            worker_stats: Arc::new(WorkerStats::default()),
            shutdown: CancellationToken::new(),
        })
    }

    /// A worker driven by the `[worker]` config section, reporting into
    /// [`worker_stats`](Self::worker_stats).
    pub async fn worker(&self) -> Worker {
        let config = self.config.read().await;
        Worker::from_config(self.sync.clone(), &config.worker).with_stats(self.worker_stats.clone())
    }
}
