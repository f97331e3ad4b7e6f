//! Storage seams used by the sync orchestrator and the query path.
//!
//! The SQLite [`Store`] implements both traits behind a `tokio::sync::Mutex`;
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use tokio::sync::Mutex;

use stratus_store::{ForecastQuery, LocationQuery, Store, StoredForecast};
use stratus_types::{ForecastRecord, Location, NewLocation};

/// The set of tracked locations.
#[async_trait]
pub trait LocationRegistry: Send + Sync {
    /// A live (not soft-deleted) location by id.
    async fn get_location(&self, id: i64) -> stratus_store::Result<Option<Location>>;

    async fn get_locations(&self, query: &LocationQuery) -> stratus_store::Result<Vec<Location>>;

    async fn count_locations(&self) -> stratus_store::Result<u64>;

    async fn insert_location(&self, location: &NewLocation) -> stratus_store::Result<Location>;
}

/// Upsert/query access to forecast records.
#[async_trait]
pub trait ForecastRepository: Send + Sync {
    /// Persist `records` atomically, overwriting on natural-key conflict.
    async fn bulk_upsert(&self, records: &[ForecastRecord]) -> stratus_store::Result<usize>;

    async fn query_forecasts(
        &self,
        query: &ForecastQuery,
    ) -> stratus_store::Result<Vec<StoredForecast>>;
}

#[async_trait]
impl LocationRegistry for Mutex<Store> {
    async fn get_location(&self, id: i64) -> stratus_store::Result<Option<Location>> {
        self.lock().await.get_location(id)
    }

    async fn get_locations(&self, query: &LocationQuery) -> stratus_store::Result<Vec<Location>> {
        self.lock().await.get_locations(query)
    }

    async fn count_locations(&self) -> stratus_store::Result<u64> {
        self.lock().await.count_locations()
    }

    async fn insert_location(&self, location: &NewLocation) -> stratus_store::Result<Location> {
        self.lock().await.insert_location(location)
    }
}

#[async_trait]
impl ForecastRepository for Mutex<Store> {
    async fn bulk_upsert(&self, records: &[ForecastRecord]) -> stratus_store::Result<usize> {
        self.lock().await.bulk_upsert_forecasts(records)
    }

    async fn query_forecasts(
        &self,
        query: &ForecastQuery,
    ) -> stratus_store::Result<Vec<StoredForecast>> {
        self.lock().await.query_forecasts(query)
    }
}
