//! Cache-aside forecast reads.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use stratus_store::{ForecastQuery, StoredForecast};
use stratus_types::{Granularity, Location};

use crate::cache::TtlCache;
use crate::repository::{ForecastRepository, LocationRegistry};

/// Page size used when the caller passes 0.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// How long a computed result stays cached by default.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);

/// Cache key for a location's weather result.
///
/// The key does not include paging: whichever page is computed first is
/// served for every page until the entry expires.
pub fn cache_key(location_id: i64) -> String {
    format!("weather:location:{}", location_id)
}

/// Query errors.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("location {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Store(#[from] stratus_store::Error),
}

/// Condition as exposed to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherCondition {
    pub status: String,
    #[serde(rename = "iconURL")]
    pub icon_url: String,
}

/// One forecast entry as exposed to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherItem {
    #[serde(with = "time::serde::rfc3339")]
    pub forecast_time: OffsetDateTime,
    pub forecast_type: Granularity,
    pub temperature_celsius: f64,
    pub temperature_fahrenheit: f64,
    pub humidity: i32,
    pub wind_speed: f64,
    pub condition: WeatherCondition,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified_at: Option<OffsetDateTime>,
}

impl From<&StoredForecast> for WeatherItem {
    fn from(row: &StoredForecast) -> Self {
        Self {
            forecast_time: row.forecast_time,
            forecast_type: row.granularity,
            temperature_celsius: row.temperature_c,
            temperature_fahrenheit: row.temperature_f,
            humidity: row.humidity,
            wind_speed: row.wind_speed_kph,
            condition: WeatherCondition {
                status: row.condition.text.clone(),
                icon_url: row.condition.icon.clone(),
            },
            created_at: row.created_at,
            last_modified_at: row.last_modified_at,
        }
    }
}

/// Result of [`WeatherQueryService::get_weathers`]. This is also the cached
/// representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherQueryResult {
    pub location: Location,
    /// Entry closest to now on the same UTC day, if any.
    pub current_time: Option<WeatherItem>,
    pub forecast: Vec<WeatherItem>,
}

/// The row on the same UTC calendar day as `now` with the smallest distance
/// to `now`. Ties keep the earlier row.
pub fn select_current(rows: &[StoredForecast], now: OffsetDateTime) -> Option<&StoredForecast> {
    let today = now.date();
    rows.iter()
        .filter(|row| row.forecast_time.to_offset(time::UtcOffset::UTC).date() == today)
        .min_by_key(|row| (now - row.forecast_time).unsigned_abs())
}

/// Reads forecasts through the TTL cache.
#[derive(Clone)]
pub struct WeatherQueryService {
    registry: Arc<dyn LocationRegistry>,
    repository: Arc<dyn ForecastRepository>,
    cache: Arc<dyn TtlCache>,
    ttl: Duration,
}

impl WeatherQueryService {
    pub fn new(
        registry: Arc<dyn LocationRegistry>,
        repository: Arc<dyn ForecastRepository>,
        cache: Arc<dyn TtlCache>,
    ) -> Self {
        Self {
            registry,
            repository,
            cache,
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Override the cache TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Forecast page for a location, relative to the current time.
    pub async fn get_weathers(
        &self,
        location_id: i64,
        page_size: u32,
        current_page: u32,
    ) -> Result<WeatherQueryResult, QueryError> {
        self.get_weathers_at(location_id, page_size, current_page, OffsetDateTime::now_utc())
            .await
    }

    /// [`get_weathers`](Self::get_weathers) with an explicit `now`.
    pub async fn get_weathers_at(
        &self,
        location_id: i64,
        page_size: u32,
        current_page: u32,
        now: OffsetDateTime,
    ) -> Result<WeatherQueryResult, QueryError> {
        let location = self
            .registry
            .get_location(location_id)
            .await?
            .ok_or(QueryError::NotFound(location_id))?;

        let key = cache_key(location_id);
        match self.cache.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<WeatherQueryResult>(&cached) {
                Ok(result) => {
                    debug!("Cache hit for {}", key);
                    return Ok(result);
                }
                Err(e) => warn!("Ignoring undecodable cache entry {}: {}", key, e),
            },
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => warn!("Cache read failed for {}: {}", key, e),
        }

        let page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        let current_page = current_page.max(1);

        let query = ForecastQuery::new()
            .location(location_id)
            .limit(page_size)
            .offset((current_page - 1).saturating_mul(page_size));
        let rows = self.repository.query_forecasts(&query).await?;

        if rows.is_empty() {
            return Ok(WeatherQueryResult {
                location,
                current_time: None,
                forecast: Vec::new(),
            });
        }

        // The newest row is left out of both the current pick and the list.
        let rest = &rows[1..];
        let result = WeatherQueryResult {
            location,
            current_time: select_current(rest, now).map(WeatherItem::from),
            forecast: rest.iter().map(WeatherItem::from).collect(),
        };

        match serde_json::to_string(&result) {
            Ok(encoded) => {
                if let Err(e) = self.cache.set(&key, encoded, self.ttl).await {
                    warn!("Cache write failed for {}: {}", key, e);
                }
            }
            Err(e) => warn!("Failed to encode weather result for {}: {}", key, e),
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheError, MemoryCache};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use stratus_store::Store;
    use stratus_types::{Condition, ForecastRecord, NewLocation};
    use time::Duration as TimeDuration;
    use time::macros::datetime;
    use tokio::sync::Mutex;

    const NOW: OffsetDateTime = datetime!(2026-10-18 12:00 UTC);

    fn stored(id: i64, forecast_time: OffsetDateTime) -> StoredForecast {
        StoredForecast {
            id,
            location_id: 1,
            temperature_c: 30.0,
            temperature_f: 86.0,
            humidity: 70,
            wind_speed_kph: 5.0,
            condition: Condition {
                text: "Sunny".into(),
                icon: "//cdn/113.png".into(),
            },
            forecast_time,
            granularity: Granularity::Hour,
            created_at: NOW,
            last_modified_at: None,
        }
    }

    fn record(forecast_time: OffsetDateTime) -> ForecastRecord {
        stored(0, forecast_time).to_record()
    }

    #[test]
    fn test_select_current_picks_nearest_same_day() {
        let rows = vec![
            stored(1, NOW - TimeDuration::hours(3)),
            stored(2, NOW - TimeDuration::minutes(30)),
            stored(3, NOW + TimeDuration::hours(2)),
        ];
        assert_eq!(select_current(&rows, NOW).map(|r| r.id), Some(2));
    }

    #[test]
    fn test_select_current_ignores_other_days() {
        let rows = vec![
            stored(1, NOW - TimeDuration::hours(13)),
            stored(2, NOW + TimeDuration::hours(12)),
        ];
        assert_eq!(select_current(&rows, NOW), None);
        assert_eq!(select_current(&[], NOW), None);
    }

    /// Counts forecast queries and delegates to the store.
    struct CountingRepository {
        inner: Arc<Mutex<Store>>,
        queries: AtomicU32,
    }

    #[async_trait]
    impl ForecastRepository for CountingRepository {
        async fn bulk_upsert(&self, records: &[ForecastRecord]) -> stratus_store::Result<usize> {
            self.inner.bulk_upsert(records).await
        }

        async fn query_forecasts(
            &self,
            query: &ForecastQuery,
        ) -> stratus_store::Result<Vec<StoredForecast>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.inner.query_forecasts(query).await
        }
    }

    /// Counts writes and delegates to a memory cache.
    #[derive(Default)]
    struct CountingCache {
        inner: MemoryCache,
        sets: AtomicU32,
    }

    #[async_trait]
    impl TtlCache for CountingCache {
        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            self.inner.set(key, value, ttl).await
        }
    }

    /// A cache that is always down.
    struct BrokenCache;

    #[async_trait]
    impl TtlCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
    }

    struct Fixture {
        store: Arc<Mutex<Store>>,
        repository: Arc<CountingRepository>,
        cache: Arc<CountingCache>,
        service: WeatherQueryService,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        store
            .lock()
            .await
            .insert_location(&NewLocation {
                name: "Jakarta".into(),
                region: "Jakarta Raya".into(),
                country: "Indonesia".into(),
                ..Default::default()
            })
            .unwrap();
        let repository = Arc::new(CountingRepository {
            inner: store.clone(),
            queries: AtomicU32::new(0),
        });
        let cache = Arc::new(CountingCache::default());
        let service = WeatherQueryService::new(store.clone(), repository.clone(), cache.clone());
        Fixture {
            store,
            repository,
            cache,
            service,
        }
    }

    #[tokio::test]
    async fn test_unknown_location_is_not_found_without_query() {
        let f = fixture().await;

        let err = f.service.get_weathers_at(42, 10, 1, NOW).await.unwrap_err();

        assert!(matches!(err, QueryError::NotFound(42)));
        assert_eq!(f.repository.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_cached() {
        let f = fixture().await;

        let result = f.service.get_weathers_at(1, 10, 1, NOW).await.unwrap();

        assert_eq!(result.location.name, "Jakarta");
        assert!(result.forecast.is_empty());
        assert!(result.current_time.is_none());
        assert_eq!(f.cache.sets.load(Ordering::SeqCst), 0);
        assert!(f.cache.inner.is_empty().await);
    }

    #[tokio::test]
    async fn test_miss_computes_and_caches() {
        let f = fixture().await;
        let times = [
            NOW + TimeDuration::hours(5),
            NOW + TimeDuration::hours(2),
            NOW - TimeDuration::minutes(30),
            NOW - TimeDuration::hours(3),
        ];
        let records: Vec<_> = times.iter().map(|t| record(*t)).collect();
        f.store.lock().await.bulk_upsert_forecasts(&records).unwrap();

        let result = f.service.get_weathers_at(1, 10, 1, NOW).await.unwrap();

        // Newest (now + 5h) is skipped.
        let listed: Vec<_> = result.forecast.iter().map(|w| w.forecast_time).collect();
        assert_eq!(listed, times[1..].to_vec());
        assert_eq!(
            result.current_time.as_ref().map(|w| w.forecast_time),
            Some(NOW - TimeDuration::minutes(30))
        );
        assert_eq!(f.cache.sets.load(Ordering::SeqCst), 1);

        let cached = f.cache.inner.get(&cache_key(1)).await.unwrap().unwrap();
        let decoded: WeatherQueryResult = serde_json::from_str(&cached).unwrap();
        assert_eq!(decoded, result);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_store() {
        let f = fixture().await;
        let location = f.store.lock().await.get_location(1).unwrap().unwrap();
        let seeded = WeatherQueryResult {
            location,
            current_time: None,
            forecast: vec![WeatherItem::from(&stored(7, NOW))],
        };
        f.cache
            .inner
            .set(
                &cache_key(1),
                serde_json::to_string(&seeded).unwrap(),
                DEFAULT_CACHE_TTL,
            )
            .await
            .unwrap();

        let result = f.service.get_weathers_at(1, 10, 3, NOW).await.unwrap();

        assert_eq!(result, seeded);
        assert_eq!(f.repository.queries.load(Ordering::SeqCst), 0);
        assert_eq!(f.cache.sets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecodable_cache_entry_is_a_miss() {
        let f = fixture().await;
        f.store
            .lock()
            .await
            .bulk_upsert_forecasts(&[record(NOW), record(NOW - TimeDuration::hours(1))])
            .unwrap();
        f.cache
            .inner
            .set(&cache_key(1), "not json".into(), DEFAULT_CACHE_TTL)
            .await
            .unwrap();

        let result = f.service.get_weathers_at(1, 10, 1, NOW).await.unwrap();

        assert_eq!(result.forecast.len(), 1);
        assert_eq!(f.repository.queries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_outage_falls_back_to_store() {
        let store = Arc::new(Mutex::new(Store::open_in_memory().unwrap()));
        store
            .lock()
            .await
            .insert_location(&NewLocation {
                name: "Bandung".into(),
                region: "West Java".into(),
                country: "Indonesia".into(),
                ..Default::default()
            })
            .unwrap();
        store
            .lock()
            .await
            .bulk_upsert_forecasts(&[record(NOW), record(NOW - TimeDuration::hours(1))])
            .unwrap();
        let service = WeatherQueryService::new(store.clone(), store.clone(), Arc::new(BrokenCache));

        let result = service.get_weathers_at(1, 0, 0, NOW).await.unwrap();

        assert_eq!(result.forecast.len(), 1);
        assert_eq!(
            result.current_time.map(|w| w.forecast_time),
            Some(NOW - TimeDuration::hours(1))
        );
    }

    #[tokio::test]
    async fn test_paging_offsets_query() {
        let f = fixture().await;
        let records: Vec<_> = (0..6).map(|h| record(NOW - TimeDuration::hours(h))).collect();
        f.store.lock().await.bulk_upsert_forecasts(&records).unwrap();

        let result = f.service.get_weathers_at(1, 3, 2, NOW).await.unwrap();

        // Page 2 holds now-3h, now-4h, now-5h; the first of them is skipped.
        let listed: Vec<_> = result.forecast.iter().map(|w| w.forecast_time).collect();
        assert_eq!(
            listed,
            vec![NOW - TimeDuration::hours(4), NOW - TimeDuration::hours(5)]
        );
    }

    #[test]
    fn test_weather_item_json_shape() {
        let item = WeatherItem::from(&stored(1, NOW));
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["forecastType"], "hour");
        assert_eq!(json["temperatureCelsius"], 30.0);
        assert_eq!(json["windSpeed"], 5.0);
        assert_eq!(json["condition"]["status"], "Sunny");
        assert_eq!(json["condition"]["iconURL"], "//cdn/113.png");
        assert_eq!(json["forecastTime"], "2026-10-18T12:00:00Z");
        assert!(json["lastModifiedAt"].is_null());
    }
}
