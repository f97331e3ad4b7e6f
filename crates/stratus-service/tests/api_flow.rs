//! End-to-end tests: HTTP API -> sync -> WeatherAPI client -> SQLite -> cache.
//!
//! A local axum server stands in for WeatherAPI; the store is an on-disk
//! database in a temp directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use http_body_util::BodyExt;
use time::OffsetDateTime;
use tower::ServiceExt;

use stratus_core::{BackoffPolicy, WeatherApiClient};
use stratus_service::{AppState, Config, MemoryCache};
use stratus_store::{ForecastQuery, Store};

/// Fake provider: one day of hourly data for any known location.
#[derive(Default)]
struct FakeProvider {
    /// Temperature in tenths of a degree, applied to every entry.
    temp_tenths: AtomicU32,
    unknown: Mutex<Vec<String>>,
    seen: Mutex<Vec<HashMap<String, String>>>,
}

impl FakeProvider {
    fn temp_c(&self) -> f64 {
        f64::from(self.temp_tenths.load(Ordering::SeqCst)) / 10.0
    }
}

async fn forecast(
    State(fake): State<Arc<FakeProvider>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let name = params.get("q").cloned().unwrap_or_default();
    fake.seen.lock().unwrap().push(params);
    if fake.unknown.lock().unwrap().contains(&name) {
        return (
            StatusCode::BAD_REQUEST,
            r#"{"error":{"code":1006,"message":"No matching location found."}}"#,
        )
            .into_response();
    }

    let date = OffsetDateTime::now_utc().date();
    let label = format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    );
    let temp_c = fake.temp_c();
    let condition = serde_json::json!({"text": "Sunny", "icon": "//cdn.weatherapi.com/113.png", "code": 1000});
    let hours: Vec<_> = (0..24)
        .map(|h| {
            serde_json::json!({
                "time": format!("{} {:02}:00", label, h),
                "temp_c": temp_c,
                "temp_f": temp_c * 9.0 / 5.0 + 32.0,
                "humidity": 70,
                "wind_kph": 9.4,
                "condition": condition,
            })
        })
        .collect();
    let body = serde_json::json!({
        "location": {"name": name},
        "forecast": {"forecastday": [{
            "date": label,
            "day": {
                "avgtemp_c": temp_c,
                "avgtemp_f": temp_c * 9.0 / 5.0 + 32.0,
                "maxwind_kph": 12.0,
                "avghumidity": 75,
                "condition": condition,
            },
            "hour": hours,
        }]},
    });

    (StatusCode::OK, axum::Json(body)).into_response()
}

async fn serve_provider(fake: Arc<FakeProvider>) -> String {
    let app = Router::new()
        .route("/v1/forecast.json", get(forecast))
        .with_state(fake);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

struct Harness {
    state: Arc<AppState>,
    provider: Arc<FakeProvider>,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let provider = Arc::new(FakeProvider::default());
    provider.temp_tenths.store(200, Ordering::SeqCst);
    let base_url = serve_provider(provider.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(dir.path().join("stratus.db")).unwrap();

    let mut config = Config::default();
    config.provider.base_url = base_url.clone();
    config.provider.api_key = "test-key".to_string();

    let client = WeatherApiClient::new(
        &base_url,
        "test-key",
        Duration::from_secs(5),
        BackoffPolicy::new(1, Duration::from_millis(1), Duration::from_millis(5)),
    )
    .unwrap();

    let state = AppState::new(store, config, Arc::new(client), Arc::new(MemoryCache::new()));
    Harness {
        state,
        provider,
        _dir: dir,
    }
}

async fn call(
    state: &Arc<AppState>,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let response = stratus_service::app(Arc::clone(state))
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn create_location(state: &Arc<AppState>, name: &str) -> i64 {
    let (status, json) = call(
        state,
        "POST",
        "/api/v1/locations",
        Some(serde_json::json!({
            "name": name,
            "region": "Somewhere",
            "country": "Indonesia",
            "lat": -6.2,
            "lon": 106.8
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    json["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_sync_query_and_cache_flow() {
    let h = harness().await;
    let id = create_location(&h.state, "Jakarta").await;

    let (status, json) = call(
        &h.state,
        "POST",
        "/api/v1/weathers/sync",
        Some(serde_json::json!({"locationID": id, "forecastDayTotal": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");

    {
        let seen = h.provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0]["q"], "Jakarta");
        assert_eq!(seen[0]["days"], "1");
        assert_eq!(seen[0]["key"], "test-key");
    }
    assert_eq!(h.state.store.lock().await.count_forecasts(Some(id)).unwrap(), 25);

    let uri = format!("/api/v1/weathers?locationID={}&pageSize=30&currentPage=1", id);
    let (status, first) = call(&h.state, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK, "{first}");
    assert_eq!(first["message"], "get weather data success");
    assert_eq!(first["data"]["location"]["name"], "Jakarta");
    let forecast = first["data"]["forecast"].as_array().unwrap();
    assert_eq!(forecast.len(), 24);
    assert!(forecast.iter().all(|w| w["temperatureCelsius"] == 20.0));
    assert_eq!(forecast[0]["condition"]["status"], "Sunny");
    assert!(first["data"]["currentTime"].is_object());

    // Re-sync with new values: same row count, values overwritten.
    h.provider.temp_tenths.store(350, Ordering::SeqCst);
    let (status, _) = call(&h.state, "POST", "/api/v1/weathers/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    {
        let store = h.state.store.lock().await;
        assert_eq!(store.count_forecasts(Some(id)).unwrap(), 25);
        let rows = store
            .query_forecasts(&ForecastQuery::new().location(id).limit(1))
            .unwrap();
        assert_eq!(rows[0].temperature_c, 35.0);
        assert!(rows[0].last_modified_at.is_some());
    }

    // Still served from the cache until the TTL runs out.
    let (status, second) = call(&h.state, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second, first);
}

#[tokio::test]
async fn test_failing_location_does_not_block_others() {
    let h = harness().await;
    let jakarta = create_location(&h.state, "Jakarta").await;
    let atlantis = create_location(&h.state, "Atlantis").await;
    let bandung = create_location(&h.state, "Bandung").await;
    h.provider
        .unknown
        .lock()
        .unwrap()
        .push("Atlantis".to_string());

    let (status, json) = call(&h.state, "POST", "/api/v1/weathers/sync", None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["status"], "error");
    assert!(json["message"].as_str().unwrap().contains("Atlantis"));

    let store = h.state.store.lock().await;
    assert_eq!(store.count_forecasts(Some(jakarta)).unwrap(), 25);
    assert_eq!(store.count_forecasts(Some(atlantis)).unwrap(), 0);
    assert_eq!(store.count_forecasts(Some(bandung)).unwrap(), 25);
}

#[tokio::test]
async fn test_deleted_location_is_hidden() {
    let h = harness().await;
    let id = create_location(&h.state, "Jakarta").await;
    h.state.store.lock().await.soft_delete_location(id).unwrap();

    let (status, json) = call(
        &h.state,
        "GET",
        &format!("/api/v1/weathers?locationID={}", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["message"], "location not found, please check your parameter");

    let (status, json) = call(&h.state, "GET", "/api/v1/locations", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["total"], 0);

    let (status, _) = call(&h.state, "POST", "/api/v1/weathers/sync", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.provider.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_health_and_ready() {
    let h = harness().await;

    let (status, json) = call(&h.state, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "app running!");

    let (status, json) = call(&h.state, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "all resource running!");
}
