//! REST API endpoints.
//!
//! Every response uses the envelope `{"status", "message", "data"}`; errors
//! carry `"status": "error"` and no data.
//!
//! ```ignore
//! use stratus_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use stratus_store::LocationQuery;
use stratus_types::{Location, LocationSort, NewLocation};

use crate::query::{DEFAULT_PAGE_SIZE, QueryError, WeatherQueryResult};
use crate::state::AppState;
use crate::sync::{SyncError, SyncRequest};
use crate::worker::WorkerStatsSnapshot;

/// Key read by `/ready` to check the cache.
const READY_CHECK_KEY: &str = "ready:check";

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/api/v1/locations", get(list_locations).post(create_location))
        .route("/api/v1/weathers", get(get_weathers))
        .route("/api/v1/weathers/sync", post(sync_weathers))
        .route("/api/v1/worker", get(worker_status))
}

/// Response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn success(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
            data: Some(data),
        })
    }

    fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            status: "success",
            message: message.into(),
            data: None,
        })
    }
}

async fn health() -> Json<ApiResponse<()>> {
    ApiResponse::message("app running!")
}

/// Readiness: the store answers a query and the cache answers a read.
async fn ready(State(state): State<Arc<AppState>>) -> Result<Json<ApiResponse<()>>, AppError> {
    state.store.lock().await.ping().map_err(|e| {
        error!("Readiness check failed on store: {}", e);
        AppError::Internal("database not reachable".to_string())
    })?;

    state.cache.get(READY_CHECK_KEY).await.map_err(|e| {
        error!("Readiness check failed on cache: {}", e);
        AppError::Internal("cache not reachable".to_string())
    })?;

    Ok(ApiResponse::message("all resource running!"))
}

/// Raw query parameters; numbers are parsed by hand so bad input maps to
/// a specific message.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationsParams {
    pub query: Option<String>,
    pub page_size: Option<String>,
    pub current_page: Option<String>,
    pub sort_by: Option<String>,
}

/// One page of locations.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPage {
    pub items: Vec<Location>,
    pub total: u64,
    pub current_page: u32,
    pub page_size: u32,
}

async fn list_locations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocationsParams>,
) -> Result<Json<ApiResponse<LocationPage>>, AppError> {
    let page_size = parse_optional_u32(params.page_size.as_deref(), "pageSize")?
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let current_page = parse_optional_u32(params.current_page.as_deref(), "currentPage")?
        .filter(|n| *n > 0)
        .unwrap_or(1);

    let sort = match params.sort_by.as_deref() {
        None | Some("") => LocationSort::default(),
        Some(s) => s.parse::<LocationSort>().map_err(|_| {
            AppError::BadRequest(
                "invalid sort_by parameter, only allow created_at_ascend, created_at_descend, \
                 name_ascend, name_descend"
                    .to_string(),
            )
        })?,
    };

    let query = LocationQuery::new()
        .name_like(params.query.as_deref().unwrap_or_default())
        .sort(sort)
        .limit(page_size)
        .offset((current_page - 1).saturating_mul(page_size));

    let items = state.registry.get_locations(&query).await?;
    let total = state.registry.count_locations().await?;

    Ok(ApiResponse::success(
        "fetch locations successfully",
        LocationPage {
            items,
            total,
            current_page,
            page_size,
        },
    ))
}

async fn create_location(
    State(state): State<Arc<AppState>>,
    body: Result<Json<NewLocation>, JsonRejection>,
) -> Result<Json<ApiResponse<Location>>, AppError> {
    let Json(request) =
        body.map_err(|e| AppError::BadRequest(format!("invalid request body: {}", e.body_text())))?;
    request
        .validate()
        .map_err(|e| AppError::BadRequest(format!("invalid request body: {}", e)))?;

    let location = state.registry.insert_location(&request).await?;
    info!("Created location {} ({})", location.name, location.id);

    Ok(ApiResponse::success("create location successfully", location))
}

/// Raw `GET /api/v1/weathers` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct WeathersParams {
    #[serde(rename = "locationID")]
    pub location_id: Option<String>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<String>,
    #[serde(rename = "currentPage")]
    pub current_page: Option<String>,
}

async fn get_weathers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WeathersParams>,
) -> Result<Json<ApiResponse<WeatherQueryResult>>, AppError> {
    let page_size = parse_optional_u32(params.page_size.as_deref(), "pageSize")?.unwrap_or(0);
    let current_page =
        parse_optional_u32(params.current_page.as_deref(), "currentPage")?.unwrap_or(0);

    let location_id = match params.location_id.as_deref() {
        None | Some("") => {
            return Err(AppError::BadRequest(
                "locationID parameter is empty, please check your parameter".to_string(),
            ));
        }
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            AppError::BadRequest(
                "invalid locationID parameter, please check your parameter".to_string(),
            )
        })?,
    };

    let result = state
        .query
        .get_weathers(location_id, page_size, current_page)
        .await?;

    Ok(ApiResponse::success("get weather data success", result))
}

/// Body of `POST /api/v1/weathers/sync`. Every field is optional.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncWeatherRequest {
    #[serde(rename = "locationID")]
    pub location_id: i64,
    pub limit: u32,
    #[serde(rename = "forecastDayTotal")]
    pub forecast_day_total: u32,
}

impl From<SyncWeatherRequest> for SyncRequest {
    fn from(req: SyncWeatherRequest) -> Self {
        SyncRequest {
            location_id: (req.location_id > 0).then_some(req.location_id),
            limit: req.limit,
            forecast_days: req.forecast_day_total,
        }
    }
}

async fn sync_weathers(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SyncWeatherRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<SyncWeatherRequest>>, AppError> {
    let request = match body {
        Ok(Json(request)) => request,
        Err(JsonRejection::MissingJsonContentType(_)) => SyncWeatherRequest::default(),
        Err(e) => {
            return Err(AppError::BadRequest(format!(
                "invalid request body: {}",
                e.body_text()
            )));
        }
    };
    let cancel = state.shutdown.child_token();

    state
        .sync
        .sync_weather(&SyncRequest::from(request), &cancel)
        .await
        .map_err(|e| {
            error!("Manual sync failed: {}", e);
            AppError::from(e)
        })?;

    Ok(ApiResponse::success("sync weather successfully", request))
}

async fn worker_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<WorkerStatsSnapshot>> {
    ApiResponse::success("worker status", state.worker_stats.snapshot().await)
}

fn parse_optional_u32(raw: Option<&str>, name: &str) -> Result<Option<u32>, AppError> {
    match raw {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<u32>().map(Some).map_err(|_| {
            AppError::BadRequest(format!(
                "invalid {} parameter, please check your parameter",
                name
            ))
        }),
    }
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Store(stratus_store::Error),
    Internal(String),
}

impl From<stratus_store::Error> for AppError {
    fn from(e: stratus_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl From<QueryError> for AppError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::NotFound(_) => {
                AppError::NotFound("location not found, please check your parameter".to_string())
            }
            QueryError::Store(e) => {
                AppError::Internal(format!("error occurred on fetch weathers: {}", e))
            }
        }
    }
}

impl From<SyncError> for AppError {
    fn from(e: SyncError) -> Self {
        AppError::Internal(format!("failed to sync weather: {}", e))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "status": "error",
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
