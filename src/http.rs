/// HTTP API for Mobility Explorer.
///
/// This module exposes the explorer's read operations over a small REST
/// interface. Every response, successful or not, uses the same envelope:
///
/// ```json
/// { "message": "...", "success": true, "data": ..., "pagination": { ... } }
/// ```
///
/// `pagination` only appears on trip listings.
///
/// # Example
///
/// ```ignore
/// use mobility_explorer::http::HttpServer;
///
/// let explorer = Explorer::new(SqliteStore::open_read_only("trips.db")?);
/// let server = HttpServer::new(explorer);
/// server.bind("0.0.0.0:8080").await?;
/// ```
///
/// # API Endpoints
///
/// - `GET /` - Service index
/// - `GET /api/trips` - Filtered, sorted, paginated trips
/// - `GET /api/trips/:trip_id` - Single trip
/// - `GET /api/analytics/stats` - Totals over an optional pickup window
/// - `GET /api/analytics/time-series` - Bucketed trip counts and durations
///
/// # Status Codes
///
/// - `404` - lookup, stats or series matched nothing
/// - `422` - malformed or out-of-range parameters
/// - `500` - the record store failed
use crate::core::Explorer;
use crate::error::{ExplorerError, ExplorerResult};
use crate::pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PageInfo, PageRequest};
use crate::query::{SortSpec, TripFilterParams};
use crate::timeseries::{Granularity, TimeRange};
use crate::types::{StoreFlag, TimeSeriesPoint, Trip, TripStats, parse_timestamp};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::Json;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

/// HTTP server for Mobility Explorer.
pub struct HttpServer {
    explorer: Explorer,
    max_page_size: u64,
}

impl HttpServer {
    /// Create a new HTTP server around an explorer.
    pub fn new(explorer: Explorer) -> Self {
        Self {
            explorer,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    /// Override the largest accepted page size.
    pub fn with_max_page_size(mut self, max_page_size: u64) -> Self {
        self.max_page_size = max_page_size;
        self
    }

    /// Build the router without binding a socket.
    pub fn router(&self) -> axum::Router {
        create_router(self.explorer.clone(), self.max_page_size)
    }

    /// Start the HTTP server on the given address.
    pub async fn bind(self, addr: &str) -> ExplorerResult<()> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| ExplorerError::Config {
                reason: format!("invalid address '{}': {}", addr, e),
            })?;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ExplorerError::Config {
                reason: format!("failed to bind {}: {}", addr, e),
            })?;
        info!("Listening on {}", addr);
        axum::serve(listener, app)
            .await
            .map_err(|e| ExplorerError::Store(format!("server error: {}", e)))?;

        Ok(())
    }
}

struct AppState {
    explorer: Explorer,
    max_page_size: u64,
}

/// Create the Axum router with all routes.
pub fn create_router(explorer: Explorer, max_page_size: u64) -> axum::Router {
    use axum::Router;
    use axum::routing::get;

    let state = Arc::new(AppState {
        explorer,
        max_page_size,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_index))
        .route("/api/trips", get(handle_list_trips))
        .route("/api/trips/:trip_id", get(handle_get_trip))
        .route("/api/analytics/stats", get(handle_stats))
        .route("/api/analytics/time-series", get(handle_time_series))
        .layer(cors)
        .with_state(state)
}

/// Uniform response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub message: String,
    pub success: bool,
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageInfo>,
}

impl<T> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            message: message.into(),
            success: true,
            data,
            pagination: None,
        })
    }
}

impl ExplorerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ExplorerError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ExplorerError::NotFound(_) => StatusCode::NOT_FOUND,
            ExplorerError::Store(_) | ExplorerError::Config { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ExplorerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if !self.is_client_error() {
            warn!("Request failed: {}", self);
        }
        let body = ApiResponse {
            message: self.to_string(),
            success: false,
            data: JsonValue::Null,
            pagination: None,
        };
        (status, Json(body)).into_response()
    }
}

fn reject(rejection: QueryRejection) -> ExplorerError {
    ExplorerError::validation(rejection.body_text())
}

fn parse_optional_timestamp(raw: Option<&str>) -> ExplorerResult<Option<NaiveDateTime>> {
    raw.map(parse_timestamp).transpose()
}

/// Query string for `GET /api/trips`.
#[derive(Debug, Default, Deserialize)]
struct TripsQuery {
    pickup_start: Option<String>,
    pickup_end: Option<String>,
    dropoff_start: Option<String>,
    dropoff_end: Option<String>,
    min_duration: Option<u32>,
    max_duration: Option<u32>,
    min_passengers: Option<u32>,
    max_passengers: Option<u32>,
    vendor_id: Option<i64>,
    pickup_lat_min: Option<f64>,
    pickup_lat_max: Option<f64>,
    pickup_lon_min: Option<f64>,
    pickup_lon_max: Option<f64>,
    dropoff_lat_min: Option<f64>,
    dropoff_lat_max: Option<f64>,
    dropoff_lon_min: Option<f64>,
    dropoff_lon_max: Option<f64>,
    store_and_fwd_flag: Option<String>,
    skip: Option<u64>,
    limit: Option<u64>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

impl TripsQuery {
    fn filter_params(&self) -> ExplorerResult<TripFilterParams> {
        Ok(TripFilterParams {
            pickup_start: parse_optional_timestamp(self.pickup_start.as_deref())?,
            pickup_end: parse_optional_timestamp(self.pickup_end.as_deref())?,
            dropoff_start: parse_optional_timestamp(self.dropoff_start.as_deref())?,
            dropoff_end: parse_optional_timestamp(self.dropoff_end.as_deref())?,
            min_duration: self.min_duration,
            max_duration: self.max_duration,
            min_passengers: self.min_passengers,
            max_passengers: self.max_passengers,
            vendor_id: self.vendor_id,
            pickup_lat_min: self.pickup_lat_min,
            pickup_lat_max: self.pickup_lat_max,
            pickup_lon_min: self.pickup_lon_min,
            pickup_lon_max: self.pickup_lon_max,
            dropoff_lat_min: self.dropoff_lat_min,
            dropoff_lat_max: self.dropoff_lat_max,
            dropoff_lon_min: self.dropoff_lon_min,
            dropoff_lon_max: self.dropoff_lon_max,
            store_and_fwd_flag: self
                .store_and_fwd_flag
                .as_deref()
                .map(str::parse::<StoreFlag>)
                .transpose()?,
        })
    }
}

/// Query string for `GET /api/analytics/stats`.
#[derive(Debug, Default, Deserialize)]
struct StatsQuery {
    pickup_start: Option<String>,
    pickup_end: Option<String>,
}

/// Query string for `GET /api/analytics/time-series`.
#[derive(Debug, Default, Deserialize)]
struct SeriesQuery {
    time_range: Option<String>,
    interval: Option<String>,
}

#[derive(Debug, Serialize)]
struct IndexData {
    name: &'static str,
    version: &'static str,
    endpoints: BTreeMap<&'static str, &'static str>,
}

// Handler implementations

async fn handle_index() -> Json<ApiResponse<IndexData>> {
    let endpoints = BTreeMap::from([
        ("trips", "/api/trips - Get trips with filtering and sorting"),
        ("trip_by_id", "/api/trips/{trip_id} - Get specific trip"),
        ("statistics", "/api/analytics/stats - Overall statistics"),
        ("time_series", "/api/analytics/time-series - Time series data"),
    ]);
    ApiResponse::ok(
        "Urban Mobility Data Explorer API",
        IndexData {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            endpoints,
        },
    )
}

async fn handle_list_trips(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TripsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<Trip>>>, ExplorerError> {
    let Query(query) = query.map_err(reject)?;

    let params = query.filter_params()?;
    let page = PageRequest::new(
        query.skip.unwrap_or(0),
        query.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        state.max_page_size,
    )?;
    let sort = SortSpec::resolve(query.sort_by.as_deref(), query.sort_order.as_deref());

    let result = state.explorer.list_trips(&params, sort, page).await?;
    debug!(
        total = result.pagination.total,
        returned = result.trips.len(),
        "listed trips"
    );

    let mut response = ApiResponse::ok("Fetched trips successfully", result.trips);
    response.pagination = Some(result.pagination);
    Ok(response)
}

async fn handle_get_trip(
    State(state): State<Arc<AppState>>,
    Path(trip_id): Path<String>,
) -> Result<Json<ApiResponse<Trip>>, ExplorerError> {
    let trip = state.explorer.get_trip(&trip_id).await?;
    Ok(ApiResponse::ok("Trip fetched successfully", trip))
}

async fn handle_stats(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StatsQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<TripStats>>, ExplorerError> {
    let Query(query) = query.map_err(reject)?;
    let start = parse_optional_timestamp(query.pickup_start.as_deref())?;
    let end = parse_optional_timestamp(query.pickup_end.as_deref())?;

    let stats = state.explorer.stats(start, end).await?;
    Ok(ApiResponse::ok("Statistics fetched successfully", stats))
}

async fn handle_time_series(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SeriesQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<TimeSeriesPoint>>>, ExplorerError> {
    let Query(query) = query.map_err(reject)?;
    let range = TimeRange::parse(query.time_range.as_deref());
    let granularity = Granularity::parse(query.interval.as_deref());

    let points = state.explorer.time_series(range, granularity).await?;
    Ok(ApiResponse::ok("Time series data fetched successfully", points))
}
