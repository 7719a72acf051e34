//! Web API router construction and shared response utilities.

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer};

use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{chart_titles, dashboard, facilities, facility_types, sports, status};

/// Cache-Control presets.
pub mod cache {
    /// Dashboard aggregates change on every write; clients must revalidate.
    pub const DASHBOARD: &str = "private, no-cache";
    /// The region table is fixed at build time.
    pub const STATIC: &str = "public, max-age=86400";
}

/// Batch uploads carry up to 5000 rows.
const BATCH_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Success body: `{ "success": true, "data": ... }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        data,
    })
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, ok(data))
}

/// Wraps a JSON response with a `Cache-Control` header.
pub fn with_cache_control<T: Serialize>(value: T, header: &'static str) -> Response {
    let mut response = Json(value).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static(header),
    );
    response
}

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/regions", get(status::regions))
        .route("/dashboard-data", get(dashboard::dashboard_data))
        .route("/cache/clear", post(dashboard::clear_cache))
        .route(
            "/facilities",
            get(facilities::list_facilities).post(facilities::create_facility),
        )
        .route(
            "/facilities/batch-upload",
            post(facilities::batch_upload).layer(DefaultBodyLimit::max(BATCH_BODY_LIMIT)),
        )
        .route(
            "/facilities/delete-all",
            delete(facilities::delete_all_facilities),
        )
        .route(
            "/facilities/{id}",
            get(facilities::get_facility)
                .put(facilities::update_facility)
                .delete(facilities::delete_facility),
        )
        .route(
            "/sports",
            get(sports::list_sports).post(sports::create_sport),
        )
        .route(
            "/sports/{id}",
            get(sports::get_sport)
                .put(sports::update_sport)
                .delete(sports::delete_sport),
        )
        .route(
            "/facility-types",
            get(facility_types::list_facility_types).post(facility_types::create_facility_type),
        )
        .route(
            "/facility-types/{id}",
            get(facility_types::get_facility_type)
                .put(facility_types::update_facility_type)
                .delete(facility_types::delete_facility_type),
        )
        .route(
            "/chart-titles/{id}",
            get(chart_titles::get_chart_title).put(chart_titles::set_chart_title),
        )
        .with_state(app_state);

    Router::new().nest("/api", api_router).layer((
        // Outermost: request ID span and completion logging.
        RequestIdLayer,
        CorsLayer::permissive(),
        CompressionLayer::new()
            .zstd(true)
            .br(true)
            .gzip(true)
            .quality(tower_http::CompressionLevel::Fastest),
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(60)),
    ))
}
