//! Health, status, and region table handlers.

use axum::extract::State;
use axum::response::{Json, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{trace, warn};
use ts_rs::TS;

use crate::data::region::Region;
use crate::state::AppState;
use crate::web::routes::{Envelope, cache, ok, with_cache_control};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceStatus {
    Active,
    Error,
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    store: String,
    store_status: ServiceStatus,
    cache_entries: usize,
    #[ts(type = "number")]
    cache_ttl_seconds: u64,
}

#[derive(Serialize, TS)]
#[ts(export)]
pub struct RegionInfo {
    region: Region,
    code: String,
    name: String,
}

/// Health check endpoint
pub(super) async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Status endpoint: store reachability and cache occupancy.
pub(super) async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let store_status = match state.catalog.ping().await {
        Ok(()) => ServiceStatus::Active,
        Err(e) => {
            warn!(error = %e, "store ping failed");
            ServiceStatus::Error
        }
    };
    let cache = state.catalog.cache();

    Json(StatusResponse {
        status: store_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        store: state.catalog.store_kind().to_string(),
        store_status,
        cache_entries: cache.len(),
        cache_ttl_seconds: cache.ttl().as_secs(),
    })
}

/// `GET /api/regions`
pub(super) async fn regions() -> Response {
    let regions: Vec<RegionInfo> = Region::ALL
        .iter()
        .map(|r| RegionInfo {
            region: *r,
            code: r.code().to_owned(),
            name: r.display_name().to_owned(),
        })
        .collect();
    let body: Json<Envelope<Vec<RegionInfo>>> = ok(regions);
    with_cache_control(body.0, cache::STATIC)
}
