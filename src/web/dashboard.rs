//! Dashboard aggregate and cache control handlers.

use axum::extract::State;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::{Query, QueryRejection};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::data::filter::FilterParams;
use crate::state::AppState;
use crate::web::auth::AdminToken;
use crate::web::error::ApiError;
use crate::web::routes::{Envelope, cache, ok};

/// Filter query string shared by `/dashboard-data` and `/facilities`.
///
/// List parameters accept repeated keys (`sports=a&sports=b`), a single
/// comma-joined value, or both.
#[derive(Debug, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FilterQuery {
    pub region: Option<String>,
    #[serde(default)]
    pub sports: Vec<String>,
    #[serde(default)]
    pub facility_types: Vec<String>,
    #[serde(default)]
    pub location_types: Vec<String>,
    pub ministry_of_sports: Option<bool>,
    pub search: Option<String>,
    pub facility_type_id: Option<i32>,
    #[serde(default)]
    pub sport_ids: Vec<String>,
    #[ts(type = "number | null")]
    pub page: Option<i64>,
    #[ts(type = "number | null")]
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl From<FilterQuery> for FilterParams {
    fn from(q: FilterQuery) -> Self {
        FilterParams {
            region: q.region,
            sports: q.sports,
            facility_types: q.facility_types,
            location_types: q.location_types,
            ministry_of_sports: q.ministry_of_sports.unwrap_or(false),
            search: q.search,
            facility_type_id: q.facility_type_id,
            sport_ids: q.sport_ids,
            page: q.page,
            limit: q.limit,
            sort_by: q.sort_by,
            sort_order: q.sort_order,
        }
    }
}

/// `GET /api/dashboard-data`
///
/// The body of a cache hit is the stored payload, serialized the same way as
/// on the miss that produced it. `X-Cache` reports `HIT`, `MISS` or `STALE`.
pub(super) async fn dashboard_data(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let (payload, status) = state.catalog.dashboard(&query.into()).await?;

    let mut response = Json(&*payload).into_response();
    let headers = response.headers_mut();
    headers.insert("x-cache", HeaderValue::from_static(status.as_str()));
    headers.insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static(cache::DASHBOARD),
    );
    Ok(response)
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct CacheCleared {
    pub cleared: usize,
}

/// `POST /api/cache/clear`
pub(super) async fn clear_cache(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Json<Envelope<CacheCleared>> {
    ok(CacheCleared {
        cleared: state.catalog.clear_cache(),
    })
}
