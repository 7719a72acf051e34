//! Facility CRUD and batch import handlers.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum_extra::extract::{Query, QueryRejection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::data::batch::BatchReport;
use crate::data::catalog::FacilityPage;
use crate::data::models::{DEFAULT_COUNTRY, Facility, FacilityInput};
use crate::data::region::Region;
use crate::state::AppState;
use crate::web::auth::AdminToken;
use crate::web::dashboard::FilterQuery;
use crate::web::error::{ApiError, ApiErrorCode};
use crate::web::routes::{Envelope, created, ok};

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FacilityBody {
    pub name: String,
    /// Code (`SA-01`), enum value (`RIYADH`) or display name.
    pub region: String,
    #[serde(default)]
    pub country: Option<String>,
    pub address: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub reviews: Option<i32>,
    #[serde(default)]
    pub url: Option<String>,
    pub facility_type_id: i32,
    #[serde(default)]
    pub ministry_of_sports: bool,
    #[serde(default)]
    pub sport_ids: Vec<i32>,
}

impl TryFrom<FacilityBody> for FacilityInput {
    type Error = ApiError;

    fn try_from(body: FacilityBody) -> Result<Self, Self::Error> {
        let region = Region::parse_any(&body.region)
            .map_err(|e| ApiError::new(ApiErrorCode::InvalidRegion, e.to_string()))?;
        Ok(FacilityInput {
            name: body.name,
            region,
            country: body
                .country
                .map(|c| c.trim().to_owned())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_COUNTRY.to_owned()),
            address: body.address,
            rating: body.rating,
            reviews: body.reviews,
            url: body
                .url
                .map(|u| u.trim().to_owned())
                .filter(|u| !u.is_empty()),
            facility_type_id: body.facility_type_id,
            ministry_of_sports: body.ministry_of_sports,
            sport_ids: body.sport_ids,
        })
    }
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct Deleted {
    #[ts(type = "number")]
    pub deleted: u64,
}

/// `GET /api/facilities`
pub(super) async fn list_facilities(
    State(state): State<AppState>,
    query: Result<Query<FilterQuery>, QueryRejection>,
) -> Result<Json<Envelope<FacilityPage>>, ApiError> {
    let Query(query) = query?;
    let page = state.catalog.list_facilities(&query.into()).await?;
    Ok(ok(page))
}

/// `GET /api/facilities/{id}`
pub(super) async fn get_facility(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<Envelope<Facility>>, ApiError> {
    let Path(id) = path?;
    Ok(ok(state.catalog.get_facility(id).await?))
}

/// `POST /api/facilities`
pub(super) async fn create_facility(
    _admin: AdminToken,
    State(state): State<AppState>,
    body: Result<Json<FacilityBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Facility>>), ApiError> {
    let Json(body) = body?;
    let facility = state.catalog.create_facility(body.try_into()?).await?;
    Ok(created(facility))
}

/// `PUT /api/facilities/{id}`
pub(super) async fn update_facility(
    _admin: AdminToken,
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
    body: Result<Json<FacilityBody>, JsonRejection>,
) -> Result<Json<Envelope<Facility>>, ApiError> {
    let Path(id) = path?;
    let Json(body) = body?;
    let facility = state.catalog.update_facility(id, body.try_into()?).await?;
    Ok(ok(facility))
}

/// `DELETE /api/facilities/{id}`
pub(super) async fn delete_facility(
    _admin: AdminToken,
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<Envelope<Deleted>>, ApiError> {
    let Path(id) = path?;
    state.catalog.delete_facility(id).await?;
    Ok(ok(Deleted { deleted: 1 }))
}

/// `DELETE /api/facilities/delete-all`
pub(super) async fn delete_all_facilities(
    _admin: AdminToken,
    State(state): State<AppState>,
) -> Result<Json<Envelope<Deleted>>, ApiError> {
    let deleted = state.catalog.delete_all_facilities().await?;
    Ok(ok(Deleted { deleted }))
}

/// `POST /api/facilities/batch-upload`
///
/// Body is a JSON array of row objects. Individual row failures are reported
/// in the result rather than failing the request.
pub(super) async fn batch_upload(
    _admin: AdminToken,
    State(state): State<AppState>,
    body: Result<Json<Vec<Value>>, JsonRejection>,
) -> Result<Json<Envelope<BatchReport>>, ApiError> {
    let Json(rows) = body?;
    let report = state.catalog.import_batch(rows).await?;
    Ok(ok(report))
}
