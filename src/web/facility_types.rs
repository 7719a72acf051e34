//! Facility type handlers.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use ts_rs::TS;

use crate::data::models::{FacilityType, FacilityTypeInput};
use crate::state::AppState;
use crate::web::auth::AdminToken;
use crate::web::error::ApiError;
use crate::web::facilities::Deleted;
use crate::web::routes::{Envelope, created, ok};

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct FacilityTypeBody {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<FacilityTypeBody> for FacilityTypeInput {
    fn from(body: FacilityTypeBody) -> Self {
        FacilityTypeInput {
            name: body.name,
            description: body.description,
        }
    }
}

/// `GET /api/facility-types`
pub(super) async fn list_facility_types(
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<FacilityType>>>, ApiError> {
    Ok(ok(state.catalog.list_facility_types().await?))
}

/// `GET /api/facility-types/{id}`
pub(super) async fn get_facility_type(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<Envelope<FacilityType>>, ApiError> {
    let Path(id) = path?;
    Ok(ok(state.catalog.get_facility_type(id).await?))
}

/// `POST /api/facility-types`
pub(super) async fn create_facility_type(
    _admin: AdminToken,
    State(state): State<AppState>,
    body: Result<Json<FacilityTypeBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<FacilityType>>), ApiError> {
    let Json(body) = body?;
    Ok(created(state.catalog.create_facility_type(body.into()).await?))
}

/// `PUT /api/facility-types/{id}`
pub(super) async fn update_facility_type(
    _admin: AdminToken,
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
    body: Result<Json<FacilityTypeBody>, JsonRejection>,
) -> Result<Json<Envelope<FacilityType>>, ApiError> {
    let Path(id) = path?;
    let Json(body) = body?;
    Ok(ok(state.catalog.update_facility_type(id, body.into()).await?))
}

/// `DELETE /api/facility-types/{id}`
///
/// Rejected with 409 while any sport or facility still references the type.
pub(super) async fn delete_facility_type(
    _admin: AdminToken,
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<Envelope<Deleted>>, ApiError> {
    let Path(id) = path?;
    state.catalog.delete_facility_type(id).await?;
    Ok(ok(Deleted { deleted: 1 }))
}
