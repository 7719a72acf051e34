//! Sport handlers.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum_extra::extract::{Query, QueryRejection};
use serde::Deserialize;
use ts_rs::TS;

use crate::data::models::{Sport, SportInput};
use crate::state::AppState;
use crate::web::auth::AdminToken;
use crate::web::error::ApiError;
use crate::web::facilities::Deleted;
use crate::web::routes::{Envelope, created, ok};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SportsQuery {
    pub facility_type_id: Option<i32>,
}

#[derive(Debug, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SportBody {
    pub name: String,
    pub facility_type_id: i32,
    #[serde(default)]
    pub description: Option<String>,
}

impl From<SportBody> for SportInput {
    fn from(body: SportBody) -> Self {
        SportInput {
            name: body.name,
            facility_type_id: body.facility_type_id,
            description: body.description,
        }
    }
}

/// `GET /api/sports?facilityTypeId=`
pub(super) async fn list_sports(
    State(state): State<AppState>,
    query: Result<Query<SportsQuery>, QueryRejection>,
) -> Result<Json<Envelope<Vec<Sport>>>, ApiError> {
    let Query(query) = query?;
    Ok(ok(state.catalog.list_sports(query.facility_type_id).await?))
}

/// `GET /api/sports/{id}`
pub(super) async fn get_sport(
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<Envelope<Sport>>, ApiError> {
    let Path(id) = path?;
    Ok(ok(state.catalog.get_sport(id).await?))
}

/// `POST /api/sports`
pub(super) async fn create_sport(
    _admin: AdminToken,
    State(state): State<AppState>,
    body: Result<Json<SportBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Sport>>), ApiError> {
    let Json(body) = body?;
    Ok(created(state.catalog.create_sport(body.into()).await?))
}

/// `PUT /api/sports/{id}`
pub(super) async fn update_sport(
    _admin: AdminToken,
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
    body: Result<Json<SportBody>, JsonRejection>,
) -> Result<Json<Envelope<Sport>>, ApiError> {
    let Path(id) = path?;
    let Json(body) = body?;
    Ok(ok(state.catalog.update_sport(id, body.into()).await?))
}

/// `DELETE /api/sports/{id}`
pub(super) async fn delete_sport(
    _admin: AdminToken,
    State(state): State<AppState>,
    path: Result<Path<i32>, PathRejection>,
) -> Result<Json<Envelope<Deleted>>, ApiError> {
    let Path(id) = path?;
    state.catalog.delete_sport(id).await?;
    Ok(ok(Deleted { deleted: 1 }))
}
