//! Chart title labels, keyed by a chart id chosen by the UI.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::response::Json;
use serde::Deserialize;
use ts_rs::TS;

use crate::data::models::{ChartTitle, ChartTitleInput};
use crate::state::AppState;
use crate::web::auth::AdminToken;
use crate::web::error::ApiError;
use crate::web::routes::{Envelope, ok};

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct ChartTitleBody {
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `GET /api/chart-titles/{id}`
pub(super) async fn get_chart_title(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<Envelope<ChartTitle>>, ApiError> {
    let Path(id) = path?;
    Ok(ok(state.catalog.get_chart_title(&id).await?))
}

/// `PUT /api/chart-titles/{id}` (upsert)
pub(super) async fn set_chart_title(
    _admin: AdminToken,
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<ChartTitleBody>, JsonRejection>,
) -> Result<Json<Envelope<ChartTitle>>, ApiError> {
    let Path(id) = path?;
    let Json(body) = body?;
    let input = ChartTitleInput {
        name: body.name,
        notes: body.notes,
    };
    Ok(ok(state.catalog.set_chart_title(&id, input).await?))
}
