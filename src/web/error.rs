//! API error type and its JSON representation.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum_extra::extract::QueryRejection;
use serde::Serialize;
use std::fmt::Display;
use ts_rs::TS;

use crate::data::catalog::CatalogError;
use crate::data::filter::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export)]
pub enum ApiErrorCode {
    BadRequest,
    InvalidRegion,
    InvalidSort,
    ValidationError,
    Unauthorized,
    NotFound,
    Conflict,
    InternalError,
}

impl ApiErrorCode {
    pub const fn status(self) -> StatusCode {
        match self {
            ApiErrorCode::BadRequest
            | ApiErrorCode::InvalidRegion
            | ApiErrorCode::InvalidSort
            | ApiErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ApiErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::Conflict => StatusCode::CONFLICT,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body: `{ "success": false, "error": "...", "code": "..." }`.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ApiError {
    success: bool,
    #[serde(rename = "error")]
    message: String,
    code: ApiErrorCode,
}

impl ApiError {
    pub fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code,
        }
    }

    pub fn code(&self) -> ApiErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::BadRequest, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::ValidationError, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Unauthorized, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::Conflict, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ApiErrorCode::InternalError, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

/// Log a storage failure and return a generic 500.
pub fn db_error(context: &str, error: impl Display) -> ApiError {
    tracing::error!(error = %error, "{context} failed");
    ApiError::internal_error(format!("{context} failed"))
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        let code = match err {
            FilterError::InvalidRegion(_) => ApiErrorCode::InvalidRegion,
            FilterError::InvalidSortField(_) | FilterError::InvalidSortOrder(_) => {
                ApiErrorCode::InvalidSort
            }
            FilterError::InvalidId(_) => ApiErrorCode::BadRequest,
        };
        ApiError::new(code, err.to_string())
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { .. } => ApiError::not_found(err.to_string()),
            CatalogError::Conflict(msg) => ApiError::conflict(msg),
            CatalogError::Validation(msg) => ApiError::validation(msg),
            CatalogError::Filter(filter_err) => filter_err.into(),
            CatalogError::Store(store_err) => db_error("Storage operation", store_err),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.to_string())
    }
}
