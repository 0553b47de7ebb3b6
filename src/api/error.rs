use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::db::NotFound;
use crate::models::ValidationErrors;

/// Errors returned by request handlers.
///
/// Storage errors arrive as `anyhow::Error`; the conversion below recovers the
/// typed cases (missing parent, invalid fields) so they reach the client with
/// a proper status. Everything else is logged in full and reported as a
/// generic 500 so internal details do not leak.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Validation(ValidationErrors),

    #[error("Invalid request body: {0}")]
    BadRequest(String),

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        let e = match e.downcast::<ValidationErrors>() {
            Ok(errors) => return Self::Validation(errors),
            Err(e) => e,
        };
        match e.downcast::<NotFound>() {
            Ok(NotFound(what)) => Self::NotFound(what),
            Err(e) => Self::Internal(e),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("{} not found", what)).into_response()
            }
            Self::Validation(errors) => {
                tracing::warn!("Validation error: {}", errors);
                (StatusCode::UNPROCESSABLE_ENTITY, Json(errors)).into_response()
            }
            Self::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", msg)).into_response()
            }
            Self::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
                    .into_response()
            }
        }
    }
}
