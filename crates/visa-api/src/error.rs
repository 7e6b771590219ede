//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized")]
  Unauthorized,

  #[error("forbidden")]
  Forbidden,

  #[error("attachment exceeds {limit} bytes")]
  PayloadTooLarge { limit: usize },

  #[error("conflict: {0}")]
  Conflict(String),

  /// The attachment could not be stored. Nothing was recorded.
  #[error("upload failed: {0}")]
  UploadFailed(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<visa_core::Error> for ApiError {
  fn from(e: visa_core::Error) -> Self {
    use visa_core::Error as Core;
    match e {
      Core::NotFound(id) => ApiError::NotFound(format!("application {id} not found")),
      Core::InvalidStatus(_) => ApiError::BadRequest(e.to_string()),
      Core::UploadFailed(source) => ApiError::UploadFailed(source.to_string()),
      Core::StoreWriteConflict(_) => ApiError::Conflict(e.to_string()),
      other => ApiError::Internal(Box::new(other)),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(r: PathRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
      ApiError::Forbidden => StatusCode::FORBIDDEN,
      ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    match &self {
      ApiError::Internal(e) => tracing::error!(error = %e, "request failed"),
      ApiError::UploadFailed(e) => tracing::warn!(error = %e, "attachment upload failed"),
      _ => {}
    }

    let mut res = (status, Json(json!({ "error": self.to_string() }))).into_response();
    if matches!(self, ApiError::Unauthorized) {
      res
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    }
    res
  }
}
