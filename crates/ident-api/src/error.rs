//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Client errors carry their detail; server errors are logged in full and
//! rendered with a generic message unless the deployment opts in to
//! exposing it.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use ident_core::{ErrorKind, store::StoreError};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
  pub field:   &'static str,
  pub message: String,
}

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("validation failed")]
  Validation(Vec<FieldError>),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found")]
  NotFound,

  #[error("store unavailable: {0}")]
  Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("store error: {source}")]
  Store {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
    /// Render `source` in the response body instead of a generic message.
    expose: bool,
  },
}

impl ApiError {
  /// Sort a store failure into client, unavailable or internal.
  pub fn from_store<E: StoreError>(e: E, expose: bool) -> Self {
    match e.kind() {
      ErrorKind::InvalidInput => ApiError::BadRequest(e.to_string()),
      ErrorKind::Transient => ApiError::Unavailable(Box::new(e)),
      ErrorKind::Internal => ApiError::Store { source: Box::new(e), expose },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::Validation(details) => (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Validation failed", "details": details })),
      )
        .into_response(),
      ApiError::BadRequest(m) => (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Bad request", "message": m })),
      )
        .into_response(),
      ApiError::NotFound => {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
      }
      ApiError::Unavailable(e) => {
        tracing::warn!(error = %e, "store unavailable");
        (
          StatusCode::SERVICE_UNAVAILABLE,
          Json(json!({
            "error": "Service unavailable",
            "message": "Service temporarily unavailable",
          })),
        )
          .into_response()
      }
      ApiError::Store { source, expose } => {
        tracing::error!(error = %source, "request failed");
        let message =
          if expose { source.to_string() } else { "Something went wrong".to_owned() };
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({ "error": "Internal server error", "message": message })),
        )
          .into_response()
      }
    }
  }
}
