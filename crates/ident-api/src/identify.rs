//! Handler for `POST /identify`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/identify` | Body: [`IdentifyBody`]; returns 200 + [`IdentifyResponse`] |

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
};
use ident_core::{identity::IdentifyResponse, store::ContactStore};

use crate::{AppState, error::ApiError, validate::IdentifyBody};

/// `POST /identify`, body `{"email"?: "...", "phoneNumber"?: "..."}`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<IdentifyBody>, JsonRejection>,
) -> Result<Json<IdentifyResponse>, ApiError>
where
  S: ContactStore,
{
  let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let request = body.validate()?;

  let contact = state
    .store
    .identify(request)
    .await
    .map_err(|e| ApiError::from_store(e, state.config.expose_internal_errors))?;

  Ok(Json(IdentifyResponse::from(contact)))
}
