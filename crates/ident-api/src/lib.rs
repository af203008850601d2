//! JSON HTTP API for identity reconciliation.
//!
//! Exposes an axum [`Router`] backed by any [`ident_core::store::ContactStore`].
//! Input validation lives here; TLS, rate limiting and auth are the caller's
//! responsibility.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/` | Service descriptor |
//! | `GET`  | `/health` | Store liveness; 503 when unreachable |
//! | `POST` | `/identify` | See [`identify`] |

pub mod error;
pub mod health;
pub mod identify;
pub mod validate;

use std::sync::{Arc, LazyLock};

use axum::{
  Router,
  routing::{get, post},
};
use ident_core::store::ContactStore;
use serde::Deserialize;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Behaviour switches for the HTTP layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
  /// Put internal error text in 500 responses. Development only.
  #[serde(default)]
  pub expose_internal_errors: bool,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: ContactStore> {
  pub store:  Arc<S>,
  pub config: Arc<ApiConfig>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be merged or nested into any parent router
/// regardless of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: ContactStore + Clone + Send + Sync + 'static,
{
  LazyLock::force(&health::STARTED);

  Router::new()
    .route("/", get(health::root))
    .route("/health", get(health::handler::<S>))
    .route("/identify", post(identify::handler::<S>))
    .fallback(not_found)
    .with_state(state)
}

async fn not_found() -> ApiError { ApiError::NotFound }

// ─── Integration tests ────────────────────────────────────────────────────────
