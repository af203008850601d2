//! Handlers for `GET /health` and `GET /`.

use std::{sync::LazyLock, time::Instant};

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use ident_core::store::ContactStore;
use serde::Serialize;

use crate::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reference point for `uptime`; forced when the router is built.
pub(crate) static STARTED: LazyLock<Instant> = LazyLock::new(Instant::now);

#[derive(Debug, Serialize)]
pub struct HealthStatus {
  pub status:    &'static str,
  pub database:  &'static str,
  pub timestamp: DateTime<Utc>,
  /// Seconds since the service started.
  pub uptime:    f64,
  pub version:   &'static str,
}

/// `GET /health`: 200 when the store answers, 503 otherwise.
pub async fn handler<S>(
  State(state): State<AppState<S>>,
) -> (StatusCode, Json<HealthStatus>)
where
  S: ContactStore,
{
  let (code, status, database) = match state.store.ping().await {
    Ok(()) => (StatusCode::OK, "healthy", "connected"),
    Err(e) => {
      tracing::warn!(error = %e, "health check failed");
      (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "disconnected")
    }
  };

  (
    code,
    Json(HealthStatus {
      status,
      database,
      timestamp: Utc::now(),
      uptime: STARTED.elapsed().as_secs_f64(),
      version: VERSION,
    }),
  )
}

#[derive(Debug, Serialize)]
pub struct Endpoints {
  pub identify: &'static str,
  pub health:   &'static str,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
  pub service:   &'static str,
  pub version:   &'static str,
  pub endpoints: Endpoints,
}

/// `GET /`: static service descriptor.
pub async fn root() -> Json<ServiceInfo> {
  Json(ServiceInfo {
    service:   "Identity Reconciliation API",
    version:   VERSION,
    endpoints: Endpoints { identify: "POST /identify", health: "GET /health" },
  })
}
