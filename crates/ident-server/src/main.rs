//! ident-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), applies any
//! `IDENT_*` environment overrides, opens the SQLite contact store and serves
//! the identity API over HTTP until SIGINT or SIGTERM.

mod settings;

use std::{future::IntoFuture as _, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use ident_api::AppState;
use ident_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, sync::Notify};
use tower_http::{
  cors::{AllowOrigin, CorsLayer},
  trace::TraceLayer,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Contact identity reconciliation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;

  let store_path = server_cfg.resolved_store_path();
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open_with(&store_path, server_cfg.store_options())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  tracing::info!(path = ?store_path, "opened contact store");

  let state = AppState {
    store:  Arc::new(store),
    config: Arc::new(server_cfg.api_config()),
  };

  let app = ident_api::api_router(state)
    .layer(cors_layer(&server_cfg.cors_origins))
    .layer(TraceLayer::new_for_http());

  let address = server_cfg.address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  tracing::info!("Listening on http://{address}");

  let signalled = Arc::new(Notify::new());
  let server = axum::serve(listener, app)
    .with_graceful_shutdown({
      let signalled = signalled.clone();
      async move {
        shutdown_signal().await;
        signalled.notify_one();
      }
    })
    .into_future();

  let grace = server_cfg.shutdown_grace();
  if run_bounded(server, &signalled, grace).await.context("server error")? {
    tracing::info!("server stopped");
  } else {
    tracing::warn!(?grace, "connections still open after shutdown grace period; exiting");
  }
  Ok(())
}

/// Drive `server` to completion, giving up `grace` after `signalled` fires.
/// Returns `false` if in-flight connections were abandoned.
async fn run_bounded<F>(server: F, signalled: &Notify, grace: Duration) -> std::io::Result<bool>
where
  F: Future<Output = std::io::Result<()>>,
{
  tokio::select! {
    res = server => res.map(|()| true),
    _ = async {
      signalled.notified().await;
      tokio::time::sleep(grace).await;
    } => Ok(false),
  }
}

/// Any origin when `origins` is empty, otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
  if origins.is_empty() {
    return CorsLayer::permissive();
  }

  let allowed: Vec<HeaderValue> = origins
    .iter()
    .filter_map(|o| match o.parse() {
      Ok(v) => Some(v),
      Err(_) => {
        tracing::warn!(origin = %o, "ignoring unparseable CORS origin");
        None
      }
    })
    .collect();

  CorsLayer::new()
    .allow_origin(AllowOrigin::list(allowed))
    .allow_methods([Method::GET, Method::POST])
    .allow_headers([header::CONTENT_TYPE])
}

async fn shutdown_signal() {
  let ctrl_c = async {
    if let Err(e) = tokio::signal::ctrl_c().await {
      tracing::warn!(error = %e, "failed to listen for Ctrl+C");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
      Ok(mut sigterm) => {
        sigterm.recv().await;
      }
      Err(e) => {
        tracing::warn!(error = %e, "failed to install SIGTERM handler");
        std::future::pending::<()>().await;
      }
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
    _ = terminate => tracing::info!("received SIGTERM, shutting down"),
  }
}
