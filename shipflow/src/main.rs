//! Shipflow HTTP service.
//!
//! ## Environment Variables
//!
//! - `PORT`, `HOST`, `PROJECT_DIR`: where to listen and which project to manage
//! - `LOG_FORMAT=json`: structured JSON output
//! - `RUST_LOG=info`: log level filter (default: info)
//!
//! See [`ServiceConfig`] for the full list.

use anyhow::Context;
use shipflow::config::ServiceConfig;
use shipflow::generation::ProcessGenerationEngine;
use shipflow::observability::init_tracing;
use shipflow::runner::ProcessRunner;
use shipflow::server::{build_router, AppState};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::from_env().context("invalid service configuration")?;
    init_tracing(config.log_format)?;

    let runner = Arc::new(ProcessRunner::new());
    let engine = Arc::new(ProcessGenerationEngine::new(config.engine_command.clone()));
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, runner, engine).context("failed to wire stages")?);

    {
        let supervisor = Arc::clone(&state.supervisor);
        tokio::spawn(async move {
            if let Err(err) = supervisor.initialize().await {
                warn!(error = %err, "Generation engine failed to initialize");
            }
        });
    }

    let shutdown = state.shutdown.clone();
    let app = build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, project = %state.config.project_dir.display(), "Shipflow listening");

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down...");
                shutdown.cancel("Server shutting down");
            }
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("server error")?;

    Ok(())
}
