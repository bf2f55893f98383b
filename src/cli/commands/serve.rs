//! `serve` command
//!
//! Runs the HTTP game server until the cancellation token fires.

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendKind;
use crate::cli::args::ServeArgs;
use crate::error::ImpostorError;
use crate::observability::events::{Event, EventEmitter};
use crate::transport::http::{AppState, HttpServer};

use super::{build_store, load_config, open_events};

/// Start the game server.
///
/// # Errors
///
/// Returns a config error for an invalid configuration, or a server error
/// if the listener cannot be bound.
pub async fn run(args: &ServeArgs, cancel: CancellationToken) -> Result<(), ImpostorError> {
    crate::observability::init_metrics(args.metrics_port)?;
    if let Some(port) = args.metrics_port {
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let config = load_config(&args.config, |config| {
        if let Some(bind) = &args.bind {
            config.server.bind.clone_from(bind);
        }
    })?;

    let events = open_events(args.config.events_file.as_deref(), EventEmitter::stderr)?;
    let store = build_store(&config, args.config.backend, std::sync::Arc::clone(&events));
    let reaper = store.spawn_reaper(cancel.child_token());

    let (server, bound_addr) =
        HttpServer::bind(&config.server, AppState::new(store), cancel.clone()).await?;
    tracing::info!(%bound_addr, backend = backend_name(args.config.backend), "game server listening");
    events.emit(Event::ServerStarted {
        timestamp: Utc::now(),
        bind: bound_addr.to_string(),
        backend: backend_name(args.config.backend).to_string(),
    });

    cancel.cancelled().await;
    server.wait().await?;
    join_reaper(reaper).await;

    events.emit(Event::ServerStopped {
        timestamp: Utc::now(),
        reason: "shutdown requested".to_string(),
    });
    tracing::info!("game server stopped");
    Ok(())
}

/// Waits for the idle-session reaper. Returns `false` if the task failed.
async fn join_reaper(reaper: Option<JoinHandle<()>>) -> bool {
    let Some(reaper) = reaper else {
        return true;
    };
    match reaper.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "session reaper task failed");
            false
        }
    }
}

const fn backend_name(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::Openai => "openai",
        BackendKind::Scripted => "scripted",
    }
}
