//! CLI command dispatch and handlers
//!
//! Routes parsed CLI arguments to the appropriate command handler.

pub mod play;
pub mod serve;
pub mod validate;
pub mod version;

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::{BackendKind, Collaborators};
use crate::cli::args::{Cli, Commands, ConfigArgs};
use crate::config::loader::ConfigLoader;
use crate::config::schema::AppConfig;
use crate::error::ImpostorError;
use crate::game::store::{SessionStore, StoreSettings};
use crate::game::verdict::VerdictResolver;
use crate::observability::events::EventEmitter;

/// Dispatch a parsed CLI invocation to the appropriate command handler.
///
/// # Errors
///
/// Returns an error if the dispatched command handler fails.
pub async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<(), ImpostorError> {
    match cli.command {
        Commands::Serve(args) => serve::run(&args, cancel).await,
        Commands::Play(args) => play::run(&args, cancel).await,
        Commands::Validate(args) => validate::run(&args),
        Commands::Version(args) => {
            version::run(&args);
            Ok(())
        }
    }
}

/// Loads the configuration named by `args` with every override applied.
///
/// `extra` applies command-specific overrides after the shared ones.
pub(crate) fn load_config(
    args: &ConfigArgs,
    extra: impl FnOnce(&mut AppConfig),
) -> Result<Arc<AppConfig>, ImpostorError> {
    if let Some(path) = &args.config {
        tracing::info!(config = %path.display(), "loading configuration");
    }
    let result = ConfigLoader::with_defaults().load_overridden(args.config.as_deref(), |config| {
        args.apply(config);
        extra(config);
    })?;

    for warning in &result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }
    Ok(result.config)
}

/// Opens the event sink: `path` when given, otherwise `fallback`.
pub(crate) fn open_events(
    path: Option<&Path>,
    fallback: fn() -> EventEmitter,
) -> Result<Arc<EventEmitter>, ImpostorError> {
    let emitter = match path {
        Some(path) => EventEmitter::from_file(path)?,
        None => fallback(),
    };
    Ok(Arc::new(emitter))
}

/// Wires collaborators, resolver and settings into a session store.
pub(crate) fn build_store(
    config: &AppConfig,
    backend: BackendKind,
    events: Arc<EventEmitter>,
) -> Arc<SessionStore> {
    let collaborators = Collaborators::from_config(config, backend);
    let resolver = VerdictResolver::new(
        collaborators.verifier.clone(),
        config.verification.trust_model,
        config.verification.timeout,
    );
    Arc::new(SessionStore::new(
        collaborators,
        resolver,
        StoreSettings::from_config(config),
        events,
    ))
}
