//! `impostor` - Social-deduction game server with LLM personas

use clap::Parser;
use tokio_util::sync::CancellationToken;

use impostor::cli::args::Cli;
use impostor::cli::commands;
use impostor::error::{ConfigError, ExitCode, ImpostorError};
use impostor::observability::LogSettings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !cli.quiet {
        LogSettings::new(cli.log_format, cli.verbose, cli.color).init();
    }

    let cancel = CancellationToken::new();

    // First signal requests graceful shutdown, the second exits immediately.
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to register SIGTERM handler");
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }

        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        signal_cancel.cancel();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => std::process::exit(ExitCode::INTERRUPTED),
            _ = sigterm.recv() => std::process::exit(ExitCode::TERMINATED),
        }
    });

    let result = commands::dispatch(cli, cancel).await;

    match result {
        Ok(()) => std::process::exit(ExitCode::SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            if let ImpostorError::Config(ConfigError::ValidationError { errors, .. }) = &e {
                for issue in errors {
                    eprintln!("  {issue}");
                }
            }
            std::process::exit(e.exit_code());
        }
    }
}
