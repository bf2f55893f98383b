//! Shared integration-test helpers: in-process stores backed by the
//! scripted backend, and spawning the `impostor` binary.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use impostor::backend::{Collaborators, ScriptedBackend};
use impostor::game::session::SessionConfig;
use impostor::game::store::{SessionStore, StoreSettings};
use impostor::game::verdict::VerdictResolver;
use impostor::observability::EventEmitter;

/// Builds a store over `backend` with the given question budget.
pub fn scripted_store(backend: Arc<ScriptedBackend>, budget: u32) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(
        Collaborators::scripted(backend),
        VerdictResolver::local_only(),
        StoreSettings {
            session: SessionConfig {
                question_budget: budget,
                ..SessionConfig::default()
            },
            generation_timeout: Duration::from_secs(2),
            ..StoreSettings::default()
        },
        Arc::new(EventEmitter::noop()),
    ))
}

/// Path of a file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Base command for the binary with environment overrides cleared.
pub fn impostor() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_impostor"));
    for var in [
        "IMPOSTOR_CONFIG",
        "IMPOSTOR_BACKEND",
        "IMPOSTOR_QUESTION_BUDGET",
        "IMPOSTOR_API_KEY",
        "IMPOSTOR_BIND",
        "IMPOSTOR_LOG_LEVEL",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Runs the binary to completion with no stdin.
#[allow(clippy::missing_panics_doc)]
pub fn run_command(args: &[&str]) -> Output {
    impostor()
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run impostor")
}

/// Runs the binary to completion feeding `input` on stdin.
#[allow(clippy::missing_panics_doc)]
pub fn run_with_stdin(args: &[&str], input: &str) -> Output {
    let mut child = impostor()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn impostor");
    child
        .stdin
        .take()
        .expect("stdin not captured")
        .write_all(input.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait for impostor")
}
