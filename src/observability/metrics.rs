//! Metrics collection for `impostor`.
//!
//! Prometheus-compatible metrics. Every label value comes from a closed set
//! (personas, phases, outcomes, error categories), so cardinality is bounded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::ImpostorError;
use crate::game::phase::Phase;
use crate::persona::PersonaId;

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Outcome label for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionOutcome {
    /// Answer recorded, budget consumed
    Answered,
    /// Generation failed or timed out
    Failed,
    /// Rejected before generation (phase, budget, input)
    Rejected,
}

impl QuestionOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Answered => "answered",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

/// Initializes the global metrics recorder.
///
/// When `port` is `Some`, a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`. When `None`, the recorder is installed without an
/// HTTP endpoint.
///
/// # Errors
///
/// Returns `ImpostorError::Io` if the recorder or HTTP listener cannot be
/// installed (e.g. port already in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), ImpostorError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| ImpostorError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!(
        "impostor_sessions_created_total",
        "Total number of sessions created"
    );
    describe_counter!(
        "impostor_sessions_destroyed_total",
        "Total number of sessions destroyed, by reason"
    );
    describe_gauge!("impostor_sessions_active", "Sessions currently held in memory");
    describe_counter!(
        "impostor_questions_total",
        "Questions asked, by persona and outcome"
    );
    describe_histogram!(
        "impostor_generation_duration_ms",
        "Response generation duration in milliseconds"
    );
    describe_counter!(
        "impostor_guardrail_replacements_total",
        "Answers replaced by the confession guardrail"
    );
    describe_counter!(
        "impostor_phase_transitions_total",
        "Total number of phase transitions"
    );
    describe_counter!("impostor_verdicts_total", "Verdicts issued, by correctness");
    describe_counter!(
        "impostor_verifier_fallbacks_total",
        "Verdicts computed locally because the remote verifier was unreachable"
    );
    describe_counter!("impostor_errors_total", "Total number of errors by category");
}

/// Records a created session.
pub fn record_session_created() {
    counter!("impostor_sessions_created_total").increment(1);
}

/// Records a destroyed session.
pub fn record_session_destroyed(reason: &'static str) {
    counter!("impostor_sessions_destroyed_total", "reason" => reason).increment(1);
}

/// Sets the number of live sessions.
#[allow(clippy::cast_precision_loss)]
pub fn set_sessions_active(count: usize) {
    gauge!("impostor_sessions_active").set(count as f64);
}

/// Records one question with its outcome.
pub fn record_question(persona: PersonaId, outcome: QuestionOutcome) {
    counter!(
        "impostor_questions_total",
        "persona" => persona.color(),
        "outcome" => outcome.as_str(),
    )
    .increment(1);
}

/// Records response generation duration.
pub fn record_generation_duration(persona: PersonaId, duration: Duration) {
    histogram!("impostor_generation_duration_ms", "persona" => persona.color())
        .record(duration.as_secs_f64() * 1000.0);
}

/// Records a guardrail replacement.
pub fn record_guardrail_replacement() {
    counter!("impostor_guardrail_replacements_total").increment(1);
}

/// Records a phase transition.
pub fn record_phase_transition(from: Phase, to: Phase) {
    counter!(
        "impostor_phase_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

/// Records an issued verdict.
pub fn record_verdict(correct: bool) {
    let label = if correct { "correct" } else { "incorrect" };
    counter!("impostor_verdicts_total", "result" => label).increment(1);
}

/// Records a local fallback after a failed remote verification.
pub fn record_verifier_fallback() {
    counter!("impostor_verifier_fallbacks_total").increment(1);
}

/// Records an error by category.
pub fn record_error(category: &'static str) {
    counter!("impostor_errors_total", "category" => category).increment(1);
}
