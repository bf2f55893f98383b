//! Structured event stream for `impostor`.
//!
//! Discrete, typed events emitted during server operation. Events are
//! serialized as newline-delimited JSON (JSONL) and include a monotonically
//! increasing sequence number for ordering guarantees.
//!
//! Only [`Event::VerdictIssued`] carries the impostor identity.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::game::phase::{Phase, TransitionReason};
use crate::game::session::SessionId;
use crate::persona::PersonaId;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during `impostor` operation.
///
/// Each variant is tagged with `"type"` when serialized to JSON so consumers
/// can dispatch on the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The server is listening.
    ServerStarted {
        /// When the server started.
        timestamp: DateTime<Utc>,
        /// Bound address.
        bind: String,
        /// Collaborator family (`"openai"`, `"scripted"`).
        backend: String,
    },

    /// The server has stopped.
    ServerStopped {
        /// When the server stopped.
        timestamp: DateTime<Utc>,
        /// Human-readable stop reason.
        reason: String,
    },

    /// A session was created.
    SessionCreated {
        /// When the session was created.
        timestamp: DateTime<Utc>,
        /// New session.
        session_id: SessionId,
        /// Starting budget.
        question_budget: u32,
    },

    /// A persona answered a question.
    QuestionAnswered {
        /// When the answer was recorded.
        timestamp: DateTime<Utc>,
        /// Session.
        session_id: SessionId,
        /// Persona that answered.
        persona: PersonaId,
        /// Budget left after this exchange.
        questions_remaining: u32,
        /// Generation time in milliseconds.
        duration_ms: u64,
        /// Whether the guardrail replaced the answer.
        guarded: bool,
    },

    /// Response generation failed; no budget was consumed.
    GenerationFailed {
        /// When the failure was observed.
        timestamp: DateTime<Utc>,
        /// Session.
        session_id: SessionId,
        /// Persona that was asked.
        persona: PersonaId,
        /// Failure description.
        error: String,
    },

    /// A session changed phase.
    PhaseChanged {
        /// When the transition occurred.
        timestamp: DateTime<Utc>,
        /// Session.
        session_id: SessionId,
        /// Previous phase.
        from: Phase,
        /// New phase.
        to: Phase,
        /// Trigger.
        reason: TransitionReason,
    },

    /// A guess was resolved.
    VerdictIssued {
        /// When the verdict was issued.
        timestamp: DateTime<Utc>,
        /// Session.
        session_id: SessionId,
        /// Submitted guess.
        guess: PersonaId,
        /// Revealed impostor.
        impostor: PersonaId,
        /// Whether the guess was right.
        correct: bool,
    },

    /// A session was destroyed.
    SessionDestroyed {
        /// When the session was removed.
        timestamp: DateTime<Utc>,
        /// Session.
        session_id: SessionId,
        /// `"deleted"` or `"expired"`.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    /// Zero-based, monotonically increasing sequence counter.
    sequence: u64,
    /// The wrapped event (flattened into the same JSON object).
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) atomically increments the sequence
/// counter, serializes the event as a single JSON line, and flushes the
/// underlying writer. Serialization or I/O failures are dropped.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that silently discards all events.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    /// In-memory writer for capturing emitter output in tests.
    #[derive(Clone)]
    pub(crate) struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        pub(crate) fn new() -> Self {
            Self(Arc::new(StdMutex::new(Vec::new())))
        }

        pub(crate) fn contents(&self) -> String {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        }

        pub(crate) fn lines(&self) -> Vec<serde_json::Value> {
            self.contents()
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sample_event() -> Event {
        Event::ServerStarted {
            timestamp: DateTime::parse_from_rfc3339("2026-02-04T10:15:30Z")
                .unwrap()
                .with_timezone(&Utc),
            bind: "127.0.0.1:8000".to_owned(),
            backend: "scripted".to_owned(),
        }
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_string(&sample_event()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "ServerStarted");
        assert_eq!(parsed["backend"], "scripted");
    }

    #[test]
    fn emitter_increments_sequence() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(sample_event());
        emitter.emit(Event::ServerStopped {
            timestamp: Utc::now(),
            reason: "done".to_owned(),
        });

        assert_eq!(emitter.event_count(), 2);
        let lines = tw.lines();
        assert_eq!(lines[0]["sequence"], 0);
        assert_eq!(lines[1]["sequence"], 1);
        assert!(lines[0].get("event").is_none());
    }

    #[test]
    fn only_verdict_event_names_impostor() {
        let now = Utc::now();
        let id = SessionId::new();
        let variants = vec![
            Event::SessionCreated {
                timestamp: now,
                session_id: id,
                question_budget: 30,
            },
            Event::QuestionAnswered {
                timestamp: now,
                session_id: id,
                persona: PersonaId::Red,
                questions_remaining: 29,
                duration_ms: 12,
                guarded: false,
            },
            Event::GenerationFailed {
                timestamp: now,
                session_id: id,
                persona: PersonaId::Red,
                error: "timeout".to_owned(),
            },
            Event::PhaseChanged {
                timestamp: now,
                session_id: id,
                from: Phase::Playing,
                to: Phase::Accusing,
                reason: TransitionReason::BudgetExhausted,
            },
            Event::SessionDestroyed {
                timestamp: now,
                session_id: id,
                reason: "deleted".to_owned(),
            },
        ];
        for v in &variants {
            let json = serde_json::to_value(v).unwrap();
            assert!(json.get("type").is_some());
            assert!(json.get("impostor").is_none(), "leaked: {json}");
        }

        let verdict = serde_json::to_value(Event::VerdictIssued {
            timestamp: now,
            session_id: id,
            guess: PersonaId::Blue,
            impostor: PersonaId::Green,
            correct: false,
        })
        .unwrap();
        assert_eq!(verdict["impostor"], "green");
    }
}
