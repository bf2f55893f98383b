//! Conversation gateway
//!
//! Mediates one question/answer exchange with one persona. The question is
//! recorded and one unit of budget reserved before generation starts; the
//! reservation becomes a decrement only once the answer is recorded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{ConfessionGuardrail, ResponseGenerator};
use crate::error::{BackendError, GameError};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics::{self, QuestionOutcome};
use crate::persona::PersonaId;

use super::phase::Phase;
use super::session::Message;
use super::store::{SessionHandle, emit_transition};

/// Result of a successful exchange.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    /// Persona that answered
    pub persona: PersonaId,
    /// The recorded answer
    pub reply: Message,
    /// Budget left after this exchange
    pub questions_remaining: u32,
    /// Phase after this exchange
    pub phase: Phase,
    /// Whether the guardrail replaced the generated text
    #[serde(skip)]
    pub guarded: bool,
}

/// Runs exchanges against the response generator.
pub struct ConversationGateway {
    responses: Arc<dyn ResponseGenerator>,
    guardrail: Option<Arc<dyn ConfessionGuardrail>>,
    timeout: Duration,
    max_question_len: usize,
    events: Arc<EventEmitter>,
}

impl std::fmt::Debug for ConversationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationGateway")
            .field("guardrail", &self.guardrail.is_some())
            .field("timeout", &self.timeout)
            .field("max_question_len", &self.max_question_len)
            .finish_non_exhaustive()
    }
}

impl ConversationGateway {
    /// Creates a gateway.
    #[must_use]
    pub fn new(
        responses: Arc<dyn ResponseGenerator>,
        guardrail: Option<Arc<dyn ConfessionGuardrail>>,
        timeout: Duration,
        max_question_len: usize,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            responses,
            guardrail,
            timeout,
            max_question_len,
            events,
        }
    }

    /// Rejects empty and oversized questions.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidInput` describing the problem.
    pub fn validate_question(&self, question: &str) -> Result<(), GameError> {
        if question.trim().is_empty() {
            return Err(GameError::InvalidInput("question must not be empty".to_string()));
        }
        let len = question.chars().count();
        if len > self.max_question_len {
            return Err(GameError::InvalidInput(format!(
                "question is {len} characters long (maximum {})",
                self.max_question_len
            )));
        }
        Ok(())
    }

    /// Asks `persona` one question.
    ///
    /// Exchanges with the same persona are serialized; exchanges with
    /// different personas generate concurrently.
    ///
    /// # Errors
    ///
    /// - `GameError::InvalidInput` for an empty or oversized question
    /// - `GameError::Phase` outside `Playing` or when the budget is fully reserved
    /// - `GameError::Generation` when the generator fails or times out
    /// - `GameError::NotFound` when the session is destroyed meanwhile
    pub async fn ask(
        &self,
        handle: &SessionHandle,
        persona: PersonaId,
        question: &str,
    ) -> Result<Exchange, GameError> {
        let id = handle.id();
        let outcome = self.exchange(handle, persona, question).await;
        match &outcome {
            Ok(_) => metrics::record_question(persona, QuestionOutcome::Answered),
            Err(GameError::Generation(_)) => {
                metrics::record_question(persona, QuestionOutcome::Failed);
            }
            Err(e) => {
                debug!(session_id = %id, persona = %persona, error = %e, "question rejected");
                metrics::record_question(persona, QuestionOutcome::Rejected);
            }
        }
        if let Err(e) = &outcome {
            metrics::record_error(e.category());
        }
        outcome
    }

    async fn exchange(
        &self,
        handle: &SessionHandle,
        persona: PersonaId,
        question: &str,
    ) -> Result<Exchange, GameError> {
        self.validate_question(question)?;
        let id = handle.id();
        let cancel = handle.cancel_token();

        let _persona_guard = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(GameError::NotFound(id)),
            guard = handle.lock_persona(persona) => guard,
        };

        let (request, credential) = {
            let mut session = handle.lock_open().await?;
            let request = session.begin_exchange(persona, question.to_string())?;
            (request, session.credential().clone())
        };

        let started = Instant::now();
        let generated = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(GameError::NotFound(id)),
            result = tokio::time::timeout(
                self.timeout,
                self.responses.generate_response(&credential, &request),
            ) => result.unwrap_or(Err(BackendError::Timeout)),
        };
        let elapsed = started.elapsed();

        let text = match generated {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                let err = BackendError::InvalidResponse("empty completion".to_string());
                return Err(self.fail(handle, persona, &err).await);
            }
            Err(e) => return Err(self.fail(handle, persona, &e).await),
        };
        metrics::record_generation_duration(persona, elapsed);

        let (text, guarded) = match &self.guardrail {
            Some(guardrail) => {
                let reviewed = guardrail.review(&text).await;
                if reviewed.replaced {
                    metrics::record_guardrail_replacement();
                    info!(
                        session_id = %id,
                        persona = %persona,
                        score = ?reviewed.score,
                        "answer replaced by confession guardrail"
                    );
                }
                (reviewed.text, reviewed.replaced)
            }
            None => (text, false),
        };

        let mut session = handle.lock_open().await?;
        let (reply, transition) = session.complete_exchange(persona, text);
        let remaining = session.questions_remaining();
        let phase = session.phase();
        drop(session);

        self.events.emit(Event::QuestionAnswered {
            timestamp: Utc::now(),
            session_id: id,
            persona,
            questions_remaining: remaining,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            guarded,
        });
        if let Some(t) = transition {
            emit_transition(&self.events, id, t);
        }
        debug!(session_id = %id, persona = %persona, remaining, "question answered");

        Ok(Exchange {
            persona,
            reply,
            questions_remaining: remaining,
            phase,
            guarded,
        })
    }

    /// Releases the reservation and converts the collaborator failure.
    ///
    /// A destroyed session has no reservation left to release.
    async fn fail(
        &self,
        handle: &SessionHandle,
        persona: PersonaId,
        err: &BackendError,
    ) -> GameError {
        let id = handle.id();
        if let Ok(mut session) = handle.lock_open().await {
            session.abort_exchange();
        }
        warn!(session_id = %id, persona = %persona, error = %err, "response generation failed");
        self.events.emit(Event::GenerationFailed {
            timestamp: Utc::now(),
            session_id: id,
            persona,
            error: err.to_string(),
        });
        GameError::Generation(err.to_string())
    }
}
