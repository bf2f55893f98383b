//! Session aggregate
//!
//! One session owns the concealed impostor assignment, the shared question
//! budget, the phase controller and one append-only conversation log per
//! persona. All methods here are synchronous; the store serializes access
//! through a per-session async mutex.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

use crate::backend::{Credential, ResponseRequest, Scenario};
use crate::error::PhaseError;
use crate::persona::PersonaId;

use super::phase::{Phase, PhaseController, PhaseTransition};
use super::verdict::Verdict;

/// Default shared question budget.
pub const DEFAULT_QUESTION_BUDGET: u32 = 30;

/// Default number of log entries handed to the response generator.
pub const DEFAULT_HISTORY_WINDOW: usize = 10;

/// Default maximum question length in characters.
pub const DEFAULT_MAX_QUESTION_LEN: usize = 2000;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Allocates a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Capability holding the impostor identity.
///
/// Deliberately not `Serialize`, and its `Debug` output is concealed. The
/// identity leaves the session only through [`Verdict`] or the response
/// request builder.
#[derive(Clone, PartialEq, Eq)]
pub struct ImpostorToken(PersonaId);

impl ImpostorToken {
    /// Draws the impostor uniformly at random from the registry.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(PersonaId::random(rng))
    }

    /// Assigns a fixed impostor (scripted games and tests).
    #[must_use]
    pub const fn assigned(persona: PersonaId) -> Self {
        Self(persona)
    }

    /// Returns whether `persona` is the impostor.
    #[must_use]
    pub fn matches(&self, persona: PersonaId) -> bool {
        self.0 == persona
    }

    pub(crate) const fn reveal(&self) -> PersonaId {
        self.0
    }
}

impl fmt::Debug for ImpostorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImpostorToken(<concealed>)")
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Author of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human player
    User,
    /// The persona
    Assistant,
}

/// One immutable conversation log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author
    pub role: Role,
    /// Text
    pub content: String,
    /// When the entry was appended
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// A player question stamped now.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// A persona answer stamped now.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Per-session parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Shared question budget
    pub question_budget: u32,
    /// Log entries passed to the generator
    pub history_window: usize,
    /// Longest accepted question, in characters
    pub max_question_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            question_budget: DEFAULT_QUESTION_BUDGET,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_question_len: DEFAULT_MAX_QUESTION_LEN,
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// The session aggregate.
pub struct Session {
    id: SessionId,
    impostor: ImpostorToken,
    config: SessionConfig,
    questions_remaining: u32,
    in_flight: u32,
    phase: PhaseController,
    conversations: BTreeMap<PersonaId, Vec<Message>>,
    scenario: Arc<Scenario>,
    credential: Credential,
    verdict: Option<Verdict>,
    last_activity: Instant,
    closed: bool,
}

impl Session {
    /// Creates a session with one empty log per persona.
    ///
    /// A zero budget starts the session directly in `Accusing`.
    #[must_use]
    pub fn new(
        id: SessionId,
        impostor: ImpostorToken,
        scenario: Scenario,
        credential: Credential,
        config: SessionConfig,
    ) -> Self {
        let mut phase = PhaseController::new();
        if config.question_budget == 0 {
            phase.exhaust_budget();
        }
        Self {
            id,
            impostor,
            config,
            questions_remaining: config.question_budget,
            in_flight: 0,
            phase,
            conversations: PersonaId::ALL.into_iter().map(|p| (p, Vec::new())).collect(),
            scenario: Arc::new(scenario),
            credential,
            verdict: None,
            last_activity: Instant::now(),
            closed: false,
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase.phase()
    }

    /// Questions left in the shared budget.
    #[must_use]
    pub const fn questions_remaining(&self) -> u32 {
        self.questions_remaining
    }

    /// Exchanges admitted but not yet answered.
    #[must_use]
    pub const fn in_flight(&self) -> u32 {
        self.in_flight
    }

    /// Ordered log for one persona.
    #[must_use]
    pub fn history(&self, persona: PersonaId) -> &[Message] {
        self.conversations
            .get(&persona)
            .map_or(&[], Vec::as_slice)
    }

    /// Credential the session was created with.
    #[must_use]
    pub const fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Session parameters.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) const fn impostor(&self) -> &ImpostorToken {
        &self.impostor
    }

    /// Whether the session was destroyed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Time since the last successful operation.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Admits one exchange with `persona`.
    ///
    /// Records the question, reserves one unit of budget and returns the
    /// request for the response generator. The reservation is settled by
    /// [`complete_exchange`](Self::complete_exchange) or released by
    /// [`abort_exchange`](Self::abort_exchange).
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAllowed` outside `Playing` and
    /// `PhaseError::BudgetExhausted` when every remaining unit is reserved.
    pub fn begin_exchange(
        &mut self,
        persona: PersonaId,
        question: String,
    ) -> Result<ResponseRequest, PhaseError> {
        self.phase.require(Phase::Playing, "ask")?;
        if self.questions_remaining.saturating_sub(self.in_flight) == 0 {
            return Err(PhaseError::BudgetExhausted);
        }

        let window = self.config.history_window;
        let log = self.conversations.entry(persona).or_default();
        let history = log[log.len().saturating_sub(window)..].to_vec();
        log.push(Message::user(question.clone()));

        self.in_flight += 1;
        self.last_activity = Instant::now();

        Ok(ResponseRequest {
            persona,
            is_impostor: self.impostor.matches(persona),
            scenario: Arc::clone(&self.scenario),
            history,
            question,
        })
    }

    /// Settles a reservation with the persona's answer.
    ///
    /// Appends the answer, consumes exactly one unit of budget and moves to
    /// `Accusing` when the budget reaches zero.
    pub fn complete_exchange(
        &mut self,
        persona: PersonaId,
        answer: String,
    ) -> (Message, Option<PhaseTransition>) {
        let reply = Message::assistant(answer);
        self.conversations
            .entry(persona)
            .or_default()
            .push(reply.clone());

        self.in_flight = self.in_flight.saturating_sub(1);
        self.questions_remaining = self.questions_remaining.saturating_sub(1);
        self.last_activity = Instant::now();

        let transition = if self.questions_remaining == 0 {
            self.phase.exhaust_budget()
        } else {
            None
        };
        (reply, transition)
    }

    /// Releases a reservation after a failed exchange.
    ///
    /// The question stays in the log; the budget is untouched.
    pub const fn abort_exchange(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Explicit `Playing -> Accusing`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::ExchangeInFlight` while answers are pending, or
    /// `PhaseError::NotAllowed` outside `Playing`.
    pub fn accuse(&mut self) -> Result<PhaseTransition, PhaseError> {
        self.phase.require(Phase::Playing, "accuse")?;
        if self.in_flight > 0 {
            return Err(PhaseError::ExchangeInFlight(self.in_flight));
        }
        let t = self.phase.accuse()?;
        self.last_activity = Instant::now();
        Ok(t)
    }

    /// `Accusing -> Playing`, once per session, only with budget left.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::BudgetExhausted` when there is nothing left to ask,
    /// or the controller's error.
    pub fn back(&mut self) -> Result<PhaseTransition, PhaseError> {
        self.phase.require(Phase::Accusing, "back")?;
        if self.questions_remaining == 0 {
            return Err(PhaseError::BudgetExhausted);
        }
        let t = self.phase.back()?;
        self.last_activity = Instant::now();
        Ok(t)
    }

    /// Checks that a guess may be submitted now.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAllowed` outside `Accusing`.
    pub fn ensure_guessable(&self) -> Result<(), PhaseError> {
        self.phase.require(Phase::Accusing, "guess")
    }

    /// Stores the verdict and enters `Resolved`.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAllowed` outside `Accusing`.
    pub fn record_verdict(&mut self, verdict: Verdict) -> Result<PhaseTransition, PhaseError> {
        let t = self.phase.resolve()?;
        self.verdict = Some(verdict);
        self.last_activity = Instant::now();
        Ok(t)
    }

    /// The stored verdict of a resolved session.
    ///
    /// # Errors
    ///
    /// Returns `PhaseError::NotAllowed` before resolution.
    pub fn verdict(&self) -> Result<&Verdict, PhaseError> {
        self.verdict.as_ref().ok_or(PhaseError::NotAllowed {
            operation: "verdict",
            phase: self.phase.phase(),
        })
    }

    /// Releases the logs and marks the session dead.
    pub fn close(&mut self) {
        self.closed = true;
        self.conversations.clear();
    }

    /// Public view of the session; never contains the identity before resolution.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            phase: self.phase.phase(),
            question_budget: self.config.question_budget,
            questions_remaining: self.questions_remaining,
            back_available: self.phase.back_available() && self.questions_remaining > 0,
            personas: PersonaId::ALL.to_vec(),
            message_counts: self
                .conversations
                .iter()
                .map(|(p, log)| (*p, log.len()))
                .collect(),
            event_count: self.scenario.event_count(),
            verdict: self.verdict.clone(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("phase", &self.phase.phase())
            .field("questions_remaining", &self.questions_remaining)
            .field("in_flight", &self.in_flight)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Client-observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier
    pub session_id: SessionId,
    /// Current phase
    pub phase: Phase,
    /// Budget the session started with
    pub question_budget: u32,
    /// Questions left
    pub questions_remaining: u32,
    /// Whether `back` would currently be accepted from `Accusing`
    pub back_available: bool,
    /// Registered personas in display order
    pub personas: Vec<PersonaId>,
    /// Log length per persona
    pub message_counts: BTreeMap<PersonaId, usize>,
    /// Number of events in the generated backstory
    pub event_count: usize,
    /// Present only once resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::scripted::ScriptedBackend;

    fn session(budget: u32, impostor: PersonaId) -> Session {
        Session::new(
            SessionId::new(),
            ImpostorToken::assigned(impostor),
            ScriptedBackend::scenario_for(impostor),
            Credential::default(),
            SessionConfig {
                question_budget: budget,
                ..SessionConfig::default()
            },
        )
    }

    #[test]
    fn new_session_has_empty_log_per_persona() {
        let s = session(30, PersonaId::Red);
        assert_eq!(s.phase(), Phase::Playing);
        assert_eq!(s.questions_remaining(), 30);
        for p in PersonaId::ALL {
            assert!(s.history(p).is_empty());
        }
    }

    #[test]
    fn zero_budget_starts_accusing() {
        let s = session(0, PersonaId::Red);
        assert_eq!(s.phase(), Phase::Accusing);
        assert!(!s.snapshot().back_available);
    }

    #[test]
    fn successful_exchange_decrements_once() {
        let mut s = session(3, PersonaId::Blue);
        let req = s.begin_exchange(PersonaId::Red, "where were you?".into()).unwrap();
        assert!(!req.is_impostor);
        assert_eq!(s.in_flight(), 1);
        assert_eq!(s.questions_remaining(), 3);

        let (reply, t) = s.complete_exchange(PersonaId::Red, "Cafeteria".into());
        assert_eq!(reply.role, Role::Assistant);
        assert!(t.is_none());
        assert_eq!(s.questions_remaining(), 2);
        assert_eq!(s.in_flight(), 0);
        assert_eq!(s.history(PersonaId::Red).len(), 2);
    }

    #[test]
    fn aborted_exchange_keeps_question_and_budget() {
        let mut s = session(2, PersonaId::Blue);
        s.begin_exchange(PersonaId::Yellow, "hello?".into()).unwrap();
        s.abort_exchange();

        assert_eq!(s.questions_remaining(), 2);
        assert_eq!(s.in_flight(), 0);
        let log = s.history(PersonaId::Yellow);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].role, Role::User);
    }

    #[test]
    fn reservation_blocks_overcommit() {
        let mut s = session(1, PersonaId::Blue);
        s.begin_exchange(PersonaId::Red, "a".into()).unwrap();
        assert_eq!(
            s.begin_exchange(PersonaId::Green, "b".into()).unwrap_err(),
            PhaseError::BudgetExhausted
        );
    }

    #[test]
    fn last_unit_moves_to_accusing() {
        let mut s = session(1, PersonaId::Blue);
        s.begin_exchange(PersonaId::Red, "a".into()).unwrap();
        let (_, t) = s.complete_exchange(PersonaId::Red, "b".into());
        assert_eq!(t.unwrap().to, Phase::Accusing);
        assert_eq!(s.questions_remaining(), 0);

        assert!(matches!(
            s.begin_exchange(PersonaId::Red, "c".into()).unwrap_err(),
            PhaseError::NotAllowed { operation: "ask", phase: Phase::Accusing }
        ));
    }

    #[test]
    fn history_window_limits_request() {
        let mut s = Session::new(
            SessionId::new(),
            ImpostorToken::assigned(PersonaId::Red),
            ScriptedBackend::scenario_for(PersonaId::Red),
            Credential::default(),
            SessionConfig {
                question_budget: 10,
                history_window: 2,
                ..SessionConfig::default()
            },
        );
        for i in 0..3 {
            s.begin_exchange(PersonaId::Red, format!("q{i}")).unwrap();
            s.complete_exchange(PersonaId::Red, format!("a{i}"));
        }
        let req = s.begin_exchange(PersonaId::Red, "q3".into()).unwrap();
        assert!(req.is_impostor);
        assert_eq!(req.history.len(), 2);
        assert_eq!(req.history[0].content, "q2");
        assert_eq!(req.history[1].content, "a2");
    }

    #[test]
    fn accuse_rejected_while_in_flight() {
        let mut s = session(5, PersonaId::Red);
        s.begin_exchange(PersonaId::Red, "q".into()).unwrap();
        assert_eq!(s.accuse().unwrap_err(), PhaseError::ExchangeInFlight(1));
        s.abort_exchange();
        assert!(s.accuse().is_ok());
    }

    #[test]
    fn back_preserves_budget_and_logs() {
        let mut s = session(5, PersonaId::Red);
        s.begin_exchange(PersonaId::Red, "q".into()).unwrap();
        s.complete_exchange(PersonaId::Red, "a".into());
        s.accuse().unwrap();
        s.back().unwrap();
        assert_eq!(s.phase(), Phase::Playing);
        assert_eq!(s.questions_remaining(), 4);
        assert_eq!(s.history(PersonaId::Red).len(), 2);
    }

    #[test]
    fn back_rejected_without_budget() {
        let mut s = session(1, PersonaId::Red);
        s.begin_exchange(PersonaId::Red, "q".into()).unwrap();
        s.complete_exchange(PersonaId::Red, "a".into());
        assert_eq!(s.back().unwrap_err(), PhaseError::BudgetExhausted);
    }

    #[test]
    fn verdict_unavailable_before_resolution() {
        let s = session(1, PersonaId::Red);
        assert!(s.verdict().is_err());
    }

    #[test]
    fn snapshot_hides_identity_before_resolution() {
        let s = session(3, PersonaId::Green);
        let json = serde_json::to_value(s.snapshot()).unwrap();
        assert!(json.get("verdict").is_none());
        assert_eq!(json["phase"], "playing");
        assert_eq!(json["message_counts"]["green"], 0);
    }

    #[test]
    fn token_debug_is_concealed() {
        let t = ImpostorToken::assigned(PersonaId::Blue);
        assert_eq!(format!("{t:?}"), "ImpostorToken(<concealed>)");
        assert!(t.matches(PersonaId::Blue));
        assert!(!t.matches(PersonaId::Red));
    }

    #[test]
    fn session_id_parses_display() {
        let id = SessionId::new();
        assert_eq!(id.to_string().parse::<SessionId>().unwrap(), id);
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn close_clears_logs() {
        let mut s = session(3, PersonaId::Green);
        s.begin_exchange(PersonaId::Red, "q".into()).unwrap();
        s.close();
        assert!(s.is_closed());
        assert!(s.history(PersonaId::Red).is_empty());
    }
}
