//! Session store
//!
//! The single entry point for game operations. Owns every live session,
//! routes operations by session id, and handles destruction and idle expiry.
//!
//! Locking order: persona lock, then session state lock. The state lock is
//! never held across response generation; it is held across remote guess
//! verification so no other transition can interleave with a verdict.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{Collaborators, Credential, Scenario, ScenarioGenerator};
use crate::config::schema::AppConfig;
use crate::error::{BackendError, GameError, PhaseError};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::metrics;
use crate::persona::PersonaId;

use super::gateway::{ConversationGateway, Exchange};
use super::phase::PhaseTransition;
use super::session::{ImpostorToken, Message, Session, SessionConfig, SessionId, SessionSnapshot};
use super::verdict::{Verdict, VerdictResolver};

// ============================================================================
// Settings
// ============================================================================

/// Store-wide parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    /// Parameters applied to every new session
    pub session: SessionConfig,
    /// Deadline for one response generation
    pub generation_timeout: Duration,
    /// Deadline for credential validation plus backstory generation
    pub scenario_timeout: Duration,
    /// Idle sessions older than this are destroyed (`None` keeps them)
    pub session_ttl: Option<Duration>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            generation_timeout: Duration::from_secs(60),
            scenario_timeout: Duration::from_secs(600),
            session_ttl: Some(Duration::from_secs(2 * 60 * 60)),
        }
    }
}

impl StoreSettings {
    /// Derives store settings from the application configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            session: SessionConfig {
                question_budget: config.game.question_budget,
                history_window: config.game.history_window,
                max_question_len: config.game.max_question_len,
            },
            generation_timeout: config.llm.timeout,
            scenario_timeout: config.scenario.timeout,
            session_ttl: config.game.session_ttl,
        }
    }
}

// ============================================================================
// Session Handle
// ============================================================================

/// Shared handle to one live session.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    state: Mutex<Session>,
    persona_locks: [Mutex<()>; 4],
    cancel: CancellationToken,
}

impl SessionHandle {
    fn new(session: Session) -> Self {
        Self {
            id: session.id(),
            state: Mutex::new(session),
            persona_locks: Default::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Token cancelled when the session is destroyed.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Serializes exchanges with one persona.
    pub async fn lock_persona(&self, persona: PersonaId) -> MutexGuard<'_, ()> {
        self.persona_locks[persona.index()].lock().await
    }

    /// Locks the session state, failing if it was destroyed.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound` for a closed session.
    pub async fn lock_open(&self) -> Result<MutexGuard<'_, Session>, GameError> {
        let guard = self.state.lock().await;
        if guard.is_closed() {
            return Err(GameError::NotFound(self.id));
        }
        Ok(guard)
    }
}

// ============================================================================
// Store
// ============================================================================

/// Owner of all live sessions.
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    scenario: Arc<dyn ScenarioGenerator>,
    gateway: Arc<ConversationGateway>,
    resolver: VerdictResolver,
    settings: StoreSettings,
    events: Arc<EventEmitter>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.len())
            .field("settings", &self.settings)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(
        collaborators: Collaborators,
        resolver: VerdictResolver,
        settings: StoreSettings,
        events: Arc<EventEmitter>,
    ) -> Self {
        let gateway = ConversationGateway::new(
            collaborators.responses,
            collaborators.guardrail,
            settings.generation_timeout,
            settings.session.max_question_len,
            Arc::clone(&events),
        );
        Self {
            sessions: DashMap::new(),
            scenario: collaborators.scenario,
            gateway: Arc::new(gateway),
            resolver,
            settings,
            events,
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` when no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Store-wide parameters.
    #[must_use]
    pub const fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Creates a session with a uniformly drawn impostor.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Initialization` if the credential is rejected or
    /// backstory generation fails. No session is retained on failure.
    pub async fn create(&self, credential: Credential) -> Result<SessionSnapshot, GameError> {
        let impostor = ImpostorToken::draw(&mut rand::rng());
        self.create_with_impostor(credential, impostor).await
    }

    /// Creates a session with a fixed impostor (scripted games and tests).
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn create_with_impostor(
        &self,
        credential: Credential,
        impostor: ImpostorToken,
    ) -> Result<SessionSnapshot, GameError> {
        let prepared = tokio::time::timeout(
            self.settings.scenario_timeout,
            self.prepare_scenario(&credential, &impostor),
        )
        .await
        .unwrap_or(Err(BackendError::Timeout));

        let scenario = prepared.map_err(|e| {
            warn!(error = %e, "session initialization failed");
            metrics::record_error("initialization");
            match e {
                BackendError::Unauthorized => {
                    GameError::Initialization("invalid API key".to_string())
                }
                other => GameError::Initialization(other.to_string()),
            }
        })?;

        let id = SessionId::new();
        let session = Session::new(id, impostor, scenario, credential, self.settings.session);
        let snapshot = session.snapshot();
        self.sessions.insert(id, Arc::new(SessionHandle::new(session)));

        metrics::record_session_created();
        metrics::set_sessions_active(self.sessions.len());
        self.events.emit(Event::SessionCreated {
            timestamp: Utc::now(),
            session_id: id,
            question_budget: self.settings.session.question_budget,
        });
        info!(session_id = %id, budget = self.settings.session.question_budget, "session created");
        Ok(snapshot)
    }

    async fn prepare_scenario(
        &self,
        credential: &Credential,
        impostor: &ImpostorToken,
    ) -> Result<Scenario, BackendError> {
        self.scenario.validate_credential(credential).await?;
        self.scenario
            .generate_scenario(credential, impostor.reveal())
            .await
    }

    /// Destroys a session. Unknown ids are a no-op.
    ///
    /// Returns whether a live session was removed.
    pub async fn destroy(&self, id: SessionId) -> bool {
        self.destroy_with_reason(id, "deleted").await
    }

    async fn destroy_with_reason(&self, id: SessionId, reason: &'static str) -> bool {
        let Some((_, handle)) = self.sessions.remove(&id) else {
            debug!(session_id = %id, "destroy of unknown session ignored");
            return false;
        };
        handle.cancel.cancel();
        handle.state.lock().await.close();

        metrics::record_session_destroyed(reason);
        metrics::set_sessions_active(self.sessions.len());
        self.events.emit(Event::SessionDestroyed {
            timestamp: Utc::now(),
            session_id: id,
            reason: reason.to_string(),
        });
        info!(session_id = %id, reason, "session destroyed");
        true
    }

    /// Asks `persona` one question.
    ///
    /// The exchange runs on its own task, so a caller that goes away cannot
    /// strand a budget reservation.
    ///
    /// # Errors
    ///
    /// See [`ConversationGateway::ask`].
    pub async fn ask(
        &self,
        id: SessionId,
        persona: PersonaId,
        question: &str,
    ) -> Result<Exchange, GameError> {
        let handle = self.handle(id)?;
        let gateway = Arc::clone(&self.gateway);
        let question = question.to_string();
        tokio::spawn(async move { gateway.ask(&handle, persona, &question).await })
            .await
            .map_err(|e| GameError::Generation(format!("exchange task failed: {e}")))?
    }

    /// Explicit early accusation.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound` or `GameError::Phase`.
    pub async fn accuse(&self, id: SessionId) -> Result<SessionSnapshot, GameError> {
        self.transition(id, Session::accuse).await
    }

    /// Returns from `Accusing` to `Playing` (once per session).
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound` or `GameError::Phase`.
    pub async fn back(&self, id: SessionId) -> Result<SessionSnapshot, GameError> {
        self.transition(id, Session::back).await
    }

    async fn transition(
        &self,
        id: SessionId,
        apply: fn(&mut Session) -> Result<PhaseTransition, PhaseError>,
    ) -> Result<SessionSnapshot, GameError> {
        let handle = self.handle(id)?;
        let mut session = handle.lock_open().await?;
        let t = apply(&mut session).inspect_err(|_| metrics::record_error("phase"))?;
        let snapshot = session.snapshot();
        drop(session);
        emit_transition(&self.events, id, t);
        Ok(snapshot)
    }

    /// Submits the player's guess and resolves the session.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound`, `GameError::Phase` outside `Accusing`,
    /// or `GameError::Verification` (session stays in `Accusing`).
    pub async fn submit_guess(&self, id: SessionId, guess: PersonaId) -> Result<Verdict, GameError> {
        let handle = self.handle(id)?;
        let mut session = handle.lock_open().await?;
        let verdict = self
            .resolver
            .resolve(&session, guess)
            .await
            .inspect_err(|e| metrics::record_error(e.category()))?;
        let t = session.record_verdict(verdict.clone())?;
        drop(session);

        emit_transition(&self.events, id, t);
        metrics::record_verdict(verdict.correct);
        self.events.emit(Event::VerdictIssued {
            timestamp: Utc::now(),
            session_id: id,
            guess,
            impostor: verdict.revealed_impostor,
            correct: verdict.correct,
        });
        info!(session_id = %id, correct = verdict.correct, "guess resolved");
        Ok(verdict)
    }

    /// Re-delivers the verdict of a resolved session.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound`, or `GameError::Phase` before resolution.
    pub async fn verdict(&self, id: SessionId) -> Result<Verdict, GameError> {
        let handle = self.handle(id)?;
        let session = handle.lock_open().await?;
        Ok(session.verdict()?.clone())
    }

    /// Public state of a session.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound`.
    pub async fn snapshot(&self, id: SessionId) -> Result<SessionSnapshot, GameError> {
        let handle = self.handle(id)?;
        let session = handle.lock_open().await?;
        Ok(session.snapshot())
    }

    /// Conversation log with one persona.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound`.
    pub async fn history(&self, id: SessionId, persona: PersonaId) -> Result<Vec<Message>, GameError> {
        let handle = self.handle(id)?;
        let session = handle.lock_open().await?;
        Ok(session.history(persona).to_vec())
    }

    /// Destroys every session idle for longer than `ttl`.
    ///
    /// Sessions whose state is currently locked are busy and skipped.
    pub async fn reap_idle(&self, ttl: Duration) -> usize {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                entry
                    .value()
                    .state
                    .try_lock()
                    .is_ok_and(|s| s.idle_for() > ttl)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut reaped = 0;
        for id in expired {
            if self.destroy_with_reason(id, "expired").await {
                reaped += 1;
            }
        }
        reaped
    }

    /// Spawns the idle-session reaper. Does nothing without a TTL.
    #[must_use]
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        let ttl = self.settings.session_ttl?;
        let store = Arc::clone(self);
        let period = (ttl / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let reaped = store.reap_idle(ttl).await;
                        if reaped > 0 {
                            info!(reaped, "expired idle sessions");
                        }
                    }
                }
            }
            debug!("session reaper stopped");
        }))
    }

    fn handle(&self, id: SessionId) -> Result<Arc<SessionHandle>, GameError> {
        self.sessions
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(GameError::NotFound(id))
    }
}

/// Logs, counts and emits a phase transition.
pub(crate) fn emit_transition(events: &EventEmitter, id: SessionId, t: PhaseTransition) {
    metrics::record_phase_transition(t.from, t.to);
    events.emit(Event::PhaseChanged {
        timestamp: Utc::now(),
        session_id: id,
        from: t.from,
        to: t.to,
        reason: t.reason,
    });
    info!(session_id = %id, from = %t.from, to = %t.to, reason = %t.reason, "phase changed");
}
