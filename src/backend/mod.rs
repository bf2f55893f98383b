//! External collaborators
//!
//! Traits for the services the orchestration core depends on but does not
//! implement: scenario (backstory) generation, persona response generation,
//! confession screening and remote guess verification. Two families of
//! implementations are provided:
//!
//! - [`openai`], [`scenario`], [`guardrail`], [`verifier`]: HTTP clients for an
//!   OpenAI-compatible completion API, an Ollama-compatible scorer and a peer
//!   verification endpoint
//! - [`scripted`]: deterministic offline backend for local play and tests

pub mod guardrail;
pub mod openai;
pub mod prompts;
pub mod scenario;
pub mod scripted;
pub mod verifier;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::schema::AppConfig;
use crate::error::BackendError;
use crate::game::session::{Message, SessionId};
use crate::persona::PersonaId;

pub use guardrail::{GuardrailOutcome, OllamaGuardrail};
pub use openai::OpenAiClient;
pub use scenario::LlmScenarioGenerator;
pub use scripted::ScriptedBackend;
pub use verifier::HttpVerifier;

// ============================================================================
// Credential
// ============================================================================

/// Caller-supplied API credential for the completion service.
///
/// `Debug` never prints the secret.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw API key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns `true` when no key was supplied (local servers need none).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Credential(<none>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}

// ============================================================================
// Scenario Data
// ============================================================================

/// One thing that happened aboard the ship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Unique event number
    pub event_id: u64,
    /// What happened
    pub description: String,
    /// Player names involved (`"Player1"` .. `"Player4"`)
    #[serde(default)]
    pub players: Vec<String>,
}

/// All events of one time period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    /// Period index
    pub time: u32,
    /// Events in this period
    #[serde(default)]
    pub events: Vec<GameEvent>,
}

/// The kill committed by the impostor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MurderEvent {
    /// Period in which the murder happened
    pub time: u32,
    /// Ship location
    pub location: String,
    /// Victim name (a non-player crewmate)
    pub victim: String,
    /// Short account of the murder
    pub description: String,
    /// Player names who may have seen something
    #[serde(default)]
    pub witnesses: Vec<String>,
}

/// An event as remembered by one persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaEvent {
    /// Period index
    pub time: u32,
    /// Event number
    pub event_id: u64,
    /// What happened
    pub description: String,
    /// Player names involved
    pub players: Vec<String>,
}

/// Generated backstory for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Event history, one entry per period
    pub periods: Vec<TimePeriod>,
    /// The murder the impostor committed
    pub murder: MurderEvent,
}

impl Scenario {
    /// Extracts the events a persona took part in.
    #[must_use]
    pub fn events_for(&self, persona: PersonaId) -> Vec<PersonaEvent> {
        let name = persona.player_name();
        self.periods
            .iter()
            .flat_map(|period| {
                period
                    .events
                    .iter()
                    .filter(move |e| e.players.iter().any(|p| p == name))
                    .map(move |e| PersonaEvent {
                        time: period.time,
                        event_id: e.event_id,
                        description: e.description.clone(),
                        players: e.players.clone(),
                    })
            })
            .collect()
    }

    /// Total number of events across all periods.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.periods.iter().map(|p| p.events.len()).sum()
    }

    /// Returns whether `persona` is listed as a murder witness.
    #[must_use]
    pub fn is_witness(&self, persona: PersonaId) -> bool {
        self.murder
            .witnesses
            .iter()
            .any(|w| w == persona.player_name())
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Everything a persona needs to answer one question.
#[derive(Debug, Clone)]
pub struct ResponseRequest {
    /// Persona being questioned
    pub persona: PersonaId,
    /// Whether this persona plays the impostor
    pub is_impostor: bool,
    /// Session backstory
    pub scenario: Arc<Scenario>,
    /// Most recent log entries preceding the question
    pub history: Vec<Message>,
    /// The new question
    pub question: String,
}

/// Outcome of a remote guess verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVerdict {
    /// Whether the guess was right
    pub correct: bool,
    /// Identity according to the verifier
    pub actual_impostor: PersonaId,
    /// Player-facing message
    pub message: String,
}

/// Generates the backstory for a new session.
#[async_trait]
pub trait ScenarioGenerator: Send + Sync {
    /// Checks that the credential is accepted before doing expensive work.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` for a rejected credential.
    async fn validate_credential(&self, _credential: &Credential) -> Result<(), BackendError> {
        Ok(())
    }

    /// Generates events and the murder committed by `impostor`.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` if the completion service cannot be reached.
    async fn generate_scenario(
        &self,
        credential: &Credential,
        impostor: PersonaId,
    ) -> Result<Scenario, BackendError>;
}

/// Produces a persona's answer to a question.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Generates the assistant text for `request`.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` on transport failure or an unusable response.
    async fn generate_response(
        &self,
        credential: &Credential,
        request: &ResponseRequest,
    ) -> Result<String, BackendError>;
}

/// Screens persona answers for confessions.
#[async_trait]
pub trait ConfessionGuardrail: Send + Sync {
    /// Reviews `text`. Implementations fail open.
    async fn review(&self, text: &str) -> GuardrailOutcome;
}

/// Verifies a guess against an authoritative remote record.
#[async_trait]
pub trait GuessVerifier: Send + Sync {
    /// Asks the verifier whether `guess` is the impostor of `session`.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` when the verifier is unreachable or replies
    /// with something unusable.
    async fn verify(
        &self,
        session: SessionId,
        guess: PersonaId,
    ) -> Result<RemoteVerdict, BackendError>;
}

// ============================================================================
// Wiring
// ============================================================================

/// Which collaborator family to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendKind {
    /// OpenAI-compatible completion API
    #[default]
    Openai,
    /// Deterministic offline backend
    Scripted,
}

/// The set of collaborators a session store talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Backstory generation
    pub scenario: Arc<dyn ScenarioGenerator>,
    /// Persona answers
    pub responses: Arc<dyn ResponseGenerator>,
    /// Optional confession screening
    pub guardrail: Option<Arc<dyn ConfessionGuardrail>>,
    /// Optional remote verification
    pub verifier: Option<Arc<dyn GuessVerifier>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("guardrail", &self.guardrail.is_some())
            .field("verifier", &self.verifier.is_some())
            .finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Builds collaborators from configuration.
    ///
    /// The guardrail and verifier are attached only when configured.
    #[must_use]
    pub fn from_config(config: &AppConfig, kind: BackendKind) -> Self {
        let (scenario, responses): (Arc<dyn ScenarioGenerator>, Arc<dyn ResponseGenerator>) =
            match kind {
                BackendKind::Openai => {
                    let client = Arc::new(OpenAiClient::new(config.llm.clone()));
                    let scenario = LlmScenarioGenerator::new(
                        Arc::clone(&client),
                        config.scenario.clone(),
                    );
                    (Arc::new(scenario), client)
                }
                BackendKind::Scripted => {
                    let backend = Arc::new(ScriptedBackend::new());
                    (backend.clone(), backend)
                }
            };

        let guardrail = config.guardrail.enabled.then(|| {
            Arc::new(OllamaGuardrail::new(config.guardrail.clone())) as Arc<dyn ConfessionGuardrail>
        });

        let verifier = config.verification.url.as_ref().map(|url| {
            Arc::new(HttpVerifier::new(url.clone(), config.verification.timeout))
                as Arc<dyn GuessVerifier>
        });

        Self {
            scenario,
            responses,
            guardrail,
            verifier,
        }
    }

    /// Offline collaborators with no guardrail or verifier.
    #[must_use]
    pub fn scripted(backend: Arc<ScriptedBackend>) -> Self {
        Self {
            scenario: backend.clone(),
            responses: backend,
            guardrail: None,
            verifier: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scenario() -> Scenario {
        Scenario {
            periods: vec![
                TimePeriod {
                    time: 0,
                    events: vec![
                        GameEvent {
                            event_id: 1,
                            description: "Player1 fixed wiring in Electrical".into(),
                            players: vec!["Player1".into()],
                        },
                        GameEvent {
                            event_id: 2,
                            description: "Player2 and Player3 met in Cafeteria".into(),
                            players: vec!["Player2".into(), "Player3".into()],
                        },
                    ],
                },
                TimePeriod {
                    time: 1,
                    events: vec![GameEvent {
                        event_id: 11,
                        description: "Player3 scanned in MedBay".into(),
                        players: vec!["Player3".into()],
                    }],
                },
            ],
            murder: MurderEvent {
                time: 1,
                location: "Electrical".into(),
                victim: "Crewmate5".into(),
                description: "Crewmate5 was found in Electrical".into(),
                witnesses: vec!["Player2".into()],
            },
        }
    }

    #[test]
    fn events_for_filters_by_player() {
        let s = sample_scenario();
        let blue = s.events_for(PersonaId::Blue);
        assert_eq!(blue.len(), 2);
        assert_eq!(blue[0].time, 0);
        assert_eq!(blue[1].event_id, 11);
        assert!(s.events_for(PersonaId::Green).is_empty());
    }

    #[test]
    fn event_count_sums_periods() {
        assert_eq!(sample_scenario().event_count(), 3);
    }

    #[test]
    fn witness_lookup() {
        let s = sample_scenario();
        assert!(s.is_witness(PersonaId::Yellow));
        assert!(!s.is_witness(PersonaId::Red));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let c = Credential::new("sk-very-secret");
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert_eq!(format!("{:?}", Credential::default()), "Credential(<none>)");
    }

    #[test]
    fn time_period_parses_without_players() {
        let p: TimePeriod =
            serde_json::from_str(r#"{"time":3,"events":[{"event_id":31,"description":"x"}]}"#)
                .unwrap();
        assert!(p.events[0].players.is_empty());
    }
}
