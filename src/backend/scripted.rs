//! Scripted offline backend
//!
//! Deterministic scenario and persona answers with no network access. Used
//! by `impostor play --backend scripted` and throughout the test suite.
//! Failure injection switches let tests drive every error path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::persona::PersonaId;

use super::prompts::VICTIM_NAME;
use super::{
    Credential, GameEvent, MurderEvent, ResponseGenerator, ResponseRequest, Scenario,
    ScenarioGenerator, TimePeriod,
};

/// Rooms visited in the scripted backstory, one per period.
const ROUTE: [&str; 4] = ["Cafeteria", "Electrical", "MedBay", "Navigation"];

#[derive(Debug, Default)]
struct Knobs {
    fail_scenarios: bool,
    failing_responses: u32,
    empty_responses: bool,
    rejected_credential: Option<String>,
    delay: Option<Duration>,
}

/// Offline backend with deterministic output.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    knobs: Mutex<Knobs>,
    scenarios_served: AtomicUsize,
    responses_served: AtomicUsize,
}

impl ScriptedBackend {
    /// Creates a backend that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn knobs(&self) -> MutexGuard<'_, Knobs> {
        self.knobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes scenario generation fail with a network error.
    pub fn fail_scenarios(&self, fail: bool) {
        self.knobs().fail_scenarios = fail;
    }

    /// Makes the next `count` response generations fail.
    pub fn fail_next_responses(&self, count: u32) {
        self.knobs().failing_responses = count;
    }

    /// Makes response generation return empty text.
    pub fn respond_empty(&self, empty: bool) {
        self.knobs().empty_responses = empty;
    }

    /// Rejects `key` as an invalid credential.
    pub fn reject_credential(&self, key: &str) {
        self.knobs().rejected_credential = Some(key.to_string());
    }

    /// Delays every response generation by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.knobs().delay = Some(delay);
    }

    /// Number of scenarios generated so far.
    #[must_use]
    pub fn scenarios_served(&self) -> usize {
        self.scenarios_served.load(Ordering::Relaxed)
    }

    /// Number of answers generated so far.
    #[must_use]
    pub fn responses_served(&self) -> usize {
        self.responses_served.load(Ordering::Relaxed)
    }

    /// The fixed backstory used when `impostor` is the impostor.
    ///
    /// Four periods, one per room. Every persona appears in each period. The
    /// murder happens in Electrical at time 1 and is witnessed by the persona
    /// after the impostor in display order.
    #[must_use]
    pub fn scenario_for(impostor: PersonaId) -> Scenario {
        let periods = ROUTE
            .iter()
            .zip(0u32..)
            .map(|(room, time)| TimePeriod {
                time,
                events: PersonaId::ALL
                    .iter()
                    .enumerate()
                    .map(|(i, persona)| {
                        let name = persona.player_name();
                        let room = ROUTE[(i + time as usize) % ROUTE.len()];
                        GameEvent {
                            event_id: u64::from(time) * 10 + i as u64 + 1,
                            description: format!("{name} worked on tasks in {room}."),
                            players: vec![name.to_string()],
                        }
                    })
                    .chain(std::iter::once(GameEvent {
                        event_id: u64::from(time) * 10 + 9,
                        description: format!("The crew passed through {room}."),
                        players: Vec::new(),
                    }))
                    .collect(),
            })
            .collect();

        let witness = PersonaId::ALL[(impostor.index() + 1) % PersonaId::ALL.len()];
        Scenario {
            periods,
            murder: MurderEvent {
                time: 1,
                location: "Electrical".to_string(),
                victim: VICTIM_NAME.to_string(),
                description: format!(
                    "{} cornered {VICTIM_NAME} by the wiring panels.",
                    impostor.player_name()
                ),
                witnesses: vec![witness.player_name().to_string()],
            },
        }
    }
}

/// Builds the scripted answer for a request.
fn scripted_answer(request: &ResponseRequest) -> String {
    let persona = request.persona;
    let events = request.scenario.events_for(persona);
    let turn = request.history.len() / 2;
    let memory = events
        .get(turn % events.len().max(1))
        .map_or_else(|| "I kept to myself.".to_string(), |e| {
            format!("At time {} I remember this: {}", e.time, e.description)
        });
    let murder = &request.scenario.murder;

    if request.is_impostor {
        format!(
            "I'm {}. I was on my tasks the whole round. {memory} I never went near {}.",
            persona.player_name(),
            murder.location
        )
    } else if request.scenario.is_witness(persona) {
        format!(
            "I'm {}. {memory} Around time {} I saw someone hurrying out of {}.",
            persona.player_name(),
            murder.time,
            murder.location
        )
    } else {
        format!(
            "I'm {}. {memory} I only heard about {} afterwards.",
            persona.player_name(),
            murder.victim
        )
    }
}

#[async_trait]
impl ScenarioGenerator for ScriptedBackend {
    async fn validate_credential(&self, credential: &Credential) -> Result<(), BackendError> {
        let rejected = self.knobs().rejected_credential.clone();
        match rejected {
            Some(key) if key == credential.expose() => Err(BackendError::Unauthorized),
            _ => Ok(()),
        }
    }

    async fn generate_scenario(
        &self,
        _credential: &Credential,
        impostor: PersonaId,
    ) -> Result<Scenario, BackendError> {
        if self.knobs().fail_scenarios {
            return Err(BackendError::Network("scripted scenario failure".to_string()));
        }
        self.scenarios_served.fetch_add(1, Ordering::Relaxed);
        Ok(Self::scenario_for(impostor))
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedBackend {
    async fn generate_response(
        &self,
        _credential: &Credential,
        request: &ResponseRequest,
    ) -> Result<String, BackendError> {
        let (delay, fail, empty) = {
            let mut knobs = self.knobs();
            let fail = knobs.failing_responses > 0;
            if fail {
                knobs.failing_responses -= 1;
            }
            (knobs.delay, fail, knobs.empty_responses)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(BackendError::HttpStatus(503));
        }
        self.responses_served.fetch_add(1, Ordering::Relaxed);
        if empty {
            return Ok(String::new());
        }
        Ok(scripted_answer(request))
    }
}
