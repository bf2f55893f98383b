//! Backstory generation over the completion API
//!
//! One completion per time period, then one for the murder. A response
//! that cannot be parsed is replaced with a placeholder so a flaky model
//! never blocks a game; transport failures abort generation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::schema::ScenarioConfig;
use crate::error::BackendError;
use crate::persona::PersonaId;

use super::openai::{ChatMessage, OpenAiClient, Sampling};
use super::prompts::{self, EVENT_SYSTEM, MURDER_SYSTEM, VICTIM_NAME};
use super::{Credential, GameEvent, MurderEvent, Scenario, ScenarioGenerator, TimePeriod};

/// Generates session backstories with an LLM.
#[derive(Debug, Clone)]
pub struct LlmScenarioGenerator {
    client: Arc<OpenAiClient>,
    config: ScenarioConfig,
}

impl LlmScenarioGenerator {
    /// Creates a generator sharing `client` with the response path.
    #[must_use]
    pub const fn new(client: Arc<OpenAiClient>, config: ScenarioConfig) -> Self {
        Self { client, config }
    }

    fn sampling(&self) -> Sampling {
        Sampling {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    async fn generate_period(
        &self,
        credential: &Credential,
        time: u32,
        previous: &[TimePeriod],
    ) -> Result<TimePeriod, BackendError> {
        let messages = [
            ChatMessage::system(EVENT_SYSTEM),
            ChatMessage::user(prompts::period_prompt(time, previous)),
        ];
        let raw = self
            .client
            .chat(credential, &messages, self.sampling())
            .await?;

        match parse_json::<TimePeriod>(&raw) {
            Some(period) => Ok(normalize_period(period, time)),
            None => {
                warn!(time, "unparseable period; using placeholder");
                Ok(fallback_period(time))
            }
        }
    }

    async fn generate_murder(
        &self,
        credential: &Credential,
        impostor: PersonaId,
        periods: &[TimePeriod],
    ) -> Result<MurderEvent, BackendError> {
        let messages = [
            ChatMessage::system(MURDER_SYSTEM),
            ChatMessage::user(prompts::murder_prompt(impostor, periods)),
        ];
        let raw = self
            .client
            .chat(credential, &messages, self.sampling())
            .await?;

        match parse_json::<MurderEvent>(&raw) {
            Some(murder) => Ok(normalize_murder(murder, impostor)),
            None => {
                warn!("unparseable murder; using placeholder");
                Ok(fallback_murder(impostor, periods.len()))
            }
        }
    }
}

#[async_trait]
impl ScenarioGenerator for LlmScenarioGenerator {
    async fn validate_credential(&self, credential: &Credential) -> Result<(), BackendError> {
        self.client.list_models(credential).await
    }

    async fn generate_scenario(
        &self,
        credential: &Credential,
        impostor: PersonaId,
    ) -> Result<Scenario, BackendError> {
        let mut periods = Vec::with_capacity(self.config.periods as usize);
        for time in 0..self.config.periods {
            let period = self.generate_period(credential, time, &periods).await?;
            debug!(time, events = period.events.len(), "period generated");
            periods.push(period);
        }
        let murder = self.generate_murder(credential, impostor, &periods).await?;
        Ok(Scenario { periods, murder })
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Removes a surrounding Markdown code fence, if any.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_json<T: DeserializeOwned>(raw: &str) -> Option<T> {
    serde_json::from_str(strip_code_fence(raw)).ok()
}

fn is_player_name(name: &str) -> bool {
    PersonaId::from_player_name(name).is_some()
}

fn normalize_period(mut period: TimePeriod, time: u32) -> TimePeriod {
    period.time = time;
    for event in &mut period.events {
        event.players.retain(|p| is_player_name(p));
    }
    period.events.retain(|e| !e.description.trim().is_empty());
    if period.events.is_empty() {
        return fallback_period(time);
    }
    period
}

fn normalize_murder(mut murder: MurderEvent, impostor: PersonaId) -> MurderEvent {
    murder
        .witnesses
        .retain(|w| is_player_name(w) && w != impostor.player_name());
    if murder.victim.trim().is_empty() {
        murder.victim = VICTIM_NAME.to_string();
    }
    murder
}

/// Placeholder used when a period response cannot be parsed.
#[must_use]
pub fn fallback_period(time: u32) -> TimePeriod {
    TimePeriod {
        time,
        events: vec![GameEvent {
            event_id: u64::from(time) * 10 + 1,
            description: format!("Players continue their tasks around the ship at time {time}."),
            players: PersonaId::ALL
                .iter()
                .map(|p| p.player_name().to_string())
                .collect(),
        }],
    }
}

/// Placeholder used when the murder response cannot be parsed.
#[must_use]
pub fn fallback_murder(impostor: PersonaId, periods: usize) -> MurderEvent {
    let time = u32::try_from(periods / 2).unwrap_or(0);
    MurderEvent {
        time,
        location: "Electrical".to_string(),
        victim: VICTIM_NAME.to_string(),
        description: format!(
            "{} eliminated {VICTIM_NAME} in Electrical while no one was watching.",
            impostor.player_name()
        ),
        witnesses: Vec::new(),
    }
}
