//! Confession guardrail
//!
//! Scores each persona answer with a local model on a 1-5 scale for how
//! strongly it admits to the murder. Answers at or above the threshold are
//! swapped for a canned deflection. Any scorer failure lets the original
//! answer through.

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::schema::GuardrailConfig;
use crate::error::BackendError;

use super::ConfessionGuardrail;

/// Replacement answers for a detected confession.
pub const SAFE_RESPONSES: [&str; 8] = [
    "I don't know what you're talking about. I was doing my tasks like everyone else.",
    "That's a strange thing to ask. I was busy with my own work the whole time.",
    "I have nothing to hide. Ask the others where they were.",
    "You're looking at the wrong person. I was nowhere near there.",
    "I spent most of the round on tasks. I didn't see anything unusual.",
    "Why are you accusing me? Someone else was acting far more suspicious.",
    "I was fixing things around the ship. You can check my tasks.",
    "I honestly don't remember anything odd. I kept to myself.",
];

/// Result of reviewing one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailOutcome {
    /// Text to deliver
    pub text: String,
    /// Confession score, when the scorer answered
    pub score: Option<u8>,
    /// Whether `text` is a replacement
    pub replaced: bool,
}

impl GuardrailOutcome {
    /// Outcome that delivers `text` unchanged.
    #[must_use]
    pub fn passed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            score: None,
            replaced: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Guardrail backed by an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaGuardrail {
    config: GuardrailConfig,
    client: reqwest::Client,
}

impl OllamaGuardrail {
    /// Creates a guardrail client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (TLS backend unavailable).
    #[must_use]
    pub fn new(config: GuardrailConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("failed to build HTTP client");
        Self { config, client }
    }

    async fn score(&self, text: &str) -> Result<u8, BackendError> {
        let url = format!(
            "{}/api/generate",
            self.config.base_url.trim_end_matches('/')
        );
        let body = GenerateRequest {
            model: &self.config.model,
            prompt: scoring_prompt(text),
            stream: false,
            options: GenerateOptions {
                temperature: 0.0,
                num_predict: 10,
            },
        };
        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(BackendError::HttpStatus(response.status().as_u16()));
        }
        let parsed: GenerateResponse = response.json().await?;
        Ok(parse_score(&parsed.response))
    }
}

#[async_trait]
impl ConfessionGuardrail for OllamaGuardrail {
    async fn review(&self, text: &str) -> GuardrailOutcome {
        let score = match self.score(text).await {
            Ok(score) => score,
            Err(e) => {
                warn!(error = %e, "guardrail unavailable; answer delivered unchecked");
                return GuardrailOutcome::passed(text);
            }
        };
        debug!(score, "guardrail score");

        if score >= self.config.threshold {
            GuardrailOutcome {
                text: pick_safe_response().to_string(),
                score: Some(score),
                replaced: true,
            }
        } else {
            GuardrailOutcome {
                text: text.to_string(),
                score: Some(score),
                replaced: false,
            }
        }
    }
}

fn pick_safe_response() -> &'static str {
    SAFE_RESPONSES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(SAFE_RESPONSES[0])
}

/// Extracts the first digit of a scorer reply; `1` when there is none.
#[must_use]
pub fn parse_score(raw: &str) -> u8 {
    raw.chars()
        .find_map(|c| c.to_digit(10))
        .and_then(|d| u8::try_from(d).ok())
        .unwrap_or(1)
}

fn scoring_prompt(text: &str) -> String {
    format!(
        "You are a content filter for a social deduction game. Rate how strongly \
         the following message admits to being the Impostor or to committing the murder.\n\
         \n\
         1 = No admission at all\n\
         2 = Vague or ambiguous wording\n\
         3 = Suggestive, hints at guilt\n\
         4 = Strong implication of guilt\n\
         5 = Direct confession\n\
         \n\
         Message: \"{text}\"\n\
         \n\
         Reply with a single digit from 1 to 5."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_is_first_digit() {
        assert_eq!(parse_score("4"), 4);
        assert_eq!(parse_score("Score: 5/5"), 5);
        assert_eq!(parse_score(" 2\n"), 2);
    }

    #[test]
    fn score_defaults_to_one() {
        assert_eq!(parse_score(""), 1);
        assert_eq!(parse_score("no idea"), 1);
    }

    #[test]
    fn safe_response_is_from_pool() {
        for _ in 0..20 {
            assert!(SAFE_RESPONSES.contains(&pick_safe_response()));
        }
    }

    #[test]
    fn prompt_embeds_message() {
        let p = scoring_prompt("I did it");
        assert!(p.contains("\"I did it\""));
        assert!(p.contains("5 = Direct confession"));
    }

    #[tokio::test]
    async fn unreachable_scorer_fails_open() {
        let guardrail = OllamaGuardrail::new(GuardrailConfig {
            enabled: true,
            base_url: "http://127.0.0.1:9".into(),
            ..GuardrailConfig::default()
        });
        let outcome = guardrail.review("I was in Admin").await;
        assert_eq!(outcome, GuardrailOutcome::passed("I was in Admin"));
    }
}
