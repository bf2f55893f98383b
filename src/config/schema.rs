//! Configuration schema
//!
//! Typed configuration for the game server. Every field has a default, so an
//! empty file (or no file) yields a working local setup. Durations are
//! human-readable strings such as `30s`, `5m` or `2h`.

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::game::session::{DEFAULT_HISTORY_WINDOW, DEFAULT_MAX_QUESTION_LEN, DEFAULT_QUESTION_BUDGET};
use crate::game::verdict::TrustModel;

// ============================================================================
// Root
// ============================================================================

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Session rules
    pub game: GameConfig,
    /// Completion API used for persona answers
    pub llm: LlmConfig,
    /// Backstory generation
    pub scenario: ScenarioConfig,
    /// Confession screening
    pub guardrail: GuardrailConfig,
    /// Remote guess verification
    pub verification: VerificationConfig,
    /// HTTP listener
    pub server: HttpConfig,
}

// ============================================================================
// Sections
// ============================================================================

/// Session rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    /// Shared question budget per session
    pub question_budget: u32,
    /// Log entries passed to the response generator
    pub history_window: usize,
    /// Longest accepted question, in characters
    pub max_question_len: usize,
    /// Idle sessions are destroyed after this long (`off` disables expiry)
    #[serde(deserialize_with = "optional_duration")]
    pub session_ttl: Option<Duration>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            question_budget: DEFAULT_QUESTION_BUDGET,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_question_len: DEFAULT_MAX_QUESTION_LEN,
            session_ttl: Some(Duration::from_secs(2 * 60 * 60)),
        }
    }
}

/// OpenAI-compatible completion API.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// API base URL, including the version prefix
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Server-side default key; clients may supply their own at init
    pub api_key: Option<String>,
    /// Deadline for one persona answer
    #[serde(deserialize_with = "duration")]
    pub timeout: Duration,
    /// Sampling temperature for persona answers
    pub temperature: f32,
    /// Token cap for persona answers
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(60),
            temperature: 0.8,
            max_tokens: 500,
        }
    }
}

/// Backstory generation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Number of time periods to generate
    pub periods: u32,
    /// Sampling temperature for event generation
    pub temperature: f32,
    /// Token cap per generation call
    pub max_tokens: u32,
    /// Deadline for validating the key and generating the whole backstory
    #[serde(deserialize_with = "duration")]
    pub timeout: Duration,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            periods: 10,
            temperature: 0.8,
            max_tokens: 1000,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Confession guardrail (Ollama-compatible `/api/generate`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardrailConfig {
    /// Screen answers before recording them
    pub enabled: bool,
    /// Scorer base URL
    pub base_url: String,
    /// Scorer model
    pub model: String,
    /// Scores at or above this (1..=5) replace the answer
    pub threshold: u8,
    /// Deadline for one scoring call
    #[serde(deserialize_with = "duration")]
    pub timeout: Duration,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            threshold: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Remote guess verification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationConfig {
    /// Whether an unreachable verifier may be replaced by local comparison
    pub trust_model: TrustModel,
    /// Verifier base URL; local comparison only when absent
    pub url: Option<String>,
    /// Deadline for one verification call
    #[serde(deserialize_with = "duration")]
    pub timeout: Duration,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            trust_model: TrustModel::SingleDomain,
            url: None,
            timeout: Duration::from_secs(5),
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Bind address (`host:port`, `:port` or `port`)
    pub bind: String,
    /// Largest accepted request body in bytes
    pub max_body_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_body_size: 64 * 1024,
        }
    }
}

// ============================================================================
// Duration Fields
// ============================================================================

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

fn optional_duration<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("off" | "none" | "never") => Ok(None),
        Some(s) => humantime::parse_duration(s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.game.question_budget, 30);
        assert_eq!(config.game.history_window, 10);
        assert_eq!(config.verification.trust_model, TrustModel::SingleDomain);
    }

    #[test]
    fn durations_parse_humantime() {
        let config: AppConfig = serde_yaml::from_str(
            "llm:\n  timeout: 45s\ngame:\n  session_ttl: 90m\nverification:\n  timeout: 250ms\n",
        )
        .unwrap();
        assert_eq!(config.llm.timeout, Duration::from_secs(45));
        assert_eq!(config.game.session_ttl, Some(Duration::from_secs(90 * 60)));
        assert_eq!(config.verification.timeout, Duration::from_millis(250));
    }

    #[test]
    fn session_ttl_can_be_disabled() {
        let config: AppConfig = serde_yaml::from_str("game:\n  session_ttl: off\n").unwrap();
        assert_eq!(config.game.session_ttl, None);
    }

    #[test]
    fn invalid_duration_rejected() {
        assert!(serde_yaml::from_str::<AppConfig>("llm:\n  timeout: soon\n").is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        assert!(serde_yaml::from_str::<AppConfig>("game:\n  budget: 3\n").is_err());
        assert!(serde_yaml::from_str::<AppConfig>("extra: true\n").is_err());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: AppConfig =
            serde_yaml::from_str("game:\n  question_budget: 2\nguardrail:\n  enabled: true\n")
                .unwrap();
        assert_eq!(config.game.question_budget, 2);
        assert_eq!(config.game.max_question_len, 2000);
        assert!(config.guardrail.enabled);
        assert_eq!(config.guardrail.threshold, 3);
    }
}
