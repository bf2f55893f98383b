//! Configuration validation
//!
//! Semantic checks on a deserialized [`AppConfig`]. Validation collects all
//! issues instead of stopping at the first one.

use crate::config::schema::AppConfig;
use crate::error::{Severity, ValidationIssue};
use crate::game::verdict::TrustModel;
use crate::transport::http::parse_bind_addr;

/// Largest accepted question budget.
pub const MAX_QUESTION_BUDGET: u32 = 1000;

/// Largest accepted number of scenario periods.
pub const MAX_SCENARIO_PERIODS: u32 = 50;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every issue found.
    pub fn validate(&mut self, config: &AppConfig) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_game(config);
        self.validate_llm(config);
        self.validate_scenario(config);
        self.validate_guardrail(config);
        self.validate_verification(config);
        self.validate_server(config);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Sections
    // ========================================================================

    fn validate_game(&mut self, config: &AppConfig) {
        let game = &config.game;
        if game.question_budget > MAX_QUESTION_BUDGET {
            self.add_error(
                "game.question_budget",
                &format!("must be at most {MAX_QUESTION_BUDGET}"),
            );
        }
        if game.question_budget == 0 {
            self.add_warning(
                "game.question_budget",
                "budget is 0; every session starts in the accusation phase",
            );
        }
        if game.history_window == 0 {
            self.add_warning(
                "game.history_window",
                "personas will not see earlier questions",
            );
        }
        if game.max_question_len == 0 {
            self.add_error("game.max_question_len", "must be at least 1");
        }
        if let Some(ttl) = game.session_ttl {
            if ttl.as_secs() < 60 {
                self.add_warning(
                    "game.session_ttl",
                    "sessions idle for less than a minute will be destroyed",
                );
            }
        }
    }

    fn validate_llm(&mut self, config: &AppConfig) {
        let llm = &config.llm;
        self.check_url("llm.base_url", &llm.base_url);
        if llm.model.trim().is_empty() {
            self.add_error("llm.model", "model name is required");
        }
        if !(0.0..=2.0).contains(&llm.temperature) {
            self.add_error("llm.temperature", "must be between 0.0 and 2.0");
        }
        if llm.max_tokens == 0 {
            self.add_error("llm.max_tokens", "must be at least 1");
        }
        if llm.timeout.is_zero() {
            self.add_error("llm.timeout", "must be greater than zero");
        }
        if llm.api_key.as_deref().is_none_or(|k| k.trim().is_empty()) {
            self.add_warning(
                "llm.api_key",
                "no server-side key; clients must send api_key at init",
            );
        }
    }

    fn validate_scenario(&mut self, config: &AppConfig) {
        let scenario = &config.scenario;
        if scenario.periods == 0 || scenario.periods > MAX_SCENARIO_PERIODS {
            self.add_error(
                "scenario.periods",
                &format!("must be between 1 and {MAX_SCENARIO_PERIODS}"),
            );
        }
        if !(0.0..=2.0).contains(&scenario.temperature) {
            self.add_error("scenario.temperature", "must be between 0.0 and 2.0");
        }
        if scenario.timeout < config.llm.timeout {
            self.add_warning(
                "scenario.timeout",
                "shorter than llm.timeout; backstory generation may never finish",
            );
        }
    }

    fn validate_guardrail(&mut self, config: &AppConfig) {
        let guardrail = &config.guardrail;
        if !(1..=5).contains(&guardrail.threshold) {
            self.add_error("guardrail.threshold", "must be between 1 and 5");
        }
        if guardrail.enabled {
            self.check_url("guardrail.base_url", &guardrail.base_url);
            if guardrail.model.trim().is_empty() {
                self.add_error("guardrail.model", "model name is required");
            }
        }
    }

    fn validate_verification(&mut self, config: &AppConfig) {
        let verification = &config.verification;
        match &verification.url {
            Some(url) => self.check_url("verification.url", url),
            None if verification.trust_model == TrustModel::Hardened => self.add_warning(
                "verification.trust_model",
                "hardened has no effect without verification.url",
            ),
            None => {}
        }
    }

    fn validate_server(&mut self, config: &AppConfig) {
        if let Err(e) = parse_bind_addr(&config.server.bind) {
            self.add_error("server.bind", &e.to_string());
        }
        if config.server.max_body_size == 0 {
            self.add_error("server.max_body_size", "must be at least 1 byte");
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_url(&mut self, path: &str, url: &str) {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            self.add_error(path, "must be an http:// or https:// URL");
        }
    }

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(config: &AppConfig) -> ValidationResult {
        Validator::new().validate(config)
    }

    fn error_paths(result: &ValidationResult) -> Vec<&str> {
        result.errors.iter().map(|e| e.path.as_str()).collect()
    }

    #[test]
    fn defaults_are_valid() {
        let result = validate(&AppConfig::default());
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.iter().any(|w| w.path == "llm.api_key"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = AppConfig::default();
        config.game.question_budget = 5000;
        config.game.max_question_len = 0;
        config.llm.base_url = "ftp://example".into();
        config.llm.temperature = 3.5;
        config.guardrail.threshold = 9;
        config.server.bind = "not an address".into();

        let result = validate(&config);
        assert!(result.has_errors());
        let paths = error_paths(&result);
        for expected in [
            "game.question_budget",
            "game.max_question_len",
            "llm.base_url",
            "llm.temperature",
            "guardrail.threshold",
            "server.bind",
        ] {
            assert!(paths.contains(&expected), "missing {expected}: {paths:?}");
        }
    }

    #[test]
    fn zero_budget_is_a_warning() {
        let mut config = AppConfig::default();
        config.game.question_budget = 0;
        let result = validate(&config);
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.path == "game.question_budget"));
    }

    #[test]
    fn guardrail_url_checked_only_when_enabled() {
        let mut config = AppConfig::default();
        config.guardrail.base_url = "localhost".into();
        assert!(validate(&config).is_valid());
        config.guardrail.enabled = true;
        assert!(error_paths(&validate(&config)).contains(&"guardrail.base_url"));
    }

    #[test]
    fn hardened_without_url_warns() {
        let mut config = AppConfig::default();
        config.verification.trust_model = TrustModel::Hardened;
        let result = validate(&config);
        assert!(result.is_valid());
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.path == "verification.trust_model")
        );
    }

    #[test]
    fn scenario_periods_bounded() {
        let mut config = AppConfig::default();
        config.scenario.periods = 0;
        assert!(error_paths(&validate(&config)).contains(&"scenario.periods"));
        config.scenario.periods = 51;
        assert!(error_paths(&validate(&config)).contains(&"scenario.periods"));
    }
}
