//! Error types for `impostor`
//!
//! This module provides the error hierarchy for the game server: a
//! top-level aggregate with exit-code mapping, the game taxonomy surfaced
//! to players, and the collaborator errors converted at the gateway boundary.

use std::path::PathBuf;
use thiserror::Error;

use crate::game::phase::Phase;
use crate::game::session::SessionId;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `impostor` CLI operations.
///
/// These codes follow Unix conventions.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Server error (bind failure, listener crashed)
    pub const SERVER_ERROR: i32 = 4;

    /// Game error (phase violation, generation failure)
    pub const GAME_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `impostor` operations.
///
/// Aggregates all domain-specific errors and maps each to a process exit code.
#[derive(Debug, Error)]
pub enum ImpostorError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Game orchestration error
    #[error(transparent)]
    Game(#[from] GameError),

    /// HTTP server error
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Invalid command-line usage
    #[error("usage error: {0}")]
    Usage(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ImpostorError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Server(_) => ExitCode::SERVER_ERROR,
            Self::Game(_) => ExitCode::GAME_ERROR,
            Self::Usage(_) => ExitCode::USAGE_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}")]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Configuration file exceeds the size limit
    #[error("config file {path} is too large: {size} bytes (limit: {limit})")]
    TooLarge {
        /// Path to the configuration file
        path: PathBuf,
        /// Actual size in bytes
        size: usize,
        /// Configured limit in bytes
        limit: usize,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set ({location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Message attached to the `${VAR:?message}` reference
        location: String,
    },
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Dotted path to the problematic field (e.g., "game.question_budget")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Server Errors
// ============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listener
    #[error("bind failed: {0}")]
    Bind(String),

    /// Invalid bind address
    #[error("invalid bind address \"{input}\": {message}")]
    InvalidAddress {
        /// Address as given by the user
        input: String,
        /// Parser message
        message: String,
    },

    /// Server task terminated abnormally
    #[error("server task failed: {0}")]
    Crashed(String),
}

// ============================================================================
// Game Errors
// ============================================================================

/// Errors surfaced by game operations.
///
/// Collaborator failures are converted into this taxonomy at the gateway
/// boundary. None of the variants carries the impostor identity.
#[derive(Debug, Error)]
pub enum GameError {
    /// Session or backstory creation failed; no session was retained
    #[error("session initialization failed: {0}")]
    Initialization(String),

    /// Persona response generation failed or timed out; budget untouched
    #[error("response generation failed: {0}")]
    Generation(String),

    /// Operation invalid for the current phase
    #[error(transparent)]
    Phase(#[from] PhaseError),

    /// Unknown or already destroyed session
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// Rejected input (empty question, unknown persona)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Remote guess verification failed and no fallback was permitted
    #[error("guess verification failed: {0}")]
    Verification(String),
}

impl GameError {
    /// Returns `true` if repeating the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Initialization(_) | Self::Generation(_) | Self::Verification(_)
        )
    }

    /// Short category name used for metrics labels.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Initialization(_) => "initialization",
            Self::Generation(_) => "generation",
            Self::Phase(_) => "phase",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::Verification(_) => "verification",
        }
    }
}

/// Phase controller violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    /// Operation requires a different phase
    #[error("{operation} is not allowed while the game is {phase}")]
    NotAllowed {
        /// Name of the rejected operation
        operation: &'static str,
        /// Phase the session was in
        phase: Phase,
    },

    /// No unreserved question budget left
    #[error("no questions left in the budget")]
    BudgetExhausted,

    /// The single `Accusing -> Playing` transition was already taken
    #[error("returning to questioning is only allowed once per game")]
    BackAlreadyUsed,

    /// Leaving `Playing` while answers are still being generated
    #[error("{0} exchange(s) still awaiting an answer")]
    ExchangeInFlight(u32),
}

// ============================================================================
// Backend Errors
// ============================================================================

/// Errors raised by external collaborators (LLM, guardrail, verifier).
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Call exceeded its deadline
    #[error("request timed out")]
    Timeout,

    /// Non-2xx response
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Credential rejected by the provider
    #[error("credential rejected")]
    Unauthorized,

    /// Response body could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::HttpStatus(status.as_u16())
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `impostor` operations.
pub type Result<T> = std::result::Result<T, ImpostorError>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::SERVER_ERROR, 4);
        assert_eq!(ExitCode::GAME_ERROR, 5);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_game_error_exit_code() {
        let err: ImpostorError = GameError::from(PhaseError::BudgetExhausted).into();
        assert_eq!(err.exit_code(), ExitCode::GAME_ERROR);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: ImpostorError = ConfigError::MissingFile {
            path: PathBuf::from("/test"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_server_error_exit_code() {
        let err: ImpostorError = ServerError::Bind("in use".to_string()).into();
        assert_eq!(err.exit_code(), ExitCode::SERVER_ERROR);
    }

    #[test]
    fn test_usage_error_exit_code() {
        let err = ImpostorError::Usage("missing --config".to_string());
        assert_eq!(err.exit_code(), ExitCode::USAGE_ERROR);
    }

    #[test]
    fn test_io_error_exit_code() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: ImpostorError = io_err.into();
        assert_eq!(err.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GameError::Generation("timeout".into()).is_retryable());
        assert!(GameError::Initialization("bad key".into()).is_retryable());
        assert!(GameError::Verification("unreachable".into()).is_retryable());
        assert!(!GameError::from(PhaseError::BackAlreadyUsed).is_retryable());
        assert!(!GameError::InvalidInput("empty".into()).is_retryable());
    }

    #[test]
    fn test_phase_error_display() {
        let err = PhaseError::NotAllowed {
            operation: "ask",
            phase: Phase::Resolved,
        };
        assert_eq!(err.to_string(), "ask is not allowed while the game is resolved");
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "game.question_budget".to_string(),
            message: "must be at least 1".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(
            issue.to_string(),
            "error: must be at least 1 at game.question_budget"
        );
    }

    #[test]
    fn test_validation_issue_warning_display() {
        let issue = ValidationIssue {
            path: "llm.api_key".to_string(),
            message: "no default credential".to_string(),
            severity: Severity::Warning,
        };
        assert_eq!(
            issue.to_string(),
            "warning: no default credential at llm.api_key"
        );
    }

    #[test]
    fn test_config_error_env_var_display() {
        let err = ConfigError::EnvVarNotSet {
            var: "OPENAI_API_KEY".to_string(),
            location: "llm.api_key".to_string(),
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        assert!(err.to_string().contains("llm.api_key"));
    }
}
