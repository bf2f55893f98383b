//! CLI argument definitions
//!
//! All Clap derive structs for `impostor` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::backend::BackendKind;
use crate::config::schema::AppConfig;

// ============================================================================
// Root CLI
// ============================================================================

/// Social-deduction game server with LLM personas.
#[derive(Parser, Debug)]
#[command(name = "impostor", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "IMPOSTOR_COLOR")]
    pub color: ColorChoice,

    /// Log output format.
    #[arg(long, default_value = "human", global = true, env = "IMPOSTOR_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP game server.
    Serve(ServeArgs),

    /// Play one game in the terminal.
    Play(PlayArgs),

    /// Validate configuration files.
    Validate(ValidateArgs),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Shared Arguments
// ============================================================================

/// Configuration source and per-run overrides.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "IMPOSTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Collaborator backend.
    #[arg(long, default_value = "openai", env = "IMPOSTOR_BACKEND")]
    pub backend: BackendKind,

    /// Questions per game (overrides `game.question_budget`).
    #[arg(long, env = "IMPOSTOR_QUESTION_BUDGET")]
    pub question_budget: Option<u32>,

    /// Completion API base URL (overrides `llm.base_url`).
    #[arg(long, env = "IMPOSTOR_LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Completion model (overrides `llm.model`).
    #[arg(long, env = "IMPOSTOR_LLM_MODEL")]
    pub llm_model: Option<String>,

    /// Server-side API key (overrides `llm.api_key`).
    #[arg(long, env = "IMPOSTOR_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Number of backstory time periods (overrides `scenario.periods`).
    #[arg(long, env = "IMPOSTOR_SCENARIO_PERIODS")]
    pub scenario_periods: Option<u32>,

    /// Write JSONL events to this file.
    #[arg(long, env = "IMPOSTOR_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,
}

impl ConfigArgs {
    /// Applies the overrides that were given to `config`.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(budget) = self.question_budget {
            config.game.question_budget = budget;
        }
        if let Some(url) = &self.llm_base_url {
            config.llm.base_url.clone_from(url);
        }
        if let Some(model) = &self.llm_model {
            config.llm.model.clone_from(model);
        }
        if let Some(key) = &self.api_key {
            config.llm.api_key = Some(key.clone());
        }
        if let Some(periods) = self.scenario_periods {
            config.scenario.periods = periods;
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Arguments for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Configuration and overrides.
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Bind address, `[host:]port` (overrides `server.bind`).
    #[arg(long, env = "IMPOSTOR_BIND")]
    pub bind: Option<String>,

    /// Expose Prometheus metrics on this port.
    #[arg(long, env = "IMPOSTOR_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for `play`.
#[derive(Args, Debug)]
pub struct PlayArgs {
    /// Configuration and overrides.
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Arguments for `validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Treat warnings as errors.
    #[arg(long)]
    pub strict: bool,
}

/// Arguments for `version`.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Human,
    /// One JSON object per line
    Json,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "impostor",
            "serve",
            "--config",
            "game.yaml",
            "--bind",
            ":9000",
            "--question-budget",
            "12",
            "--backend",
            "scripted",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind.as_deref(), Some(":9000"));
        assert_eq!(args.config.question_budget, Some(12));
        assert_eq!(args.config.backend, BackendKind::Scripted);
    }

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["impostor", "play"]).unwrap();
        assert_eq!(cli.color, ColorChoice::Auto);
        assert_eq!(cli.log_format, LogFormat::Human);
        let Commands::Play(args) = cli.command else {
            panic!("expected play");
        };
        assert_eq!(args.config.backend, BackendKind::Openai);
    }

    #[test]
    fn validate_requires_files() {
        assert!(Cli::try_parse_from(["impostor", "validate"]).is_err());
    }

    #[test]
    fn help_and_version() {
        let err = Cli::try_parse_from(["impostor", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        let err = Cli::try_parse_from(["impostor", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn apply_overrides() {
        let args = ConfigArgs {
            question_budget: Some(3),
            llm_model: Some("llama3".into()),
            api_key: Some("sk-test".into()),
            ..ConfigArgs::default()
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);
        assert_eq!(config.game.question_budget, 3);
        assert_eq!(config.llm.model, "llama3");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.scenario.periods, 10);
    }
}
