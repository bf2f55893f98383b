//! Tracing subscriber setup
//!
//! Everything is written to stderr; `play` owns stdout for the game
//! transcript. `IMPOSTOR_LOG_LEVEL` takes any `EnvFilter` directive and
//! replaces the `-v` flags entirely.

use std::fmt::Write as _;
use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

use crate::cli::args::{ColorChoice, LogFormat};

/// Environment variable that overrides the verbosity flags.
pub const LOG_LEVEL_ENV: &str = "IMPOSTOR_LOG_LEVEL";

/// Transport crates held at `warn` for `-v` and `-vv`.
const QUIET_DEPENDENCIES: &[&str] = &["hyper", "hyper_util", "h2", "reqwest"];

/// Resolved logging options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    /// Output format
    pub format: LogFormat,
    /// Number of `-v` flags
    pub verbosity: u8,
    /// Emit ANSI colors (human format only)
    pub ansi: bool,
}

impl LogSettings {
    /// Resolves `color` against the terminal and `NO_COLOR`.
    #[must_use]
    pub fn new(format: LogFormat, verbosity: u8, color: ColorChoice) -> Self {
        let ansi = format == LogFormat::Human
            && match color {
                ColorChoice::Auto => {
                    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
                }
                ColorChoice::Always => true,
                ColorChoice::Never => false,
            };
        Self {
            format,
            verbosity,
            ansi,
        }
    }

    /// Filter directive implied by the verbosity.
    ///
    /// `0` is `warn`, `1` is `info`, `2` is `debug` and anything higher is
    /// `trace` with no per-crate limits.
    #[must_use]
    pub fn directive(&self) -> String {
        let level = match self.verbosity {
            0 => return "warn".to_string(),
            1 => "info",
            2 => "debug",
            _ => return "trace".to_string(),
        };
        let mut directive = level.to_string();
        for krate in QUIET_DEPENDENCIES {
            let _ = write!(directive, ",{krate}=warn");
        }
        directive
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_env(LOG_LEVEL_ENV).unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }

    /// Installs the global subscriber. Later calls are no-ops.
    pub fn init(&self) {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_target(self.verbosity >= 2)
            .with_writer(std::io::stderr);
        let _ = match self.format {
            LogFormat::Human => builder.with_ansi(self.ansi).try_init(),
            LogFormat::Json => builder.json().flatten_event(true).try_init(),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_by_verbosity() {
        let at = |v| LogSettings::new(LogFormat::Human, v, ColorChoice::Never).directive();
        assert_eq!(at(0), "warn");
        assert_eq!(
            at(1),
            "info,hyper=warn,hyper_util=warn,h2=warn,reqwest=warn"
        );
        assert!(at(2).starts_with("debug,"));
        assert_eq!(at(3), "trace");
        assert_eq!(at(u8::MAX), "trace");
    }

    #[test]
    fn json_never_uses_ansi() {
        assert!(!LogSettings::new(LogFormat::Json, 1, ColorChoice::Always).ansi);
        assert!(LogSettings::new(LogFormat::Human, 1, ColorChoice::Always).ansi);
        assert!(!LogSettings::new(LogFormat::Human, 1, ColorChoice::Never).ansi);
    }

    #[test]
    fn init_is_repeatable() {
        LogSettings::new(LogFormat::Human, 0, ColorChoice::Never).init();
        LogSettings::new(LogFormat::Json, 3, ColorChoice::Never).init();
    }
}
