//! `validate` command
//!
//! Checks configuration files without starting anything.

use serde_json::json;

use crate::cli::args::{OutputFormat, ValidateArgs};
use crate::config::loader::ConfigLoader;
use crate::error::{ConfigError, ImpostorError, Severity, ValidationIssue};

/// Validate each configuration file.
///
/// # Errors
///
/// Returns a config error naming the last invalid file if any file fails
/// (with `--strict`, warnings count as failures).
pub fn run(args: &ValidateArgs) -> Result<(), ImpostorError> {
    let loader = ConfigLoader::with_defaults();
    let mut failure = None;

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let report = match loader.load(path) {
            Ok(result) => {
                let warnings: Vec<ValidationIssue> = result
                    .warnings
                    .iter()
                    .map(|w| ValidationIssue {
                        path: w.location.clone().unwrap_or_default(),
                        message: w.message.clone(),
                        severity: Severity::Warning,
                    })
                    .collect();
                if args.strict && !warnings.is_empty() {
                    Report::invalid(warnings, Vec::new())
                } else {
                    Report::valid(warnings)
                }
            }
            Err(ConfigError::ValidationError { errors, .. }) => Report::invalid(errors, Vec::new()),
            Err(e) => Report::failed(e.to_string()),
        };

        print_report(args.format, &path.display().to_string(), &report);
        if !report.valid {
            failure = Some(ConfigError::ValidationError {
                path: path.display().to_string(),
                errors: report.errors,
            });
        }
    }

    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

struct Report {
    valid: bool,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
    failure: Option<String>,
}

impl Report {
    const fn valid(warnings: Vec<ValidationIssue>) -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings,
            failure: None,
        }
    }

    const fn invalid(errors: Vec<ValidationIssue>, warnings: Vec<ValidationIssue>) -> Self {
        Self {
            valid: false,
            errors,
            warnings,
            failure: None,
        }
    }

    const fn failed(message: String) -> Self {
        Self {
            valid: false,
            errors: Vec::new(),
            warnings: Vec::new(),
            failure: Some(message),
        }
    }
}

fn issue_json(issue: &ValidationIssue) -> serde_json::Value {
    json!({ "path": issue.path, "message": issue.message })
}

fn print_report(format: OutputFormat, file: &str, report: &Report) {
    match format {
        OutputFormat::Human => {
            if report.valid {
                println!("{file}: ok");
            } else {
                println!("{file}: invalid");
            }
            if let Some(message) = &report.failure {
                println!("  error: {message}");
            }
            for issue in report.errors.iter().chain(&report.warnings) {
                println!("  {issue}");
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                json!({
                    "file": file,
                    "valid": report.valid,
                    "error": report.failure,
                    "errors": report.errors.iter().map(issue_json).collect::<Vec<_>>(),
                    "warnings": report.warnings.iter().map(issue_json).collect::<Vec<_>>(),
                })
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    fn file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn args(files: Vec<PathBuf>, strict: bool) -> ValidateArgs {
        ValidateArgs {
            files,
            format: OutputFormat::Json,
            strict,
        }
    }

    #[test]
    fn valid_file_passes() {
        let f = file("llm:\n  api_key: sk-test\n");
        assert!(run(&args(vec![f.path().to_path_buf()], false)).is_ok());
    }

    #[test]
    fn strict_rejects_warnings() {
        let f = file("game:\n  question_budget: 0\n");
        assert!(run(&args(vec![f.path().to_path_buf()], false)).is_ok());
        assert!(run(&args(vec![f.path().to_path_buf()], true)).is_err());
    }

    #[test]
    fn invalid_and_missing_files_fail() {
        let bad = file("guardrail:\n  threshold: 9\n");
        let err = run(&args(vec![bad.path().to_path_buf()], false)).unwrap_err();
        assert!(matches!(err, ImpostorError::Config(ConfigError::ValidationError { .. })));

        let missing = PathBuf::from("/definitely/not/here.yaml");
        assert!(run(&args(vec![missing], false)).is_err());
    }
}
