// core/src/infrastructure/cli_exec.rs
//
// CLI-step scripts: a `.cli.yml` script renders to a YAML document
// listing one or more steps, each naming an allow-listed external tool, a
// whitespace-tokenised command, and optional extra args, a working
// directory, and environment overlay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Tools a CLI step is permitted to invoke. Anything else is rejected
/// before a process is ever spawned, regardless of how it's spelled.
const ALLOWED_TOOLS: &[&str] = &["snow"];

#[derive(Debug, Deserialize)]
struct CliScriptFile {
    steps: Option<serde_yaml::Value>,
}

#[derive(Debug, Deserialize)]
struct RawCliStep {
    cli: String,
    command: String,
    #[serde(default)]
    args: Option<ArgsField>,
    working_dir: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
    #[allow(dead_code)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArgsField {
    One(String),
    Many(Vec<String>),
}

impl ArgsField {
    fn into_vec(self) -> Vec<String> {
        match self {
            ArgsField::One(s) => vec![s],
            ArgsField::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliStep {
    pub cli: String,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
}

#[derive(Error, Debug, Diagnostic)]
pub enum CliParseError {
    #[error("CLI script YAML is malformed: {0}")]
    #[diagnostic(code(schemachange::cli::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("CLI script step {index}: `steps` is required and must be a non-empty list")]
    #[diagnostic(
        code(schemachange::cli::missing_steps),
        help("Add at least one entry under `steps:`.")
    )]
    MissingOrEmptySteps { index: usize },

    #[error("CLI script step {index} is invalid: {reason}")]
    #[diagnostic(code(schemachange::cli::invalid_step))]
    InvalidStep { index: usize, reason: String },
}

/// The full context tuple for a CLI execution failure, preserved verbatim
/// so tests and log lines can inspect every field (per the design notes:
/// `{script_name, script_path, script_type, cli_tool, command, exit_code,
/// stdout, stderr, step_index, original_cause}`).
#[derive(Error, Debug, Diagnostic)]
#[error("CLI step {step_index} of script '{script_name}' (tool '{cli_tool}') failed: {error_message}")]
#[diagnostic(
    code(schemachange::cli::execution_error),
    help("Check the step's stderr output for the underlying tool's diagnostics.")
)]
pub struct CliScriptExecutionError {
    pub script_name: String,
    pub script_path: PathBuf,
    pub script_type: &'static str,
    pub cli_tool: String,
    pub command_string: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub step_index: usize,
    pub error_message: String,
    pub original_exception: Option<String>,
}

/// Sentinel returned for a step run under `dry_run`: no process is spawned.
#[derive(Debug)]
pub enum CliStepOutcome {
    Ran {
        stdout: String,
        stderr: String,
        exit_code: i32,
    },
    DryRun,
}

/// Parse the YAML body of a rendered `.cli.yml` script.
pub fn parse_cli_script(content: &str) -> Result<Vec<CliStep>, CliParseError> {
    let file: CliScriptFile = serde_yaml::from_str(content)?;

    let steps_value = file
        .steps
        .ok_or(CliParseError::MissingOrEmptySteps { index: 0 })?;
    let raw_steps: Vec<serde_yaml::Value> = match steps_value {
        serde_yaml::Value::Sequence(seq) if !seq.is_empty() => seq,
        _ => return Err(CliParseError::MissingOrEmptySteps { index: 0 }),
    };

    raw_steps
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let raw: RawCliStep =
                serde_yaml::from_value(value).map_err(|e| CliParseError::InvalidStep {
                    index,
                    reason: e.to_string(),
                })?;
            if raw.cli.trim().is_empty() {
                return Err(CliParseError::InvalidStep {
                    index,
                    reason: "`cli` must not be empty".to_string(),
                });
            }
            if raw.command.trim().is_empty() {
                return Err(CliParseError::InvalidStep {
                    index,
                    reason: "`command` must not be empty".to_string(),
                });
            }
            Ok(CliStep {
                cli: raw.cli,
                command: raw.command,
                args: raw.args.map(ArgsField::into_vec).unwrap_or_default(),
                working_dir: raw.working_dir,
                env: raw.env,
            })
        })
        .collect()
}

/// Resolve a step's `cli` field to an executable path, per the allow-list
/// rule: a bare name must be both allow-listed and resolvable on `PATH`; a
/// path containing a separator must have an allow-listed basename and must
/// exist on disk. Neither form is allowed to "sneak in" a disallowed tool
/// via a relative or absolute path.
fn resolve_cli_tool(cli: &str) -> Result<PathBuf, String> {
    resolve_cli_tool_on(cli, std::env::var_os("PATH"))
}

/// Same rule as [`resolve_cli_tool`], but with the `PATH` value passed in
/// explicitly so tests can exercise the "not found on PATH" branch without
/// mutating the real process environment.
fn resolve_cli_tool_on(cli: &str, path_var: Option<std::ffi::OsString>) -> Result<PathBuf, String> {
    let path = Path::new(cli);
    let has_separator = cli.contains('/') || cli.contains(std::path::MAIN_SEPARATOR);

    if has_separator {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if !ALLOWED_TOOLS.contains(&basename.as_str()) {
            return Err(format!(
                "CLI tool '{cli}' is not in the allow-list {ALLOWED_TOOLS:?}"
            ));
        }
        if !path.exists() {
            return Err(format!("CLI tool path '{cli}' does not exist"));
        }
        return Ok(path.to_path_buf());
    }

    if !ALLOWED_TOOLS.contains(&cli) {
        return Err(format!(
            "CLI tool '{cli}' is not in the allow-list {ALLOWED_TOOLS:?}"
        ));
    }

    which_on_path(cli, path_var).ok_or_else(|| format!("CLI tool '{cli}' not found in PATH"))
}

/// Minimal `PATH` lookup, equivalent to `shutil.which` for our purposes: no
/// `PATHEXT` handling, since schemachange's allow-listed tools are
/// POSIX-style executables.
fn which_on_path(tool: &str, path_var: Option<std::ffi::OsString>) -> Option<PathBuf> {
    let path_var = path_var?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(tool);
        if candidate.is_file() {
            Some(candidate)
        } else {
            None
        }
    })
}

/// Resolve `working_dir` against `root_folder` when relative. Must exist
/// and be a directory.
fn resolve_working_dir(working_dir: Option<&str>, root_folder: &Path) -> Result<Option<PathBuf>, String> {
    let Some(wd) = working_dir else {
        return Ok(None);
    };
    let candidate = Path::new(wd);
    let resolved = if candidate.is_relative() {
        root_folder.join(candidate)
    } else {
        candidate.to_path_buf()
    };
    if !resolved.is_dir() {
        return Err(format!(
            "working_dir '{wd}' does not exist or is not a directory"
        ));
    }
    Ok(Some(resolved))
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip(step, base_env), fields(cli = %step.cli, step_index))]
fn execute_cli_step(
    step: &CliStep,
    step_index: usize,
    script_name: &str,
    script_path: &Path,
    root_folder: &Path,
    base_env: &HashMap<String, String>,
    dry_run: bool,
) -> Result<CliStepOutcome, CliScriptExecutionError> {
    let args: Vec<&str> = step.command.split_whitespace().collect();
    let mut full_args: Vec<String> = args.into_iter().map(String::from).collect();
    full_args.extend(step.args.iter().cloned());
    let command_string = format!("{} {}", step.cli, full_args.join(" "));

    let build_error = |error_message: String,
                        exit_code: Option<i32>,
                        stdout: String,
                        stderr: String,
                        original_exception: Option<String>| CliScriptExecutionError {
        script_name: script_name.to_string(),
        script_path: script_path.to_path_buf(),
        script_type: "CLI",
        cli_tool: step.cli.clone(),
        command_string: command_string.clone(),
        exit_code,
        stdout,
        stderr,
        step_index,
        error_message,
        original_exception,
    };

    if dry_run {
        info!(command = %command_string, "dry-run: skipping CLI step execution");
        return Ok(CliStepOutcome::DryRun);
    }

    let resolved = resolve_cli_tool(&step.cli)
        .map_err(|msg| build_error(msg, None, String::new(), String::new(), None))?;

    let working_dir = resolve_working_dir(step.working_dir.as_deref(), root_folder)
        .map_err(|msg| build_error(msg, None, String::new(), String::new(), None))?;

    debug!(command = %command_string, "launching CLI step");

    let mut cmd = Command::new(&resolved);
    cmd.args(&full_args);
    cmd.env_clear();
    cmd.envs(base_env);
    cmd.envs(&step.env);
    if let Some(dir) = &working_dir {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|source| {
        let message = match source.kind() {
            std::io::ErrorKind::NotFound => format!("CLI tool '{}' not found in PATH", step.cli),
            std::io::ErrorKind::PermissionDenied => {
                format!("insufficient permissions to launch CLI tool '{}'", step.cli)
            }
            _ => format!("failed to launch CLI tool '{}': {source}", step.cli),
        };
        build_error(message, None, String::new(), String::new(), Some(source.to_string()))
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let exit_code = output.status.code();

    if !output.status.success() {
        let trimmed_stderr = stderr.trim();
        let error_message = if trimmed_stderr.is_empty() {
            format!("CLI step exited with non-zero status {exit_code:?}")
        } else {
            trimmed_stderr.to_string()
        };
        return Err(build_error(error_message, exit_code, stdout, stderr, None));
    }

    info!(exit_code, "CLI step completed");
    Ok(CliStepOutcome::Ran {
        stdout,
        stderr,
        exit_code: exit_code.unwrap_or(0),
    })
}

/// Run every step of an executable-form CLI script in order, stopping at
/// the first failure. Returns the wall-clock duration in whole seconds.
#[allow(clippy::too_many_arguments)]
#[instrument(skip(content, base_env), fields(script = %script_name))]
pub fn execute_cli_script(
    content: &str,
    script_name: &str,
    script_path: &Path,
    root_folder: &Path,
    base_env: &HashMap<String, String>,
    dry_run: bool,
) -> Result<u64, CliScriptError> {
    let steps = parse_cli_script(content)?;

    let started = Instant::now();
    for (index, step) in steps.iter().enumerate() {
        execute_cli_step(step, index, script_name, script_path, root_folder, base_env, dry_run)?;
    }
    let elapsed = started.elapsed().as_secs_f64().round() as u64;
    info!(elapsed_secs = elapsed, steps = steps.len(), "CLI script completed");
    Ok(elapsed)
}

#[derive(Error, Debug, Diagnostic)]
pub enum CliScriptError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] CliParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] CliScriptExecutionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_single_step() {
        let yaml = "steps:\n  - cli: snow\n    command: app deploy\n    args: [\"--yes\"]\n";
        let steps = parse_cli_script(yaml).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].cli, "snow");
        assert_eq!(steps[0].command, "app deploy");
        assert_eq!(steps[0].args, vec!["--yes"]);
    }

    #[test]
    fn scalar_args_is_promoted_to_single_element_list() {
        let yaml = "steps:\n  - cli: snow\n    command: app deploy\n    args: \"--yes\"\n";
        let steps = parse_cli_script(yaml).unwrap();
        assert_eq!(steps[0].args, vec!["--yes"]);
    }

    #[test]
    fn rejects_missing_steps() {
        let yaml = "other: true\n";
        let err = parse_cli_script(yaml).unwrap_err();
        assert!(matches!(err, CliParseError::MissingOrEmptySteps { .. }));
    }

    #[test]
    fn rejects_empty_step_list() {
        let yaml = "steps: []\n";
        let err = parse_cli_script(yaml).unwrap_err();
        assert!(matches!(err, CliParseError::MissingOrEmptySteps { .. }));
    }

    #[test]
    fn rejects_step_without_command() {
        let yaml = "steps:\n  - cli: snow\n    command: \"\"\n";
        let err = parse_cli_script(yaml).unwrap_err();
        assert!(matches!(err, CliParseError::InvalidStep { index: 0, .. }));
    }

    #[test]
    fn defaults_missing_args_to_empty() {
        let yaml = "steps:\n  - cli: snow\n    command: app deploy\n";
        let steps = parse_cli_script(yaml).unwrap();
        assert!(steps[0].args.is_empty());
    }

    #[test]
    fn unsupported_bare_tool_is_rejected() {
        let err = resolve_cli_tool("rm").unwrap_err();
        assert!(err.contains("not in the allow-list"));
    }

    #[test]
    fn unsupported_tool_via_path_is_rejected_even_if_it_existed() {
        let err = resolve_cli_tool("/usr/bin/rm").unwrap_err();
        assert!(err.contains("not in the allow-list"));
    }

    #[test]
    fn allow_listed_tool_at_nonexistent_path_fails_with_path_error() {
        let err = resolve_cli_tool("/no/such/dir/snow").unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn allow_listed_bare_tool_not_on_path_fails_with_not_found() {
        // Passes a fabricated `PATH` directly instead of mutating the real
        // process environment (`std::env::set_var` is `unsafe fn` under this
        // edition, and the crate denies unsafe code).
        let fake_path = std::ffi::OsString::from("/nonexistent/bin");
        let err = resolve_cli_tool_on("snow", Some(fake_path)).unwrap_err();
        assert!(err.contains("not found in PATH"));
    }

    #[test]
    fn allow_listed_bare_tool_with_no_path_set_fails_with_not_found() {
        let err = resolve_cli_tool_on("snow", None).unwrap_err();
        assert!(err.contains("not found in PATH"));
    }

    #[test]
    fn working_dir_must_exist() {
        let dir = tempdir().unwrap();
        let err = resolve_working_dir(Some("does-not-exist"), dir.path()).unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn working_dir_resolved_relative_to_root_folder() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let resolved = resolve_working_dir(Some("sub"), dir.path()).unwrap().unwrap();
        assert_eq!(resolved, dir.path().join("sub"));
    }

    #[test]
    fn full_script_failure_surfaces_typed_error_with_context() {
        let yaml = "steps:\n  - cli: rm\n    command: -rf /\n";
        let dir = tempdir().unwrap();
        let base_env = HashMap::new();
        let err = execute_cli_script(
            yaml,
            "A__seed.cli.yml",
            Path::new("A__seed.cli.yml"),
            dir.path(),
            &base_env,
            false,
        )
        .unwrap_err();
        match err {
            CliScriptError::Execution(e) => {
                assert_eq!(e.step_index, 0);
                assert_eq!(e.cli_tool, "rm");
                assert_eq!(e.script_name, "A__seed.cli.yml");
            }
            other => panic!("expected Execution error, got {other:?}"),
        }
    }

    #[test]
    fn dry_run_previews_even_when_tool_is_not_allow_listed_or_working_dir_is_missing() {
        // Dry-run must preview the command, not fail the deploy: the source
        // logs and returns before resolving the tool or the working dir.
        let yaml =
            "steps:\n  - cli: rm\n    command: -rf /\n    working_dir: does-not-exist\n";
        let dir = tempdir().unwrap();
        let base_env = HashMap::new();
        let elapsed = execute_cli_script(
            yaml,
            "A__seed.cli.yml",
            Path::new("A__seed.cli.yml"),
            dir.path(),
            &base_env,
            true,
        )
        .unwrap();
        assert_eq!(elapsed, 0);
    }
}
