// core/src/infrastructure/template.rs
//
// The two-phase template contract. `render` produces the canonical
// form that feeds the checksum and must never change behaviour across
// engine versions: the trailing-semicolon rule lives here, not
// in `prepare_for_execution`. `prepare_for_execution` takes the canonical
// form and applies the warehouse-specific trailing comment fix just
// before dispatch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

use crate::domain::script::ScriptFormat;
use crate::infrastructure::error::InfrastructureError;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Could not find environmental variable {0} and no default value was provided")]
    MissingEnvVar(String),

    #[error("Script '{0}' rendered to empty content. Check Jinja variables and conditional blocks.")]
    EmptyContent(String),

    #[error("Script '{0}' contains only comments or semicolons. Add SQL statements or remove the script.")]
    CommentOnly(String),

    #[error(
        "CLI script '{0}' rendered to empty content. Check template variables and conditional blocks."
    )]
    CliEmptyContent(String),

    #[error(transparent)]
    Template(#[from] minijinja::Error),
}

fn line_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--[^\n]*").expect("static regex"))
}

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("static regex"))
}

fn strip_sql_comments(s: &str) -> String {
    let without_lines = line_comment_re().replace_all(s, "");
    block_comment_re().replace_all(&without_lines, "").into_owned()
}

pub struct TemplateRenderer {
    project_root: PathBuf,
    modules_folder: Option<PathBuf>,
}

impl TemplateRenderer {
    pub fn new(project_root: impl Into<PathBuf>, modules_folder: Option<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            modules_folder,
        }
    }

    fn resolve_path(&self, relative: &Path) -> PathBuf {
        let mut components = relative.components();
        if let (Some(first), Some(modules)) = (components.next(), &self.modules_folder) {
            if first.as_os_str() == "modules" {
                return modules.join(components.as_path());
            }
        }
        self.project_root.join(relative)
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_function("env_var", env_var);
        env
    }

    /// Produce the canonical form of `relative_path`: the bytes that feed
    /// the checksum. Stable across engine versions by construction.
    pub fn render(
        &self,
        relative_path: &Path,
        format: ScriptFormat,
        variables: &HashMap<String, serde_yaml::Value>,
    ) -> Result<String, InfrastructureError> {
        let script_path = self.resolve_path(relative_path);
        let raw_template = std::fs::read_to_string(&script_path)?;

        let env = self.environment();
        let rendered = env
            .render_str(&raw_template, variables)
            .map_err(|e| InfrastructureError::Render(RenderError::from(e)))?;

        let without_bom = rendered.strip_prefix('\u{feff}').unwrap_or(&rendered);
        let trimmed = without_bom.trim();

        let script_name = relative_path.to_string_lossy().to_string();

        match format {
            ScriptFormat::Cli => {
                if trimmed.is_empty() {
                    return Err(InfrastructureError::Render(RenderError::CliEmptyContent(
                        script_name,
                    )));
                }
                Ok(trimmed.to_string())
            }
            ScriptFormat::Sql => {
                let content = if trimmed.ends_with(';') {
                    &trimmed[..trimmed.len() - 1]
                } else {
                    trimmed
                };

                if content.is_empty() || content.trim().is_empty() {
                    return Err(InfrastructureError::Render(RenderError::EmptyContent(
                        script_name,
                    )));
                }

                let stripped = strip_sql_comments(content).replace(';', "");
                if stripped.trim().is_empty() {
                    return Err(InfrastructureError::Render(RenderError::CommentOnly(
                        script_name,
                    )));
                }

                Ok(content.to_string())
            }
        }
    }

    /// Produce the executable form of an already-rendered canonical string.
    /// CLI scripts pass through unchanged; SQL scripts may get the
    /// trailing-comment fix appended.
    pub fn prepare_for_execution(content: &str, format: ScriptFormat) -> String {
        if format == ScriptFormat::Cli {
            return content.to_string();
        }

        let Some(last_semi) = last_real_semicolon(content) else {
            return content.to_string();
        };

        let tail = &content[last_semi + 1..];
        if !tail.contains('\n') {
            return content.to_string();
        }

        let stripped_tail = strip_sql_comments(tail);
        if !stripped_tail.trim().is_empty() {
            return content.to_string();
        }

        if tail.trim().is_empty() {
            // Nothing but whitespace after the semicolon: nothing to fix.
            return content.to_string();
        }

        format!(
            "{}\nSELECT 1; -- schemachange: trailing comment fix",
            content.trim_end()
        )
    }
}

fn env_var(name: String, default: Option<String>) -> Result<String, minijinja::Error> {
    match std::env::var(&name) {
        Ok(value) => Ok(value),
        Err(_) => default.ok_or_else(|| {
            minijinja::Error::new(
                minijinja::ErrorKind::UndefinedError,
                RenderError::MissingEnvVar(name).to_string(),
            )
        }),
    }
}

/// Index of the last `;` that is not inside a `--` line comment or a
/// `/* ... */` block comment, scanning left to right.
fn last_real_semicolon(s: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = s.char_indices().collect();
    let n = chars.len();
    let mut i = 0;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut last_semi = None;

    while i < n {
        let (idx, c) = chars[i];

        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
            }
            i += 1;
            continue;
        }
        if in_block_comment {
            if c == '*' && i + 1 < n && chars[i + 1].1 == '/' {
                in_block_comment = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }

        if c == '-' && i + 1 < n && chars[i + 1].1 == '-' {
            in_line_comment = true;
            i += 2;
            continue;
        }
        if c == '/' && i + 1 < n && chars[i + 1].1 == '*' {
            in_block_comment = true;
            i += 2;
            continue;
        }
        if c == ';' {
            last_semi = Some(idx);
        }
        i += 1;
    }

    last_semi
}
