// core/src/domain/script.rs
//
// The script record and the filename classifier. A script is represented
// as a tagged variant: `ScriptKind` carries the V/R/A distinction (and
// the version string for V), `ScriptFormat` is the orthogonal SQL/CLI axis.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::domain::error::DomainError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    /// Apply once, in strict version order.
    Versioned { version: String },
    /// Apply whenever the rendered content changes.
    Repeatable,
    /// Apply on every deploy run.
    Always,
}

impl ScriptKind {
    fn letter(&self) -> char {
        match self {
            ScriptKind::Versioned { .. } => 'V',
            ScriptKind::Repeatable => 'R',
            ScriptKind::Always => 'A',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFormat {
    Sql,
    Cli,
}

/// An immutable migration script record, constructed once during discovery.
#[derive(Debug, Clone)]
pub struct Script {
    pub name: String,
    pub file_path: PathBuf,
    pub description: String,
    pub kind: ScriptKind,
    pub format: ScriptFormat,
}

impl Script {
    pub fn version(&self) -> Option<&str> {
        match &self.kind {
            ScriptKind::Versioned { version } => Some(version),
            _ => None,
        }
    }

    /// A descriptive string such as `"V(1.2.3) SQL"` or `"R A CLI"`, used in
    /// log lines and error messages.
    pub fn type_desc(&self) -> String {
        match &self.kind {
            ScriptKind::Versioned { version } => {
                format!("V({version}) {}", self.format_desc())
            }
            ScriptKind::Repeatable => format!("R {}", self.format_desc()),
            ScriptKind::Always => format!("A {}", self.format_desc()),
        }
    }

    fn format_desc(&self) -> &'static str {
        match self.format {
            ScriptFormat::Sql => "SQL",
            ScriptFormat::Cli => "CLI",
        }
    }

    /// Script name is the filename without any trailing `.jinja` extension;
    /// `.sql` or `.cli.yml` stays in the name.
    pub fn script_name(file_path: &Path) -> String {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if file_name.len() >= 6 && file_name[file_name.len() - 6..].eq_ignore_ascii_case(".jinja") {
            file_name[..file_name.len() - 6].to_string()
        } else {
            file_name
        }
    }

    /// Classify a file against the V/R/A grammars, trying SQL extensions
    /// first then CLI extensions. Returns `Ok(None)` for files that
    /// don't match any grammar (they are silently ignored), `Err` for a file
    /// that starts matching a prefix but violates the grammar (missing
    /// separator, missing version, version regex mismatch).
    pub fn classify(
        file_path: &Path,
        version_number_regex: Option<&Regex>,
    ) -> Result<Option<Script>, DomainError> {
        let name = Self::script_name(file_path);

        let (format, stem) = if let Some(stem) = strip_suffix_ci(&name, ".sql") {
            (ScriptFormat::Sql, stem)
        } else if let Some(stem) = strip_suffix_ci(&name, ".cli.yml") {
            (ScriptFormat::Cli, stem)
        } else {
            return Ok(None);
        };

        let first = match stem.chars().next() {
            Some(c) => c,
            None => return Ok(None),
        };
        let rest = &stem[1..];

        match first.to_ascii_uppercase() {
            'V' => {
                let Some((version, sep_len, description)) = split_versioned(rest) else {
                    return Ok(None);
                };
                let Some(version) = version else {
                    return Err(DomainError::MissingVersion {
                        file_path: file_path.to_path_buf(),
                    });
                };
                if sep_len != 2 {
                    return Err(DomainError::MissingSeparator {
                        prefix: format!("V{version}"),
                        file_path: file_path.to_path_buf(),
                    });
                }
                if let Some(re) = version_number_regex {
                    if !re.is_match(&version) {
                        return Err(DomainError::VersionRegexMismatch {
                            regex: re.as_str().to_string(),
                            file_path: file_path.to_path_buf(),
                        });
                    }
                }
                Ok(Some(Script {
                    name,
                    file_path: file_path.to_path_buf(),
                    description: display_description(&description),
                    kind: ScriptKind::Versioned { version },
                    format,
                }))
            }
            'R' => classify_unversioned(rest, name.clone(), file_path, format, ScriptKind::Repeatable),
            'A' => classify_unversioned(rest, name.clone(), file_path, format, ScriptKind::Always),
            _ => Ok(None),
        }
    }
}

fn classify_unversioned(
    rest: &str,
    name: String,
    file_path: &Path,
    format: ScriptFormat,
    kind: ScriptKind,
) -> Result<Option<Script>, DomainError> {
    let chars: Vec<char> = rest.chars().collect();
    let run = leading_underscore_run(&chars);
    if run == 0 {
        return Ok(None);
    }
    let sep_len = run.min(2);
    let description: String = chars[sep_len..].iter().collect();
    if description.is_empty() {
        return Ok(None);
    }
    if sep_len != 2 {
        return Err(DomainError::MissingSeparator {
            prefix: kind.letter().to_string(),
            file_path: file_path.to_path_buf(),
        });
    }
    Ok(Some(Script {
        name,
        file_path: file_path.to_path_buf(),
        description: display_description(&description),
        kind,
        format,
    }))
}

/// Case-insensitively strip `suffix` from `s`, returning the remainder.
fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    if s.len() >= suffix.len() && s[s.len() - suffix.len()..].eq_ignore_ascii_case(suffix) {
        Some(&s[..s.len() - suffix.len()])
    } else {
        None
    }
}

fn leading_underscore_run(chars: &[char]) -> usize {
    chars.iter().take_while(|&&c| c == '_').count()
}

/// Split the portion of a V-filename following the leading `V` into
/// `(version, separator_len, description)`. `version` swallows single
/// underscores (it stops at the first run of two-or-more, which becomes the
/// separator); when no separator of any width exists at all, returns `None`
/// (the file doesn't match the grammar and is ignored upstream).
fn split_versioned(rest: &str) -> Option<(Option<String>, usize, String)> {
    let chars: Vec<char> = rest.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '_' {
            let start = i;
            let mut j = i;
            while j < chars.len() && chars[j] == '_' {
                j += 1;
            }
            let run_len = j - start;
            if run_len >= 2 {
                let sep_len = run_len.min(2);
                let description: String = chars[start + sep_len..].iter().collect();
                if description.is_empty() {
                    return None;
                }
                let version: String = chars[..start].iter().collect();
                let version = if version.is_empty() { None } else { Some(version) };
                return Some((version, sep_len, description));
            }
            i = j;
        } else {
            i += 1;
        }
    }

    // No double-underscore run anywhere: version greedily wants everything,
    // so back off to the rightmost single underscore that leaves a non-empty
    // description.
    if let Some(last) = chars.iter().rposition(|&c| c == '_') {
        let description: String = chars[last + 1..].iter().collect();
        if description.is_empty() {
            return None;
        }
        let version: String = chars[..last].iter().collect();
        let version = if version.is_empty() { None } else { Some(version) };
        return Some((version, 1, description));
    }

    None
}

/// Underscores become spaces, first letter uppercased.
fn display_description(raw: &str) -> String {
    let spaced = raw.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => spaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(name: &str) -> Result<Option<Script>, DomainError> {
        Script::classify(Path::new(name), None)
    }

    #[test]
    fn versioned_sql_script() {
        let script = classify("V1.2.3__do_thing.sql").unwrap().unwrap();
        assert_eq!(script.version(), Some("1.2.3"));
        assert_eq!(script.description, "Do thing");
        assert_eq!(script.format, ScriptFormat::Sql);
        assert_eq!(script.name, "V1.2.3__do_thing.sql");
    }

    #[test]
    fn repeatable_sql_script() {
        let script = classify("R__view.sql").unwrap().unwrap();
        assert_eq!(script.kind, ScriptKind::Repeatable);
        assert_eq!(script.description, "View");
    }

    #[test]
    fn always_cli_script() {
        let script = classify("A__seed.cli.yml").unwrap().unwrap();
        assert_eq!(script.kind, ScriptKind::Always);
        assert_eq!(script.format, ScriptFormat::Cli);
    }

    #[test]
    fn jinja_suffix_stripped_from_name_but_extension_kept() {
        let script = classify("V1__deploy.cli.yml.jinja").unwrap().unwrap();
        assert_eq!(script.name, "V1__deploy.cli.yml");
        assert_eq!(script.format, ScriptFormat::Cli);
    }

    #[test]
    fn single_underscore_separator_is_rejected() {
        let err = classify("V1_foo.sql").unwrap_err();
        assert!(matches!(err, DomainError::MissingSeparator { .. }));
    }

    #[test]
    fn single_underscore_separator_rejected_for_repeatable() {
        let err = classify("R_view.sql").unwrap_err();
        assert!(matches!(err, DomainError::MissingSeparator { .. }));
    }

    #[test]
    fn missing_version_is_rejected() {
        // "__" right after V with nothing before it: version capture is empty -> None.
        let err = classify("V__nothing.sql").unwrap_err();
        assert!(matches!(err, DomainError::MissingVersion { .. }));
    }

    #[test]
    fn non_matching_file_is_ignored() {
        assert!(classify("README.md").unwrap().is_none());
        assert!(classify("notes.txt").unwrap().is_none());
    }

    #[test]
    fn version_regex_enforced_case_insensitively() {
        let re = Regex::new(r"^\d+\.\d+\.\d+$").unwrap();
        assert!(Script::classify(Path::new("V1.2.3__a.sql"), Some(&re)).is_ok());
        let err = Script::classify(Path::new("Vabc__a.sql"), Some(&re)).unwrap_err();
        assert!(matches!(err, DomainError::VersionRegexMismatch { .. }));
    }

    #[test]
    fn type_desc_format() {
        let script = classify("V1.2.3__a.sql").unwrap().unwrap();
        assert_eq!(script.type_desc(), "V(1.2.3) SQL");
    }
}
