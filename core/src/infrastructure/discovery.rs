// core/src/infrastructure/discovery.rs
//
// Recursive script collector. Walks the root folder with `walkdir`,
// classifies every file against the V/R/A grammar, and rejects duplicate
// names or duplicate versions before the deploy engine ever sees them,
// building a name-keyed manifest of scripts.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

use crate::domain::error::DomainError;
use crate::domain::script::Script;

/// Walk `root_folder` recursively and classify every regular file found.
/// Files that don't match any grammar are silently skipped; files that
/// start matching a prefix but violate the grammar propagate the
/// classification error from [`Script::classify`]. Returns scripts sorted
/// by path for deterministic duplicate detection and downstream ordering.
pub fn discover_scripts(
    root_folder: &Path,
    version_number_regex: Option<&Regex>,
) -> Result<Vec<Script>, DomainError> {
    let mut paths: Vec<_> = WalkDir::new(root_folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();

    let mut scripts = Vec::new();
    let mut seen_names: HashMap<String, std::path::PathBuf> = HashMap::new();
    let mut seen_versions: HashMap<String, std::path::PathBuf> = HashMap::new();

    for path in paths {
        let Some(script) = Script::classify(&path, version_number_regex)? else {
            continue;
        };

        let key = script.name.to_lowercase();
        if let Some(first) = seen_names.get(&key) {
            return Err(DomainError::DuplicateName {
                name: script.name.clone(),
                first: first.clone(),
                second: script.file_path.clone(),
            });
        }
        seen_names.insert(key, script.file_path.clone());

        if let Some(version) = script.version() {
            if let Some(_first) = seen_versions.get(version) {
                return Err(DomainError::DuplicateVersion {
                    version: version.to_string(),
                    second: script.file_path.clone(),
                });
            }
            seen_versions.insert(version.to_string(), script.file_path.clone());
        }

        scripts.push(script);
    }

    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::script::ScriptKind;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovers_and_sorts_scripts() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("V1.1__first.sql"), "SELECT 1").unwrap();
        fs::write(dir.path().join("V1.0__zero.sql"), "SELECT 1").unwrap();
        fs::write(dir.path().join("README.md"), "not a script").unwrap();

        let scripts = discover_scripts(dir.path(), None).unwrap();
        assert_eq!(scripts.len(), 2);
    }

    #[test]
    fn recurses_into_subdirectories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/R__view.sql"), "SELECT 1").unwrap();

        let scripts = discover_scripts(dir.path(), None).unwrap();
        assert_eq!(scripts.len(), 1);
        assert_eq!(scripts[0].kind, ScriptKind::Repeatable);
    }

    #[test]
    fn duplicate_name_is_rejected_case_insensitively() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::create_dir_all(dir.path().join("b")).unwrap();
        fs::write(dir.path().join("a/V1__thing.sql"), "SELECT 1").unwrap();
        fs::write(dir.path().join("b/v1__thing.sql"), "SELECT 1").unwrap();

        let err = discover_scripts(dir.path(), None).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateName { .. }));
    }

    #[test]
    fn duplicate_version_across_different_names_is_rejected() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("V1__first.sql"), "SELECT 1").unwrap();
        fs::write(dir.path().join("V1__second.sql"), "SELECT 1").unwrap();

        let err = discover_scripts(dir.path(), None).unwrap_err();
        assert!(matches!(err, DomainError::DuplicateVersion { .. }));
    }

    #[test]
    fn version_regex_mismatch_propagates() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Vabc__first.sql"), "SELECT 1").unwrap();
        let re = Regex::new(r"^\d+$").unwrap();

        let err = discover_scripts(dir.path(), Some(&re)).unwrap_err();
        assert!(matches!(err, DomainError::VersionRegexMismatch { .. }));
    }
}
