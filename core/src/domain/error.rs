// core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;
use std::path::PathBuf;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("two underscores are required between \"{prefix}\" and the description: {file_path}")]
    #[diagnostic(code(schemachange::domain::grammar))]
    MissingSeparator { prefix: String, file_path: PathBuf },

    #[error("Versioned migrations must be prefixed with a version: {file_path}")]
    #[diagnostic(code(schemachange::domain::missing_version))]
    MissingVersion { file_path: PathBuf },

    #[error(
        "change script version doesn't match the supplied regular expression: {regex}\n{file_path}"
    )]
    #[diagnostic(code(schemachange::domain::version_regex))]
    VersionRegexMismatch { regex: String, file_path: PathBuf },

    #[error(
        "The script name {name} exists more than once (first instance {first}, second instance {second})"
    )]
    #[diagnostic(code(schemachange::domain::duplicate_name))]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("The script version {version} exists more than once (second instance {second})")]
    #[diagnostic(code(schemachange::domain::duplicate_version))]
    DuplicateVersion { version: String, second: PathBuf },

    #[error("Versioned script will never be applied: {name}\nVersion number is less than the max version number: {max_published_version}")]
    #[diagnostic(
        code(schemachange::domain::ignored_versioned_script),
        help("Enable --out-of-order, or bump the version above the max published version.")
    )]
    IgnoredVersionedScript {
        name: String,
        max_published_version: String,
    },

    #[error("{0} change script(s) failed: {1}")]
    #[diagnostic(code(schemachange::domain::deploy_failed))]
    DeployFailed(usize, String),
}
