// core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

use crate::infrastructure::cli_exec::CliScriptError;
use crate::infrastructure::template::RenderError;

#[derive(Error, Debug, Diagnostic)]
pub enum DatabaseError {
    #[error("DuckDB engine error: {0}")]
    #[diagnostic(
        code(schemachange::infra::database::duckdb),
        help("An error occurred inside the warehouse session.")
    )]
    DuckDb(#[from] duckdb::Error),
}

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DatabaseError),

    #[error("File system error: {0}")]
    #[diagnostic(code(schemachange::infra::io))]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    #[diagnostic(
        code(schemachange::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No configuration file found at '{0}'")]
    #[diagnostic(code(schemachange::infra::config_missing))]
    ConfigNotFound(String),

    #[error(transparent)]
    #[diagnostic(code(schemachange::infra::template))]
    Render(#[from] RenderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    CliScript(#[from] CliScriptError),
}

impl From<duckdb::Error> for InfrastructureError {
    fn from(err: duckdb::Error) -> Self {
        InfrastructureError::Database(DatabaseError::DuckDb(err))
    }
}
