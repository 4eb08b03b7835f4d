// schemachange/src/cli.rs

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "schemachange")]
#[command(version)]
#[command(about = "A schema-migration deploy engine for cloud data warehouses", long_about = None)]
pub struct Cli {
    /// Directory to look for `schemachange-config.yml` / `schemachange.yml` in.
    #[arg(long, default_value = ".")]
    pub config_folder: PathBuf,

    /// Directory containing the migration scripts. Overrides the config
    /// file's `root_folder` when given; required when no config file exists.
    #[arg(long)]
    pub root_folder: Option<PathBuf>,

    /// Directory exposed to templates under the `modules/` prefix.
    #[arg(long)]
    pub modules_folder: Option<PathBuf>,

    /// A template variable as `key=value`. Repeat for multiple variables.
    #[arg(long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    /// Print what would be done without running any script or writing history.
    #[arg(long)]
    pub dry_run: bool,

    /// Permit applying versioned scripts whose version is <= the max
    /// published version. `SCHEMACHANGE_OUT_OF_ORDER` is honored too, but
    /// only when this flag is absent: flag/env both absent means not-set.
    #[arg(long)]
    pub out_of_order: bool,

    /// Fail the run instead of silently skipping an out-of-order versioned script.
    #[arg(long)]
    pub raise_exception_on_ignored_versioned_script: bool,

    /// Keep deploying later scripts after a versioned script fails.
    #[arg(long)]
    pub continue_versioned_on_error: bool,

    /// Keep deploying later scripts after a repeatable script fails.
    #[arg(long)]
    pub continue_repeatable_on_error: bool,

    /// Keep deploying later scripts after an always script fails.
    #[arg(long)]
    pub continue_always_on_error: bool,

    /// Case-insensitive regex every versioned script's version must match.
    #[arg(long)]
    pub version_number_validation_regex: Option<String>,

    /// DuckDB database file backing the reference session. Use `:memory:`
    /// for an ephemeral run with no persisted change history.
    #[arg(long, default_value = "schemachange.duckdb")]
    pub db_path: String,

    #[arg(long, default_value = "schemachange")]
    pub account: String,
    #[arg(long, default_value = "schemachange")]
    pub role: String,
    #[arg(long, default_value = "schemachange")]
    pub warehouse: String,
    #[arg(long, default_value = "schemachange")]
    pub database: String,
    #[arg(long, default_value = "public")]
    pub schema: String,
    #[arg(long, default_value = "CHANGE_HISTORY")]
    pub change_history_table: String,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))
}
