// schemachange/src/main.rs

mod cli;

use clap::Parser;
use duckdb::Connection;

use deploy_core::application::deploy;
use deploy_core::infrastructure::config::DeployConfig;
use deploy_core::infrastructure::session_duckdb::DuckDbSession;

use cli::Cli;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let mut config = match DeployConfig::discover(&cli.config_folder)? {
        Some(config) => config,
        None => {
            let root_folder = cli.root_folder.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "no schemachange-config.yml found under {:?} and --root-folder was not given",
                    cli.config_folder
                )
            })?;
            DeployConfig::with_root_folder(root_folder)
        }
    };

    if let Some(root_folder) = &cli.root_folder {
        config.root_folder = root_folder.clone();
    }
    if cli.modules_folder.is_some() {
        config.modules_folder = cli.modules_folder.clone();
    }
    for (key, value) in &cli.vars {
        config
            .config_vars
            .insert(key.clone(), serde_yaml::Value::String(value.clone()));
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    config = config.with_out_of_order_flag(cli.out_of_order);
    if cli.raise_exception_on_ignored_versioned_script {
        config.raise_exception_on_ignored_versioned_script = true;
    }
    if cli.continue_versioned_on_error {
        config.continue_versioned_on_error = true;
    }
    if cli.continue_repeatable_on_error {
        config.continue_repeatable_on_error = true;
    }
    if cli.continue_always_on_error {
        config.continue_always_on_error = true;
    }
    if let Some(regex) = &cli.version_number_validation_regex {
        config.version_number_validation_regex = Some(regex.clone());
    }

    tracing::info!(
        root_folder = %config.root_folder.display(),
        dry_run = config.dry_run,
        out_of_order = config.effective_out_of_order(),
        "starting deploy"
    );

    let connection = if cli.db_path == ":memory:" {
        Connection::open_in_memory()
    } else {
        Connection::open(&cli.db_path)
    }
    .map_err(|e| anyhow::anyhow!("failed to open DuckDB database at {}: {e}", cli.db_path))?;

    let mut session = DuckDbSession::new(
        connection,
        cli.account,
        cli.role,
        cli.warehouse,
        cli.database,
        cli.schema,
        cli.change_history_table,
    );

    match deploy(&config, &mut session) {
        Ok(report) => {
            println!(
                "\u{2728} deploy complete: {} applied, {} skipped",
                report.applied, report.skipped
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("\u{1F4A5} deploy failed: {e}");
            std::process::exit(1);
        }
    }
}
