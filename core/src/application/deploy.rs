// core/src/application/deploy.rs
//
// The deploy engine: orchestrates discovery -> render -> decision ->
// dispatch -> record, strictly sequentially: single-threaded, synchronous,
// no script begins before the previous one's history row is written. No
// parallel or async execution; every script is a fully sequential pass.

use std::collections::HashMap;
use std::path::Path;

use tracing::{error, info, instrument, warn};

use crate::domain::checksum::sha224_hex;
use crate::domain::error::DomainError;
use crate::domain::script::{Script, ScriptFormat, ScriptKind};
use crate::domain::version::AlphaKey;
use crate::error::DeployError;
use crate::infrastructure::cli_exec;
use crate::infrastructure::config::DeployConfig;
use crate::infrastructure::discovery::discover_scripts;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::template::TemplateRenderer;
use crate::ports::session::{ChangeHistoryEntry, ChangeHistoryStatus, ScriptMetadata, Session};

#[derive(Debug, Clone, Default)]
pub struct DeployReport {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_scripts: Vec<String>,
}

/// Run one full deploy pass against `session`.
#[instrument(skip(config, session), fields(root = %config.root_folder.display()))]
pub fn deploy(config: &DeployConfig, session: &mut dyn Session) -> Result<DeployReport, DeployError> {
    let version_regex = config.version_number_regex()?;

    let metadata = session
        .get_script_metadata(config.create_change_history_table, config.dry_run)
        .map_err(DeployError::Session)?;
    let mpv_key = metadata.max_published_version.as_deref().map(AlphaKey::new);

    let scripts = discover_scripts(&config.root_folder, version_regex.as_ref())?;
    let ordered = order_by_kind_then_name(&scripts);

    let renderer = TemplateRenderer::new(config.root_folder.clone(), config.modules_folder.clone());
    // Snapshot the parent environment once; mutation by one step's
    // subprocess must never be visible to a later script's rendering or
    // subprocess environment.
    let base_env: HashMap<String, String> = std::env::vars().collect();

    let mut report = DeployReport::default();

    for script in ordered {
        if let Err(decision_err) = run_one_script(
            script,
            config,
            session,
            &renderer,
            &base_env,
            &metadata,
            mpv_key.as_ref(),
            &mut report,
        ) {
            return Err(decision_err);
        }
    }

    if report.failed > 0 {
        return Err(DeployError::Domain(DomainError::DeployFailed(
            report.failed,
            report.failed_scripts.join(", "),
        )));
    }

    info!(
        applied = report.applied,
        skipped = report.skipped,
        "deploy completed successfully"
    );
    Ok(report)
}

fn order_by_kind_then_name(scripts: &[Script]) -> Vec<&Script> {
    let mut versioned: Vec<&Script> = scripts
        .iter()
        .filter(|s| matches!(s.kind, ScriptKind::Versioned { .. }))
        .collect();
    let mut repeatable: Vec<&Script> = scripts
        .iter()
        .filter(|s| matches!(s.kind, ScriptKind::Repeatable))
        .collect();
    let mut always: Vec<&Script> = scripts
        .iter()
        .filter(|s| matches!(s.kind, ScriptKind::Always))
        .collect();

    let by_name = |a: &&Script, b: &&Script| AlphaKey::new(&a.name).cmp(&AlphaKey::new(&b.name));
    versioned.sort_by(by_name);
    repeatable.sort_by(by_name);
    always.sort_by(by_name);

    versioned.into_iter().chain(repeatable).chain(always).collect()
}

#[instrument(skip_all, fields(script = %script.name, kind = ?script.kind))]
#[allow(clippy::too_many_arguments)]
fn run_one_script(
    script: &Script,
    config: &DeployConfig,
    session: &mut dyn Session,
    renderer: &TemplateRenderer,
    base_env: &HashMap<String, String>,
    metadata: &ScriptMetadata,
    mpv_key: Option<&AlphaKey>,
    report: &mut DeployReport,
) -> Result<(), DeployError> {
    let relative_path = relative_to(&script.file_path, &config.root_folder);
    let canonical = renderer.render(&relative_path, script.format, &config.config_vars)?;
    let checksum = sha224_hex(&canonical);

    match &script.kind {
        ScriptKind::Versioned { version } => {
            if let Some(applied) = metadata.versioned_applied.get(&script.name) {
                if applied.checksum != checksum {
                    warn!(script = %script.name, "checksum has drifted since last application");
                }
                report.skipped += 1;
                return Ok(());
            }

            let version_key = AlphaKey::new(version);
            let below_max = mpv_key.is_some_and(|mpv| &version_key <= mpv);
            if !config.effective_out_of_order() && below_max {
                if config.raise_exception_on_ignored_versioned_script {
                    return Err(DeployError::Domain(DomainError::IgnoredVersionedScript {
                        name: script.name.clone(),
                        max_published_version: metadata.max_published_version.clone().unwrap_or_default(),
                    }));
                }
                report.skipped += 1;
                return Ok(());
            }
        }
        ScriptKind::Repeatable => {
            if let Some(last) = metadata.repeatable_checksums.get(&script.name) {
                if last == &checksum {
                    report.skipped += 1;
                    return Ok(());
                }
            }
        }
        ScriptKind::Always => {}
    }

    let is_out_of_order = matches!(&script.kind, ScriptKind::Versioned { version }
        if config.effective_out_of_order() && mpv_key.is_some_and(|mpv| &AlphaKey::new(version) <= mpv));

    let should_continue = match &script.kind {
        ScriptKind::Versioned { .. } => config.continue_versioned_on_error,
        ScriptKind::Repeatable => config.continue_repeatable_on_error,
        ScriptKind::Always => config.continue_always_on_error,
    };

    let executable = TemplateRenderer::prepare_for_execution(&canonical, script.format);

    let dispatch_result = dispatch(
        script,
        &executable,
        &checksum,
        config,
        session,
        base_env,
        is_out_of_order,
    );

    if let Err(err) = dispatch_result {
        error!(script = %script.name, error = %err, "script failed");
        report.failed += 1;
        report.failed_scripts.push(script.name.clone());
        if !should_continue {
            return Err(err);
        }
        return Ok(());
    }

    report.applied += 1;
    Ok(())
}

fn dispatch(
    script: &Script,
    executable: &str,
    checksum: &str,
    config: &DeployConfig,
    session: &mut dyn Session,
    base_env: &HashMap<String, String>,
    is_out_of_order: bool,
) -> Result<(), DeployError> {
    match script.format {
        ScriptFormat::Sql => {
            session
                .apply_change_script(script, executable, config.dry_run, is_out_of_order)
                .map_err(DeployError::Session)?;
            Ok(())
        }
        ScriptFormat::Cli => {
            let started = std::time::Instant::now();
            let outcome = cli_exec::execute_cli_script(
                executable,
                &script.name,
                &script.file_path,
                &config.root_folder,
                base_env,
                config.dry_run,
            );
            match outcome {
                Ok(elapsed_secs) => {
                    if !config.dry_run {
                        session
                            .record_change_history(ChangeHistoryEntry {
                                script,
                                checksum,
                                execution_time_seconds: elapsed_secs,
                                status: ChangeHistoryStatus::Success,
                                error_message: None,
                            })
                            .map_err(DeployError::Session)?;
                    }
                    Ok(())
                }
                Err(e) => {
                    let elapsed_secs = started.elapsed().as_secs_f64().round() as u64;
                    let error_message = e.to_string();
                    if !config.dry_run {
                        session
                            .record_change_history(ChangeHistoryEntry {
                                script,
                                checksum,
                                execution_time_seconds: elapsed_secs,
                                status: ChangeHistoryStatus::Failed,
                                error_message: Some(&error_message),
                            })
                            .map_err(DeployError::Session)?;
                    }
                    Err(DeployError::Infrastructure(InfrastructureError::from(e)))
                }
            }
        }
    }
}

fn relative_to(path: &Path, root: &Path) -> std::path::PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
