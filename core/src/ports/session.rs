// core/src/ports/session.rs
//
// The warehouse collaborator contract. The engine is written against
// this trait only; `infrastructure::session_duckdb` is one concrete
// implementation used by the reference CLI, but any warehouse driver can
// satisfy the same seam.

use std::collections::HashMap;

use crate::domain::script::Script;

/// A V-record that has previously succeeded, as recorded in the
/// change-history table.
#[derive(Debug, Clone)]
pub struct VersionedAppliedRecord {
    pub version: String,
    pub script: String,
    pub checksum: String,
}

/// Everything the deploy engine needs to know about prior runs before it
/// can decide what to do with the scripts it discovers this run.
#[derive(Debug, Clone, Default)]
pub struct ScriptMetadata {
    /// Keyed by script name.
    pub versioned_applied: HashMap<String, VersionedAppliedRecord>,
    /// Keyed by script name; value is the checksum recorded at last
    /// application.
    pub repeatable_checksums: HashMap<String, String>,
    pub max_published_version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeHistoryStatus {
    Success,
    Failed,
}

impl ChangeHistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeHistoryStatus::Success => "Success",
            ChangeHistoryStatus::Failed => "Failed",
        }
    }
}

/// Opaque wrapper around a session-specific failure. Kept intentionally
/// generic since different warehouse drivers raise different error types;
/// the engine only needs to propagate and log it.
#[derive(Debug)]
pub struct SessionError(Box<dyn std::error::Error + Send + Sync + 'static>);

impl SessionError {
    pub fn new(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        SessionError(Box::new(err))
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

/// What happened when the session dispatched a script, for logging at the
/// call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployOutcome {
    Applied,
    DryRun,
}

/// One row appended to the change-history table.
#[derive(Debug, Clone)]
pub struct ChangeHistoryEntry<'a> {
    pub script: &'a Script,
    pub checksum: &'a str,
    pub execution_time_seconds: u64,
    pub status: ChangeHistoryStatus,
    pub error_message: Option<&'a str>,
}

/// The warehouse collaborator. Every method may perform I/O and fail;
/// attribute getters are read-only and used only for logging.
pub trait Session {
    fn get_script_metadata(
        &mut self,
        create_change_history_table: bool,
        dry_run: bool,
    ) -> Result<ScriptMetadata, SessionError>;

    /// Execute a SQL script's executable text against the warehouse and
    /// write its own history row on success or failure. `out_of_order`
    /// is passed through for record-keeping only.
    fn apply_change_script(
        &mut self,
        script: &Script,
        script_content: &str,
        dry_run: bool,
        out_of_order: bool,
    ) -> Result<DeployOutcome, SessionError>;

    /// Append a history row directly; used by the CLI dispatch path, which
    /// runs outside the warehouse's own SQL execution path.
    fn record_change_history(&mut self, entry: ChangeHistoryEntry<'_>) -> Result<(), SessionError>;

    fn account(&self) -> &str;
    fn role(&self) -> &str;
    fn warehouse(&self) -> &str;
    fn database(&self) -> &str;
    fn schema(&self) -> &str;
    fn change_history_table_fqn(&self) -> &str;
}
