// core/src/infrastructure/session_duckdb.rs
//
// A reference `Session` implementation over an embedded DuckDB
// connection, standing in for the real warehouse driver, which this
// crate deliberately leaves out of scope as a collaborator the caller
// supplies. Wraps a `Connection`, translating errors at the boundary;
// kept synchronous since the engine itself is.

use std::time::Instant;

use chrono::Utc;
use duckdb::{params, Connection};
use tracing::{debug, instrument};

use crate::domain::script::Script;
use crate::domain::version::max_alphanumeric;
use crate::ports::session::{
    ChangeHistoryEntry, ChangeHistoryStatus, DeployOutcome, ScriptMetadata, Session, SessionError,
    VersionedAppliedRecord,
};

pub struct DuckDbSession {
    connection: Connection,
    account: String,
    role: String,
    warehouse: String,
    database: String,
    schema: String,
    change_history_table: String,
}

impl DuckDbSession {
    pub fn new(
        connection: Connection,
        account: impl Into<String>,
        role: impl Into<String>,
        warehouse: impl Into<String>,
        database: impl Into<String>,
        schema: impl Into<String>,
        change_history_table: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            account: account.into(),
            role: role.into(),
            warehouse: warehouse.into(),
            database: database.into(),
            schema: schema.into(),
            change_history_table: change_history_table.into(),
        }
    }

    fn create_table_if_missing(&self) -> Result<(), duckdb::Error> {
        self.connection.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version VARCHAR,
                script VARCHAR NOT NULL,
                checksum VARCHAR NOT NULL,
                execution_time_seconds BIGINT NOT NULL,
                status VARCHAR NOT NULL,
                error_message VARCHAR,
                installed_on TIMESTAMP NOT NULL,
                installed_by VARCHAR NOT NULL
            )",
            self.change_history_table
        ))
    }

    fn insert_row(&self, entry: &ChangeHistoryEntry<'_>, actor: &str) -> Result<(), duckdb::Error> {
        let version = entry.script.version();
        self.connection.execute(
            &format!(
                "INSERT INTO {} (version, script, checksum, execution_time_seconds, status, error_message, installed_on, installed_by)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                self.change_history_table
            ),
            params![
                version,
                entry.script.name,
                entry.checksum,
                entry.execution_time_seconds as i64,
                entry.status.as_str(),
                entry.error_message,
                Utc::now().to_rfc3339(),
                actor,
            ],
        )?;
        Ok(())
    }
}

impl Session for DuckDbSession {
    #[instrument(skip(self))]
    fn get_script_metadata(
        &mut self,
        create_change_history_table: bool,
        dry_run: bool,
    ) -> Result<ScriptMetadata, SessionError> {
        if create_change_history_table && !dry_run {
            self.create_table_if_missing().map_err(SessionError::new)?;
        }

        let mut metadata = ScriptMetadata::default();

        let table_exists = self
            .connection
            .prepare(&format!("SELECT 1 FROM {} LIMIT 1", self.change_history_table))
            .is_ok();
        if !table_exists {
            return Ok(metadata);
        }

        let mut stmt = self
            .connection
            .prepare(&format!(
                "SELECT version, script, checksum FROM {} WHERE status = 'Success' AND version IS NOT NULL ORDER BY installed_on ASC",
                self.change_history_table
            ))
            .map_err(SessionError::new)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(SessionError::new)?;
        for row in rows {
            let (version, script, checksum) = row.map_err(SessionError::new)?;
            metadata.versioned_applied.insert(
                script.clone(),
                VersionedAppliedRecord {
                    version,
                    script,
                    checksum,
                },
            );
        }

        let mut stmt = self
            .connection
            .prepare(&format!(
                "SELECT script, checksum FROM {} WHERE status = 'Success' AND version IS NULL ORDER BY installed_on ASC",
                self.change_history_table
            ))
            .map_err(SessionError::new)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(SessionError::new)?;
        for row in rows {
            let (script, checksum) = row.map_err(SessionError::new)?;
            metadata.repeatable_checksums.insert(script, checksum);
        }

        let versions: Vec<&str> = metadata
            .versioned_applied
            .values()
            .map(|r| r.version.as_str())
            .collect();
        metadata.max_published_version = max_alphanumeric(versions).map(String::from);

        Ok(metadata)
    }

    #[instrument(skip(self, script_content), fields(script = %script.name))]
    fn apply_change_script(
        &mut self,
        script: &Script,
        script_content: &str,
        dry_run: bool,
        out_of_order: bool,
    ) -> Result<DeployOutcome, SessionError> {
        debug!(out_of_order, "applying SQL script");
        if dry_run {
            return Ok(DeployOutcome::DryRun);
        }

        let started = Instant::now();
        let result = self.connection.execute_batch(script_content);
        let elapsed = started.elapsed().as_secs_f64().round() as u64;

        let checksum = crate::domain::checksum::sha224_hex(script_content);
        match result {
            Ok(()) => {
                self.insert_row(
                    &ChangeHistoryEntry {
                        script,
                        checksum: &checksum,
                        execution_time_seconds: elapsed,
                        status: ChangeHistoryStatus::Success,
                        error_message: None,
                    },
                    &self.role.clone(),
                )
                .map_err(SessionError::new)?;
                Ok(DeployOutcome::Applied)
            }
            Err(e) => {
                let message = e.to_string();
                self.insert_row(
                    &ChangeHistoryEntry {
                        script,
                        checksum: &checksum,
                        execution_time_seconds: elapsed,
                        status: ChangeHistoryStatus::Failed,
                        error_message: Some(&message),
                    },
                    &self.role.clone(),
                )
                .map_err(SessionError::new)?;
                Err(SessionError::new(e))
            }
        }
    }

    fn record_change_history(&mut self, entry: ChangeHistoryEntry<'_>) -> Result<(), SessionError> {
        let actor = self.role.clone();
        self.insert_row(&entry, &actor).map_err(SessionError::new)
    }

    fn account(&self) -> &str {
        &self.account
    }

    fn role(&self) -> &str {
        &self.role
    }

    fn warehouse(&self) -> &str {
        &self.warehouse
    }

    fn database(&self) -> &str {
        &self.database
    }

    fn schema(&self) -> &str {
        &self.schema
    }

    fn change_history_table_fqn(&self) -> &str {
        &self.change_history_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::script::{ScriptFormat, ScriptKind as SK};
    use std::path::PathBuf;

    fn session() -> DuckDbSession {
        let conn = Connection::open_in_memory().unwrap();
        DuckDbSession::new(conn, "acct", "role", "wh", "db", "schema", "change_history")
    }

    fn script(name: &str, version: &str) -> Script {
        Script {
            name: name.to_string(),
            file_path: PathBuf::from(name),
            description: "test".to_string(),
            kind: SK::Versioned {
                version: version.to_string(),
            },
            format: ScriptFormat::Sql,
        }
    }

    #[test]
    fn fresh_session_has_no_history() {
        let mut s = session();
        let metadata = s.get_script_metadata(true, false).unwrap();
        assert!(metadata.versioned_applied.is_empty());
        assert_eq!(metadata.max_published_version, None);
    }

    #[test]
    fn applying_a_script_records_success_and_feeds_back_into_metadata() {
        let mut s = session();
        s.get_script_metadata(true, false).unwrap();
        let script = script("V1__init.sql", "1");
        s.apply_change_script(&script, "CREATE TABLE t (id INT)", false, false)
            .unwrap();

        let metadata = s.get_script_metadata(false, false).unwrap();
        assert_eq!(metadata.versioned_applied.get("V1__init.sql").unwrap().version, "1");
        assert_eq!(metadata.max_published_version.as_deref(), Some("1"));
    }

    #[test]
    fn dry_run_apply_does_not_write_history() {
        let mut s = session();
        s.get_script_metadata(true, false).unwrap();
        let script = script("V1__init.sql", "1");
        s.apply_change_script(&script, "CREATE TABLE t (id INT)", true, false)
            .unwrap();

        let metadata = s.get_script_metadata(false, false).unwrap();
        assert!(metadata.versioned_applied.is_empty());
    }
}
