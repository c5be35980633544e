//! Operation dispatch: turns requests into plans or batch writes and runs
//! them on one connection.

use std::collections::HashMap;
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::batch::{apply_file, FileCategory, FileParams, WriteMode, Writer, WriterContext};
use crate::catalog::describe_live_table;
use crate::core::identifier::{RandomNamer, TempNamer};
use crate::core::plan::execute_plan;
use crate::core::schema::{Table, SYNCED_COLUMN};
use crate::core::traits::{Connection, WarningSink};
use crate::error::{ApplyError, Result};
use crate::planner::{plan_alter, plan_create, plan_migration, plan_truncate, Migration};

/// Identifies a table in a database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRef {
    pub database: String,
    pub table: String,
}

/// Create a table, and its database when missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTableRequest {
    pub database: String,
    pub table: Table,
}

/// Bring a live table to the requested shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlterTableRequest {
    pub database: String,
    pub table: Table,
    /// Drop live columns missing from `table`.
    #[serde(default)]
    pub drop_columns: bool,
}

/// Remove (or flag) rows synced before a cutoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruncateRequest {
    pub database: String,
    pub table: String,
    #[serde(default = "default_synced_column")]
    pub synced_column: String,
    pub delete_before: DateTime<Utc>,
    /// Flag rows through this column instead of deleting them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soft_deleted_column: Option<String>,
}

/// Run one migration against a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateRequest {
    pub database: String,
    pub table: String,
    pub migration: Migration,
}

/// Apply categorized batch files to a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBatchRequest {
    pub database: String,
    pub table: Table,
    #[serde(default)]
    pub mode: WriteMode,
    #[serde(default)]
    pub replace_files: Vec<PathBuf>,
    #[serde(default)]
    pub update_files: Vec<PathBuf>,
    #[serde(default)]
    pub delete_files: Vec<PathBuf>,
    #[serde(default)]
    pub earliest_start_files: Vec<PathBuf>,
    /// Base64 AES key per encrypted file.
    #[serde(default)]
    pub keys: HashMap<PathBuf, String>,
    #[serde(default)]
    pub file_params: FileParams,
    /// Rows per commit; the configured default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

/// Result of a batch write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub files: usize,
    pub rows_affected: u64,
}

fn default_synced_column() -> String {
    SYNCED_COLUMN.to_string()
}

/// Runs destination operations on one connection.
pub struct Orchestrator<C: Connection> {
    conn: C,
    names: Box<dyn TempNamer>,
    batch_size: usize,
}

impl<C: Connection> Orchestrator<C> {
    /// Create an orchestrator over an open connection.
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            names: Box::new(RandomNamer),
            batch_size: FileParams::default().batch_size,
        }
    }

    /// Replace the source of temporary-name suffixes.
    pub fn with_temp_namer(mut self, names: Box<dyn TempNamer>) -> Self {
        self.names = names;
        self
    }

    /// Rows per commit for requests that do not set their own.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The underlying connection.
    pub fn connection(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Give the connection back.
    pub fn into_connection(self) -> C {
        self.conn
    }

    /// Check that the connection answers queries.
    pub async fn test_connection(&mut self) -> Result<()> {
        match self.conn.query_scalar("SELECT 1").await?.as_deref() {
            Some("1") => {
                info!("Connection test succeeded");
                Ok(())
            }
            other => Err(ApplyError::connection(
                format!("unexpected answer {:?}", other),
                "testing connection",
            )),
        }
    }

    /// Describe a live table, `None` when it does not exist.
    pub async fn describe_table(&mut self, target: &TableRef) -> Result<Option<Table>> {
        match describe_live_table(&mut self.conn, &target.database, &target.table).await {
            Ok(table) => Ok(Some(table)),
            Err(e) if e.is_table_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_table(
        &mut self,
        request: &CreateTableRequest,
        warnings: &mut dyn WarningSink,
    ) -> Result<()> {
        let exists = self.conn.database_exists(&request.database).await?;
        let plan = plan_create(&request.database, &request.table, exists)?;
        execute_plan(&mut self.conn, &plan, warnings).await?;
        info!("Created {}.{}", request.database, request.table.name);
        Ok(())
    }

    /// Alter a live table. Returns whether anything changed.
    pub async fn alter_table(
        &mut self,
        request: &AlterTableRequest,
        warnings: &mut dyn WarningSink,
    ) -> Result<bool> {
        let live = describe_live_table(&mut self.conn, &request.database, &request.table.name).await?;
        let plan = plan_alter(
            &request.database,
            &request.table,
            &live,
            request.drop_columns,
            self.names.as_mut(),
        )?;

        match plan {
            Some(plan) => {
                execute_plan(&mut self.conn, &plan, warnings).await?;
                info!(
                    "Altered {}.{} in {} steps",
                    request.database,
                    request.table.name,
                    plan.len()
                );
                Ok(true)
            }
            None => {
                info!("{}.{} already up to date", request.database, request.table.name);
                Ok(false)
            }
        }
    }

    /// Truncate a table. A missing table is reported and skipped.
    pub async fn truncate(
        &mut self,
        request: &TruncateRequest,
        warnings: &mut dyn WarningSink,
    ) -> Result<()> {
        match describe_live_table(&mut self.conn, &request.database, &request.table).await {
            Ok(_) => {}
            Err(e) if e.is_table_not_found() => {
                let message = format!(
                    "Table {}.{} does not exist, skipping truncate",
                    request.database, request.table
                );
                warn!("{}", message);
                warnings.warn(&message);
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let plan = plan_truncate(
            &request.database,
            &request.table,
            &request.synced_column,
            request.delete_before,
            request.soft_deleted_column.as_deref(),
        )?;
        execute_plan(&mut self.conn, &plan, warnings).await
    }

    pub async fn migrate(
        &mut self,
        request: &MigrateRequest,
        warnings: &mut dyn WarningSink,
    ) -> Result<()> {
        let plan = plan_migration(
            &mut self.conn,
            self.names.as_mut(),
            &request.database,
            &request.table,
            &request.migration,
        )
        .await?;
        execute_plan(&mut self.conn, &plan, warnings).await?;
        info!(
            "Applied {} to {}.{}",
            request.migration.name(),
            request.database,
            request.table
        );
        Ok(())
    }

    /// Apply every file of a batch.
    ///
    /// History tables take earliest-start files first, then replace, update
    /// and delete files; live tables take replace, update and delete files.
    pub async fn write_batch(&mut self, request: &WriteBatchRequest) -> Result<BatchOutcome> {
        let mut params = request.file_params.clone();
        params.batch_size = request.batch_size.unwrap_or(self.batch_size).max(1);

        let mut order: Vec<(FileCategory, &[PathBuf])> = Vec::with_capacity(4);
        match request.mode {
            WriteMode::History => {
                order.push((FileCategory::EarliestStart, &request.earliest_start_files))
            }
            WriteMode::Live if !request.earliest_start_files.is_empty() => {
                return Err(ApplyError::UnsupportedOperation(
                    "Earliest-start files require a history-mode table".to_string(),
                ));
            }
            WriteMode::Live => {}
        }
        order.push((FileCategory::Replace, &request.replace_files));
        order.push((FileCategory::Update, &request.update_files));
        order.push((FileCategory::Delete, &request.delete_files));

        let mut outcome = BatchOutcome::default();
        for (category, files) in order {
            for path in files {
                let key = match request.keys.get(path) {
                    Some(encoded) => Some(decode_key(encoded, path)?),
                    None => None,
                };
                let ctx = WriterContext::new(&request.database, request.table.clone(), &params);
                let mut writer = Writer::for_category(category, request.mode, ctx)?;
                outcome.rows_affected +=
                    apply_file(&mut self.conn, &mut writer, path, &params, key.as_deref()).await?;
                outcome.files += 1;
            }
        }

        info!(
            "Wrote {} files to {}.{} ({} rows affected)",
            outcome.files, request.database, request.table.name, outcome.rows_affected
        );
        Ok(outcome)
    }
}

fn decode_key(encoded: &str, path: &std::path::Path) -> Result<Vec<u8>> {
    STANDARD.decode(encoded.trim()).map_err(|e| {
        ApplyError::MalformedInput(format!("Invalid key for {}: {}", path.display(), e))
    })
}
