//! Core traits at the boundary between the planners/writers and the target.
//!
//! - [`Connection`]: executes statements and answers catalog questions
//! - [`WarningSink`]: receives operator-facing warnings from plan execution
//!
//! The library never opens or pools connections on its own; callers hand an
//! open [`Connection`] to the orchestrator.

use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

use super::schema::CatalogColumn;
use super::value::Statement;

/// An open connection to the target database.
///
/// Statements run strictly in call order on a single session; later plan
/// steps rely on the effects of earlier ones.
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement and return the number of affected rows.
    ///
    /// Driver failures are reported as `ApplyError::StatementExecution`.
    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    /// Run a query and return the first column of the first row as text.
    ///
    /// Returns `None` when there is no row or the value is NULL.
    async fn query_scalar(&mut self, sql: &str) -> Result<Option<String>>;

    /// Check if a database exists.
    async fn database_exists(&mut self, database: &str) -> Result<bool>;

    /// Raw catalog metadata for a table, in ordinal order.
    ///
    /// An empty result means the table does not exist.
    async fn catalog_columns(&mut self, database: &str, table: &str)
        -> Result<Vec<CatalogColumn>>;
}

/// Receives warnings that must reach the operator.
pub trait WarningSink: Send {
    /// Report a warning.
    fn warn(&mut self, message: &str);
}

impl WarningSink for Vec<String> {
    fn warn(&mut self, message: &str) {
        self.push(message.to_string());
    }
}

/// Warning sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWarnings;

impl WarningSink for LogWarnings {
    fn warn(&mut self, message: &str) {
        warn!("{}", message);
    }
}
