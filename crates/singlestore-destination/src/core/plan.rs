//! Plan steps and the sequential plan executor.
//!
//! The engine has no transactional DDL, so a multi-statement plan can fail
//! halfway. Each [`PlanStep`] may carry a cleanup statement that undoes the
//! in-flight part of the transformation when that step fails, and a warning
//! that tells the operator where the data lives if it cannot be undone.
//! Steps that already succeeded are never unwound.

use tracing::{debug, info, warn};

use crate::error::Result;

use super::traits::{Connection, WarningSink};
use super::value::{BoundParam, Statement};

/// One statement of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    statement: Statement,
    cleanup: Option<String>,
    warning: Option<String>,
}

impl PlanStep {
    /// Step without parameters, cleanup or warning.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            statement: Statement::new(sql),
            cleanup: None,
            warning: None,
        }
    }

    /// Step with bound parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<BoundParam>) -> Self {
        Self {
            statement: Statement::with_params(sql, params),
            cleanup: None,
            warning: None,
        }
    }

    /// Attach the statement to run if this step fails.
    #[must_use]
    pub fn cleanup(mut self, sql: impl Into<String>) -> Self {
        self.cleanup = Some(sql.into());
        self
    }

    /// Attach the warning to report if this step fails.
    #[must_use]
    pub fn warning(mut self, message: impl Into<String>) -> Self {
        self.warning = Some(message.into());
        self
    }

    /// Primary statement.
    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Primary SQL text.
    pub fn sql(&self) -> &str {
        &self.statement.sql
    }

    /// Bound parameters of the primary statement.
    pub fn params(&self) -> &[BoundParam] {
        &self.statement.params
    }

    /// Cleanup SQL, if any.
    pub fn cleanup_sql(&self) -> Option<&str> {
        self.cleanup.as_deref()
    }

    /// Operator warning, if any.
    pub fn warning_message(&self) -> Option<&str> {
        self.warning.as_deref()
    }
}

/// Execute a plan step by step on one connection.
///
/// When a step fails, its cleanup statement runs (a failing cleanup is only
/// logged), its warning goes to `warnings`, and the original error is
/// returned.
pub async fn execute_plan<C>(
    conn: &mut C,
    plan: &[PlanStep],
    warnings: &mut dyn WarningSink,
) -> Result<()>
where
    C: Connection + ?Sized,
{
    for (idx, step) in plan.iter().enumerate() {
        debug!("Plan step {}/{}: {}", idx + 1, plan.len(), step.sql());

        if let Err(err) = conn.execute(step.statement()).await {
            warn!("Plan step {}/{} failed: {}", idx + 1, plan.len(), err);

            if let Some(cleanup) = step.cleanup_sql() {
                info!("Running cleanup: {}", cleanup);
                if let Err(cleanup_err) = conn.execute(&Statement::new(cleanup)).await {
                    warn!("Cleanup statement failed: {}", cleanup_err);
                }
            }

            if let Some(message) = step.warning_message() {
                warnings.warn(message);
            }

            return Err(err);
        }
    }

    Ok(())
}
