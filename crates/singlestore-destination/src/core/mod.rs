//! Core abstractions shared by the planners, the batch writers and the target.
//!
//! - [`schema`]: Table and column metadata types
//! - [`value`]: Statements, bound parameters and driver values
//! - [`traits`]: The connection seam and the warning sink
//! - [`identifier`]: Identifier quoting and temporary-object naming
//! - [`plan`]: Plan steps and the sequential plan executor
//!
//! Nothing here talks to the database directly; planners and writers only
//! produce [`value::Statement`]s and [`plan::PlanStep`]s, and everything that
//! runs SQL goes through a [`traits::Connection`].

pub mod identifier;
pub mod plan;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use identifier::{quote_ident, RandomNamer, SequentialNamer, TempNamer};
pub use plan::{execute_plan, PlanStep};
pub use schema::{CatalogColumn, Column, DataType, Table, TypeParams};
pub use traits::{Connection, LogWarnings, WarningSink};
pub use value::{BoundParam, SqlValue, Statement};
