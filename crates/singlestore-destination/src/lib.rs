//! # singlestore-destination
//!
//! Schema migration planner and CDC batch apply engine for SingleStore.
//!
//! This library provides:
//!
//! - **DDL planning**: create, alter and truncate plans diffed against the
//!   live table, with per-step cleanup
//! - **Migrations**: renames, copies, history-mode column changes and
//!   transitions between live, soft-delete and history tables
//! - **Batch apply**: decrypt, decompress and parse CSV batch files, then
//!   replace, update or delete rows, including history (SCD2) tables
//! - **Type mapping** between logical column types and SingleStore types
//!
//! ## Example
//!
//! ```rust,no_run
//! use singlestore_destination::{Config, Orchestrator, SingleStoreConnection};
//! use singlestore_destination::orchestrator::TableRef;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let conn = SingleStoreConnection::connect(&config.target).await?;
//!     let mut orchestrator = Orchestrator::new(conn).with_batch_size(config.apply.batch_size);
//!     let table = orchestrator
//!         .describe_table(&TableRef { database: "analytics".into(), table: "users".into() })
//!         .await?;
//!     println!("{:?}", table);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod planner;
pub mod target;
pub mod typemap;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use batch::{FileCategory, FileParams, WriteMode};
pub use config::{ApplyConfig, Config, TargetConfig};
pub use self::core::{Column, Connection, DataType, PlanStep, Table, TypeParams, WarningSink};
pub use error::{ApplyError, Result};
pub use orchestrator::Orchestrator;
pub use planner::{Migration, SyncModeTransition};
pub use target::SingleStoreConnection;
