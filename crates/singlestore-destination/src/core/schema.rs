//! Logical table and column metadata.
//!
//! These types describe tables the way the CDC platform declares them. They are
//! rebuilt for every operation, either from a request or from live
//! introspection (see [`crate::catalog`]), and never mutated in place.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::identifier::validate_identifier;
use crate::error::{ApplyError, Result};

/// Soft-delete flag column used when a request does not name one.
pub const DEFAULT_SOFT_DELETE_COLUMN: &str = "_fivetran_deleted";
/// Sync timestamp column maintained by the platform.
pub const SYNCED_COLUMN: &str = "_fivetran_synced";
/// History-mode validity start; part of the primary key in history tables.
pub const START_COLUMN: &str = "_fivetran_start";
/// History-mode validity end.
pub const END_COLUMN: &str = "_fivetran_end";
/// History-mode active flag.
pub const ACTIVE_COLUMN: &str = "_fivetran_active";

/// Logical column type as declared by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Boolean,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    Binary,
    String,
    Json,
    NaiveDate,
    NaiveDatetime,
    UtcDatetime,
    Xml,
    Unspecified,
}

/// Optional type parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeParams {
    /// Precision and scale of a decimal column.
    Decimal { precision: u32, scale: u32 },
    /// Maximum byte length of a string column.
    StringByteLength(u64),
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, unique within its table.
    pub name: String,

    /// Logical type.
    #[serde(rename = "type")]
    pub data_type: DataType,

    /// Decimal precision/scale or string byte length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<TypeParams>,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
}

impl Column {
    /// Create a column without type parameters.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            params: None,
            primary_key: false,
        }
    }

    /// Return a copy flagged as primary key.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Return a copy with type parameters.
    #[must_use]
    pub fn with_params(mut self, params: TypeParams) -> Self {
        self.params = Some(params);
        self
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Column definitions, in declaration order.
    pub columns: Vec<Column>,
}

impl Table {
    /// Create a table from its columns.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Validate identifiers and column-name uniqueness.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        let mut seen = HashSet::new();
        for col in &self.columns {
            validate_identifier(&col.name)?;
            if !seen.insert(col.name.as_str()) {
                return Err(ApplyError::MalformedInput(format!(
                    "Table {} declares column '{}' more than once",
                    self.name, col.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check if the table has a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Primary key columns in declaration order.
    pub fn primary_key(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Primary key column names in declaration order.
    pub fn primary_key_names(&self) -> Vec<&str> {
        self.primary_key().into_iter().map(|c| c.name.as_str()).collect()
    }

    /// Key columns that identify a record across history versions
    /// (the primary key without `_fivetran_start`).
    pub fn record_key(&self) -> Vec<&Column> {
        self.primary_key()
            .into_iter()
            .filter(|c| c.name != START_COLUMN)
            .collect()
    }

    /// Check if the table carries the three history-mode columns.
    pub fn is_history_table(&self) -> bool {
        self.has_column(START_COLUMN) && self.has_column(END_COLUMN) && self.has_column(ACTIVE_COLUMN)
    }
}

/// One row of raw catalog metadata, as returned by live introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    /// Column name.
    pub name: String,
    /// Native type name in upper case (e.g. "BIGINT", "LONGTEXT").
    pub native_type: String,
    /// Whether the column allows NULL.
    pub is_nullable: bool,
    /// Maximum length in bytes for string/binary types.
    pub byte_length: Option<i64>,
    /// Numeric precision.
    pub precision: Option<i64>,
    /// Numeric scale.
    pub scale: Option<i64>,
    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_table() -> Table {
        Table::new(
            "events",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("payload", DataType::String),
                Column::new(START_COLUMN, DataType::NaiveDatetime).primary(),
                Column::new(END_COLUMN, DataType::NaiveDatetime),
                Column::new(ACTIVE_COLUMN, DataType::Boolean),
            ],
        )
    }

    #[test]
    fn test_primary_key_order_follows_columns() {
        let table = history_table();
        assert_eq!(table.primary_key_names(), vec!["id", START_COLUMN]);
    }

    #[test]
    fn test_record_key_excludes_start() {
        let table = history_table();
        let key: Vec<&str> = table.record_key().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(key, vec!["id"]);
        assert!(table.is_history_table());
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let table = Table::new(
            "t",
            vec![Column::new("a", DataType::Int), Column::new("a", DataType::Long)],
        );
        assert!(matches!(table.validate(), Err(ApplyError::MalformedInput(_))));
    }

    #[test]
    fn test_column_yaml_shape() {
        let yaml = r#"
name: amount
type: decimal
params:
  decimal:
    precision: 38
    scale: 4
primary_key: false
"#;
        let col: Column = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(col.data_type, DataType::Decimal);
        assert_eq!(
            col.params,
            Some(TypeParams::Decimal {
                precision: 38,
                scale: 4
            })
        );

        let col: Column =
            serde_yaml::from_str("name: note\ntype: string\nparams:\n  string_byte_length: 256\n")
                .unwrap();
        assert_eq!(col.params, Some(TypeParams::StringByteLength(256)));
        assert!(!col.primary_key);
    }
}
