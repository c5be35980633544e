//! In-memory [`Connection`] for unit tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::core::schema::{CatalogColumn, DataType, Table, TypeParams};
use crate::core::traits::Connection;
use crate::core::value::Statement;
use crate::error::{ApplyError, Result};

/// Records executed statements and answers catalog queries from fixtures.
///
/// Only statements that succeed are recorded. Statements whose SQL starts
/// with a prefix registered through [`MockConnection::fail_on`] fail with
/// `StatementExecution`.
#[derive(Debug, Default)]
pub(crate) struct MockConnection {
    executed: Vec<Statement>,
    failures: Vec<String>,
    scalars: Vec<(String, Option<String>)>,
    tables: HashMap<(String, String), Vec<CatalogColumn>>,
    databases: HashSet<String>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every statement whose SQL starts with `prefix`.
    pub fn fail_on(mut self, prefix: &str) -> Self {
        self.failures.push(prefix.to_string());
        self
    }

    /// Answer scalar queries containing `pattern` with `value`.
    pub fn with_scalar(mut self, pattern: &str, value: Option<&str>) -> Self {
        self.scalars
            .push((pattern.to_string(), value.map(|v| v.to_string())));
        self
    }

    /// Register an existing database.
    pub fn with_database(mut self, database: &str) -> Self {
        self.databases.insert(database.to_string());
        self
    }

    /// Register a live table; its database is registered as well.
    pub fn with_table(self, database: &str, table: &Table) -> Self {
        let rows = table.columns.iter().map(catalog_row).collect();
        self.with_catalog(database, &table.name, rows)
    }

    /// Register raw catalog rows for a table.
    pub fn with_catalog(mut self, database: &str, table: &str, rows: Vec<CatalogColumn>) -> Self {
        self.databases.insert(database.to_string());
        self.tables
            .insert((database.to_string(), table.to_string()), rows);
        self
    }

    pub fn executed(&self) -> &[Statement] {
        &self.executed
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed.iter().map(|s| s.sql.clone()).collect()
    }
}

fn catalog_row(col: &crate::core::schema::Column) -> CatalogColumn {
    let (native_type, byte_length, precision, scale) = match (col.data_type, col.params) {
        (DataType::Boolean, _) => ("TINYINT", None, Some(3), Some(0)),
        (DataType::Short, _) => ("SMALLINT", None, Some(5), Some(0)),
        (DataType::Int, _) => ("INT", None, Some(10), Some(0)),
        (DataType::Long, _) => ("BIGINT", None, Some(19), Some(0)),
        (DataType::Float, _) => ("FLOAT", None, None, None),
        (DataType::Double, _) => ("DOUBLE", None, None, None),
        (DataType::Decimal, Some(TypeParams::Decimal { precision, scale })) => (
            "DECIMAL",
            None,
            Some(i64::from(precision)),
            Some(i64::from(scale)),
        ),
        (DataType::Decimal, _) => ("DECIMAL", None, Some(38), Some(10)),
        (DataType::Binary, _) => ("BLOB", Some(65_535), None, None),
        (DataType::Json, _) => ("JSON", None, None, None),
        (DataType::NaiveDate, _) => ("DATE", None, None, None),
        (DataType::NaiveDatetime | DataType::UtcDatetime, _) => ("DATETIME", None, None, None),
        (_, Some(TypeParams::StringByteLength(len))) => {
            ("TEXT", Some(len as i64), None, None)
        }
        _ => ("LONGTEXT", Some(4_294_967_295), None, None),
    };
    CatalogColumn {
        name: col.name.clone(),
        native_type: native_type.to_string(),
        is_nullable: !col.primary_key,
        byte_length,
        precision,
        scale,
        is_primary_key: col.primary_key,
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        if self.failures.iter().any(|p| statement.sql.starts_with(p)) {
            return Err(ApplyError::statement(
                statement.sql.clone(),
                "injected failure",
            ));
        }
        for param in &statement.params {
            param.to_sql_value()?;
        }
        self.executed.push(statement.clone());
        Ok(1)
    }

    async fn query_scalar(&mut self, sql: &str) -> Result<Option<String>> {
        Ok(self
            .scalars
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .and_then(|(_, value)| value.clone()))
    }

    async fn database_exists(&mut self, database: &str) -> Result<bool> {
        Ok(self.databases.contains(database))
    }

    async fn catalog_columns(&mut self, database: &str, table: &str) -> Result<Vec<CatalogColumn>> {
        Ok(self
            .tables
            .get(&(database.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
