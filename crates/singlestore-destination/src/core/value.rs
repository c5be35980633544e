//! SQL statements, bound parameters and driver-level values.
//!
//! Writers and planners produce [`Statement`]s whose parameters are kept as
//! raw text plus the logical column type. Conversion into a typed
//! [`SqlValue`] happens at execution time through the type mapper, so a
//! malformed field surfaces as `MalformedInput` right before the statement
//! that needs it.

use crate::core::schema::DataType;
use crate::error::Result;
use crate::typemap;

/// Typed value handed to the database driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 64-bit signed integer (SMALLINT, INT, BIGINT).
    I64(i64),

    /// 64-bit floating point (FLOAT, DOUBLE).
    F64(f64),

    /// Text data (strings, decimals, JSON, normalized dates).
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

/// A statement parameter: raw value (None = NULL) and its logical type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundParam {
    /// Raw text value, `None` for NULL.
    pub value: Option<String>,
    /// Logical type used to convert the value for the driver.
    pub data_type: DataType,
}

impl BoundParam {
    /// Create a parameter.
    pub fn new(value: Option<String>, data_type: DataType) -> Self {
        Self { value, data_type }
    }

    /// Non-null parameter.
    pub fn of(value: impl Into<String>, data_type: DataType) -> Self {
        Self::new(Some(value.into()), data_type)
    }

    /// NULL parameter.
    pub fn null(data_type: DataType) -> Self {
        Self::new(None, data_type)
    }

    /// Convert into a driver value through the type mapper.
    pub fn to_sql_value(&self) -> Result<SqlValue> {
        match &self.value {
            None => Ok(SqlValue::Null),
            Some(raw) => typemap::bind_value(raw, self.data_type),
        }
    }
}

/// SQL text plus ordered positional (`?`) parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Parameters, in placeholder order.
    pub params: Vec<BoundParam>,
}

impl Statement {
    /// Statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<BoundParam>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}
