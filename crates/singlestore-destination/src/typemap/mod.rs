//! Type mapping between logical column types and SingleStore.
//!
//! - [`to_sql_type`]: logical type → column type used in DDL
//! - [`cast_type`]: logical type → target of the `:>` cast operator
//! - [`from_native_type`]: catalog type name → logical type
//! - [`bind_value`]: CSV field → typed driver value
//!
//! The mapping is lossy in both directions. `naive_datetime` and
//! `utc_datetime` share `DATETIME(6)`, and every text flavour comes back from
//! the catalog as `string`, so create → introspect does not reproduce the
//! declared logical types exactly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime};

use crate::core::schema::{Column, DataType, TypeParams};
use crate::core::value::SqlValue;
use crate::error::{ApplyError, Result};

/// Largest decimal scale the engine accepts.
pub const MAX_DECIMAL_SCALE: u32 = 30;

/// Upper bounds of the text buckets, in bytes.
pub const TINYTEXT_MAX: u64 = 255;
pub const TEXT_MAX: u64 = 65_535;
pub const MEDIUMTEXT_MAX: u64 = 16_777_215;

const DEFAULT_DECIMAL_PRECISION: u32 = 38;
const DEFAULT_DECIMAL_SCALE: u32 = 10;

const TEXT_CHARSET: &str = "CHARACTER SET utf8mb4";

/// Format of normalized timestamps bound to `DATETIME(6)` columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render the DDL type of a logical type.
pub fn to_sql_type(data_type: DataType, params: Option<&TypeParams>) -> String {
    match base_type(data_type, params) {
        Rendered::Plain(sql) => sql,
        Rendered::Text(bucket) => format!("{} {}", bucket, TEXT_CHARSET),
    }
}

/// Render the DDL type of a column.
pub fn column_sql_type(col: &Column) -> String {
    to_sql_type(col.data_type, col.params.as_ref())
}

/// Render a logical type as the target of a `:>` cast (no character set).
pub fn cast_type(data_type: DataType, params: Option<&TypeParams>) -> String {
    match base_type(data_type, params) {
        Rendered::Plain(sql) => sql,
        Rendered::Text(bucket) => bucket.to_string(),
    }
}

enum Rendered {
    Plain(String),
    Text(&'static str),
}

fn base_type(data_type: DataType, params: Option<&TypeParams>) -> Rendered {
    match data_type {
        DataType::Boolean => Rendered::Plain("BOOL".to_string()),
        DataType::Short => Rendered::Plain("SMALLINT".to_string()),
        DataType::Int => Rendered::Plain("INT".to_string()),
        DataType::Long => Rendered::Plain("BIGINT".to_string()),
        DataType::Float => Rendered::Plain("FLOAT".to_string()),
        DataType::Double => Rendered::Plain("DOUBLE".to_string()),
        DataType::Decimal => {
            let (precision, scale) = match params {
                Some(TypeParams::Decimal { precision, scale }) => (*precision, *scale),
                _ => (DEFAULT_DECIMAL_PRECISION, DEFAULT_DECIMAL_SCALE),
            };
            Rendered::Plain(format!(
                "DECIMAL({}, {})",
                precision,
                scale.min(MAX_DECIMAL_SCALE)
            ))
        }
        DataType::NaiveDate => Rendered::Plain("DATE".to_string()),
        DataType::NaiveDatetime | DataType::UtcDatetime => {
            Rendered::Plain("DATETIME(6)".to_string())
        }
        DataType::Binary => Rendered::Plain("BLOB".to_string()),
        DataType::Json => Rendered::Plain("JSON".to_string()),
        DataType::String | DataType::Xml | DataType::Unspecified => {
            let byte_length = match params {
                Some(TypeParams::StringByteLength(len)) => *len,
                _ => 0,
            };
            Rendered::Text(text_bucket(byte_length))
        }
    }
}

/// Pick the smallest text type that holds `byte_length` bytes (0 = unbounded).
fn text_bucket(byte_length: u64) -> &'static str {
    match byte_length {
        0 => "LONGTEXT",
        n if n <= TINYTEXT_MAX => "TINYTEXT",
        n if n <= TEXT_MAX => "TEXT",
        n if n <= MEDIUMTEXT_MAX => "MEDIUMTEXT",
        _ => "LONGTEXT",
    }
}

/// Map a catalog type name to a logical type.
///
/// Matching is case-exact against upper-case names; anything unknown is
/// `Unspecified`, which renders as text.
pub fn from_native_type(native_type: &str) -> DataType {
    match native_type {
        "BOOL" | "BOOLEAN" | "BIT" | "TINYINT" => DataType::Boolean,
        "SMALLINT" => DataType::Short,
        "MEDIUMINT" | "INT" | "INTEGER" => DataType::Int,
        "BIGINT" => DataType::Long,
        "FLOAT" => DataType::Float,
        "DOUBLE" | "REAL" => DataType::Double,
        "DECIMAL" | "NUMERIC" => DataType::Decimal,
        "DATE" => DataType::NaiveDate,
        "DATETIME" | "TIMESTAMP" => DataType::NaiveDatetime,
        "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            DataType::Binary
        }
        "JSON" => DataType::Json,
        "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "CHAR" | "VARCHAR" => DataType::String,
        native if is_geographic(native) => DataType::String,
        _ => DataType::Unspecified,
    }
}

/// Geographic types are exposed as unbounded strings.
pub fn is_geographic(native_type: &str) -> bool {
    matches!(native_type, "GEOGRAPHY" | "GEOGRAPHYPOINT")
}

/// Normalize an ISO-8601 timestamp to `YYYY-MM-DD HH:MM:SS.ffffff`.
///
/// The `T` separator becomes a space, a trailing `Z` is dropped and the
/// fraction is truncated or zero-padded to six digits.
pub fn normalize_timestamp(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let without_zone = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    let spaced = without_zone.replacen('T', " ", 1);

    let (whole, fraction) = match spaced.split_once('.') {
        Some((whole, fraction)) => (whole.to_string(), fraction.to_string()),
        None => (spaced.clone(), String::new()),
    };

    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(malformed_timestamp(raw));
    }
    let mut micros: String = fraction.chars().take(6).collect();
    while micros.len() < 6 {
        micros.push('0');
    }

    let normalized = format!("{}.{}", whole, micros);
    NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT)
        .map_err(|_| malformed_timestamp(raw))?;
    Ok(normalized)
}

/// Parse an ISO-8601 timestamp after normalization.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let normalized = normalize_timestamp(raw)?;
    NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT)
        .map_err(|_| malformed_timestamp(raw))
}

/// Format a timestamp the way it is bound to `DATETIME(6)` columns.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn malformed_timestamp(raw: &str) -> ApplyError {
    ApplyError::MalformedInput(format!("Unparseable timestamp '{}'", raw))
}

/// Convert a raw field into a driver value for a column of `data_type`.
pub fn bind_value(raw: &str, data_type: DataType) -> Result<SqlValue> {
    match data_type {
        DataType::Boolean => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(SqlValue::Bool(true)),
            "false" | "0" => Ok(SqlValue::Bool(false)),
            _ => Err(malformed_value(raw, data_type)),
        },
        DataType::Short | DataType::Int | DataType::Long => raw
            .trim()
            .parse::<i64>()
            .map(SqlValue::I64)
            .map_err(|_| malformed_value(raw, data_type)),
        DataType::Float | DataType::Double => raw
            .trim()
            .parse::<f64>()
            .map(SqlValue::F64)
            .map_err(|_| malformed_value(raw, data_type)),
        DataType::Binary => STANDARD
            .decode(raw.trim())
            .map(SqlValue::Bytes)
            .map_err(|_| malformed_value(raw, data_type)),
        DataType::NaiveDate => {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| malformed_value(raw, data_type))?;
            Ok(SqlValue::Text(raw.trim().to_string()))
        }
        DataType::NaiveDatetime | DataType::UtcDatetime => {
            normalize_timestamp(raw).map(SqlValue::Text)
        }
        DataType::Decimal
        | DataType::String
        | DataType::Json
        | DataType::Xml
        | DataType::Unspecified => Ok(SqlValue::Text(raw.to_string())),
    }
}

fn malformed_value(raw: &str, data_type: DataType) -> ApplyError {
    ApplyError::MalformedInput(format!("Cannot bind '{}' as {:?}", raw, data_type))
}
