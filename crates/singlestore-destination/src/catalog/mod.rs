//! Builds logical [`Table`] descriptors from live catalog metadata.

use tracing::debug;

use crate::core::schema::{CatalogColumn, Column, DataType, Table, TypeParams};
use crate::core::traits::Connection;
use crate::error::{ApplyError, Result};
use crate::typemap::{from_native_type, is_geographic};

/// Largest byte length carried into a string column's parameters.
pub const MAX_STRING_BYTE_LENGTH: i64 = i32::MAX as i64;

/// Turn raw catalog rows into a table descriptor.
///
/// Nullability is read but not carried; primary-key columns are implicitly
/// NOT NULL in the engine and the logical model has no other use for it.
///
/// Decimal precision or scale outside `u32` is `MalformedInput`.
pub fn build_table(name: &str, rows: Vec<CatalogColumn>) -> Result<Table> {
    let columns = rows
        .into_iter()
        .map(build_column)
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::new(name, columns))
}

fn catalog_u32(column: &str, field: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        ApplyError::MalformedInput(format!(
            "Column {} has out-of-range numeric {}: {}",
            column, field, value
        ))
    })
}

fn build_column(row: CatalogColumn) -> Result<Column> {
    let data_type = from_native_type(&row.native_type);
    let params = match data_type {
        DataType::Decimal => match (row.precision, row.scale) {
            (Some(precision), Some(scale)) => Some(TypeParams::Decimal {
                precision: catalog_u32(&row.name, "precision", precision)?,
                scale: catalog_u32(&row.name, "scale", scale)?,
            }),
            _ => None,
        },
        DataType::String if is_geographic(&row.native_type) => None,
        DataType::String => row
            .byte_length
            .filter(|len| *len > 0)
            .map(|len| TypeParams::StringByteLength(len.min(MAX_STRING_BYTE_LENGTH) as u64)),
        _ => None,
    };

    Ok(Column {
        name: row.name,
        data_type,
        params,
        primary_key: row.is_primary_key,
    })
}

/// Introspect a live table.
///
/// Returns `TableNotFound` when the catalog has no columns for it.
pub async fn describe_live_table<C>(conn: &mut C, database: &str, table: &str) -> Result<Table>
where
    C: Connection + ?Sized,
{
    let rows = conn.catalog_columns(database, table).await?;
    if rows.is_empty() {
        return Err(ApplyError::table_not_found(database, table));
    }
    debug!("Described {}.{}: {} columns", database, table, rows.len());
    build_table(table, rows)
}
