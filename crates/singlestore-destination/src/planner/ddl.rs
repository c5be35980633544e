//! Create, truncate and alter plans.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::core::identifier::{qualify, quote_ident, validate_identifier, TempNamer};
use crate::core::plan::PlanStep;
use crate::core::schema::{Column, Table};
use crate::error::{ApplyError, Result};
use crate::typemap::{cast_type, column_sql_type};

use super::{create_table_sql, rebuild_plan};

/// Plan the creation of `desired`, creating the database first when it does
/// not exist yet.
pub fn plan_create(database: &str, desired: &Table, database_exists: bool) -> Result<Vec<PlanStep>> {
    validate_identifier(database)?;
    desired.validate()?;
    if desired.columns.is_empty() {
        return Err(ApplyError::MalformedInput(format!(
            "Table {} has no columns",
            desired.name
        )));
    }

    let mut plan = Vec::with_capacity(2);
    if !database_exists {
        plan.push(PlanStep::new(format!(
            "CREATE DATABASE IF NOT EXISTS {}",
            quote_ident(database)
        )));
    }
    plan.push(PlanStep::new(create_table_sql(database, desired)));
    Ok(plan)
}

/// Render a cutoff as `FROM_UNIXTIME(<seconds>.<nanoseconds>)`.
fn from_unixtime(cutoff: &DateTime<Utc>) -> String {
    format!(
        "FROM_UNIXTIME({}.{:09})",
        cutoff.timestamp(),
        cutoff.timestamp_subsec_nanos()
    )
}

/// Plan a truncate of rows synced before `cutoff`.
///
/// With a soft-delete column the rows are flagged instead of deleted.
pub fn plan_truncate(
    database: &str,
    table: &str,
    synced_column: &str,
    cutoff: DateTime<Utc>,
    soft_delete_column: Option<&str>,
) -> Result<Vec<PlanStep>> {
    validate_identifier(database)?;
    validate_identifier(table)?;
    validate_identifier(synced_column)?;

    let condition = format!("{} < {}", quote_ident(synced_column), from_unixtime(&cutoff));
    let sql = match soft_delete_column {
        Some(soft) => {
            validate_identifier(soft)?;
            format!(
                "UPDATE {} SET {} = TRUE WHERE {}",
                qualify(database, table),
                quote_ident(soft),
                condition
            )
        }
        None => format!("DELETE FROM {} WHERE {}", qualify(database, table), condition),
    };
    Ok(vec![PlanStep::new(sql)])
}

/// Plan the changes that turn `live` into `desired`.
///
/// Columns present only in `live` are dropped when `drop_columns` is set and
/// carried over untouched otherwise. A type change on a live key column, or
/// a different set of key names, rebuilds the table. Returns `None` when the
/// shapes already match.
pub fn plan_alter(
    database: &str,
    desired: &Table,
    live: &Table,
    drop_columns: bool,
    names: &mut dyn TempNamer,
) -> Result<Option<Vec<PlanStep>>> {
    validate_identifier(database)?;
    desired.validate()?;

    let mut effective = desired.columns.clone();
    let mut dropped: Vec<&Column> = Vec::new();
    for col in &live.columns {
        if desired.has_column(&col.name) {
            continue;
        }
        if drop_columns {
            dropped.push(col);
        } else {
            effective.push(col.clone());
        }
    }

    let added: Vec<&Column> = effective
        .iter()
        .filter(|c| !live.has_column(&c.name))
        .collect();
    let changed: Vec<(&Column, &Column)> = effective
        .iter()
        .filter_map(|c| live.column(&c.name).map(|l| (c, l)))
        .filter(|(c, l)| column_sql_type(c) != column_sql_type(l))
        .collect();

    let desired_key: BTreeSet<&str> = effective
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.as_str())
        .collect();
    let live_key: BTreeSet<&str> = live.primary_key_names().into_iter().collect();
    let key_type_changed = changed.iter().any(|(_, l)| l.primary_key);

    if desired_key != live_key || key_type_changed {
        debug!(
            "Primary key of {}.{} changes, rebuilding table",
            database, desired.name
        );
        let select: Vec<String> = effective
            .iter()
            .map(|c| {
                if live.has_column(&c.name) {
                    quote_ident(&c.name)
                } else {
                    "NULL".to_string()
                }
            })
            .collect();
        let select_sql = format!(
            "SELECT {} FROM {}",
            select.join(", "),
            qualify(database, &live.name)
        );
        return Ok(Some(rebuild_plan(
            database,
            &desired.name,
            &effective,
            &select_sql,
            names,
        )));
    }

    if added.is_empty() && changed.is_empty() && dropped.is_empty() {
        return Ok(None);
    }

    let target = qualify(database, &desired.name);
    let mut plan = Vec::new();

    if !added.is_empty() {
        let clauses: Vec<String> = added
            .iter()
            .map(|c| format!("ADD {} {}", quote_ident(&c.name), column_sql_type(c)))
            .collect();
        plan.push(PlanStep::new(format!(
            "ALTER TABLE {} {}",
            target,
            clauses.join(", ")
        )));
    }

    for (col, _) in &changed {
        plan.extend(change_type_steps(&target, col, names));
    }

    if !dropped.is_empty() {
        let clauses: Vec<String> = dropped
            .iter()
            .map(|c| format!("DROP {}", quote_ident(&c.name)))
            .collect();
        plan.push(PlanStep::new(format!(
            "ALTER TABLE {} {}",
            target,
            clauses.join(", ")
        )));
    }

    Ok(Some(plan))
}

/// Move a column to a new type through a temporary column.
///
/// Only the steps that run once the temporary column exists carry its drop
/// as cleanup.
fn change_type_steps(target: &str, col: &Column, names: &mut dyn TempNamer) -> Vec<PlanStep> {
    let temp = names.temp_name(&col.name);
    let column = quote_ident(&col.name);
    let temp_column = quote_ident(&temp);
    let drop_temp = format!("ALTER TABLE {} DROP {}", target, temp_column);

    vec![
        PlanStep::new(format!(
            "ALTER TABLE {} ADD {} {}",
            target,
            temp_column,
            column_sql_type(col)
        )),
        PlanStep::new(format!(
            "UPDATE {} SET {} = {} :> {}",
            target,
            temp_column,
            column,
            cast_type(col.data_type, col.params.as_ref())
        ))
        .cleanup(drop_temp.clone()),
        PlanStep::new(format!("ALTER TABLE {} DROP {}", target, column)).cleanup(drop_temp),
        PlanStep::new(format!(
            "ALTER TABLE {} CHANGE {} {}",
            target, temp_column, column
        ))
        .warning(format!(
            "Column {} of {} has been dropped and its data now lives in column {}. Rename {} to {} manually.",
            column, target, temp_column, temp_column, column
        )),
    ]
}
