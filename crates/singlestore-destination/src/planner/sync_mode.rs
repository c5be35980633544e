//! Transforms between live, soft-delete and history tables.
//!
//! Transitions that touch the primary key rebuild the table through a
//! temporary copy (see [`super::rebuild_plan`]); the soft-delete flag alone
//! is added and removed in place.

use serde::{Deserialize, Serialize};

use crate::core::identifier::{qualify, quote_ident, quote_literal, validate_identifier, TempNamer};
use crate::core::plan::PlanStep;
use crate::core::schema::{
    Column, DataType, Table, ACTIVE_COLUMN, END_COLUMN, START_COLUMN, SYNCED_COLUMN,
};
use crate::error::{ApplyError, Result};

use super::{rebuild_plan, MAX_TIMESTAMP, MIN_TIMESTAMP};

/// Direction of a sync-mode migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncModeTransition {
    LiveToSoftDelete,
    SoftDeleteToLive,
    LiveToHistory,
    HistoryToLive,
    SoftDeleteToHistory,
    HistoryToSoftDelete,
}

const ROW_NUMBER_ALIAS: &str = "_fivetran_rn";

fn is_history_column(name: &str) -> bool {
    name == START_COLUMN || name == END_COLUMN || name == ACTIVE_COLUMN
}

/// Plan a sync-mode transition of `live`.
pub fn plan_transition(
    database: &str,
    live: &Table,
    transition: SyncModeTransition,
    soft_deleted_column: &str,
    keep_deleted_rows: bool,
    names: &mut dyn TempNamer,
) -> Result<Vec<PlanStep>> {
    validate_identifier(soft_deleted_column)?;
    let table = qualify(database, &live.name);

    match transition {
        SyncModeTransition::LiveToSoftDelete => {
            Ok(live_to_soft_delete(&table, live, soft_deleted_column))
        }
        SyncModeTransition::SoftDeleteToLive => {
            require_column(live, soft_deleted_column)?;
            let flag = quote_ident(soft_deleted_column);
            Ok(vec![
                PlanStep::new(format!("DELETE FROM {} WHERE {} = TRUE", table, flag)),
                PlanStep::new(format!("ALTER TABLE {} DROP {}", table, flag)),
            ])
        }
        SyncModeTransition::LiveToHistory => {
            require_not_history(live)?;
            let (shape, select) = history_rows(&table, live, None);
            Ok(rebuild_plan(database, &live.name, &shape, &select, names))
        }
        SyncModeTransition::SoftDeleteToHistory => {
            require_not_history(live)?;
            require_column(live, soft_deleted_column)?;
            let (shape, select) = history_rows(&table, live, Some(soft_deleted_column));
            Ok(rebuild_plan(database, &live.name, &shape, &select, names))
        }
        SyncModeTransition::HistoryToLive => {
            require_history(live)?;
            let shape = without_history_columns(live);
            let columns = quoted(&shape);
            let select = if !keep_deleted_rows {
                format!(
                    "SELECT {} FROM {} WHERE {} = TRUE",
                    columns,
                    table,
                    quote_ident(ACTIVE_COLUMN)
                )
            } else if live.record_key().is_empty() {
                format!("SELECT {} FROM {}", columns, table)
            } else {
                latest_version_select(&table, live, &columns, &columns)
            };
            Ok(rebuild_plan(database, &live.name, &shape, &select, names))
        }
        SyncModeTransition::HistoryToSoftDelete => {
            require_history(live)?;
            let mut shape: Vec<Column> = without_history_columns(live)
                .into_iter()
                .filter(|c| c.name != soft_deleted_column)
                .collect();
            shape.push(Column::new(soft_deleted_column, DataType::Boolean));

            let flag = quote_ident(soft_deleted_column);
            let mut projected: Vec<String> =
                shape[..shape.len() - 1].iter().map(|c| quote_ident(&c.name)).collect();
            let outer = quoted(&shape);
            projected.push(format!("NOT {} AS {}", quote_ident(ACTIVE_COLUMN), flag));
            let projected = projected.join(", ");

            let select = if live.record_key().is_empty() {
                format!("SELECT {} FROM {}", projected, table)
            } else {
                latest_version_select(&table, live, &projected, &outer)
            };
            Ok(rebuild_plan(database, &live.name, &shape, &select, names))
        }
    }
}

fn live_to_soft_delete(table: &str, live: &Table, soft_deleted_column: &str) -> Vec<PlanStep> {
    let flag = quote_ident(soft_deleted_column);
    if live.has_column(soft_deleted_column) {
        return vec![PlanStep::new(format!(
            "UPDATE {} SET {} = FALSE WHERE {} IS NULL",
            table, flag, flag
        ))];
    }
    vec![
        PlanStep::new(format!("ALTER TABLE {} ADD {} BOOL", table, flag)),
        PlanStep::new(format!("UPDATE {} SET {} = FALSE", table, flag))
            .cleanup(format!("ALTER TABLE {} DROP {}", table, flag)),
    ]
}

/// New history layout of `live` and the query that fills it.
///
/// Without a soft-delete column every row becomes an open version starting
/// now. With one, deleted rows are back-dated and closed at the minimum
/// timestamp, and the others start at the last sync time.
pub(crate) fn history_rows(table: &str, live: &Table, soft_deleted_column: Option<&str>) -> (Vec<Column>, String) {
    let mut shape: Vec<Column> = live
        .columns
        .iter()
        .filter(|c| !is_history_column(&c.name) && Some(c.name.as_str()) != soft_deleted_column)
        .cloned()
        .collect();
    let mut select: Vec<String> = shape.iter().map(|c| quote_ident(&c.name)).collect();

    shape.push(Column::new(START_COLUMN, DataType::NaiveDatetime).primary());
    shape.push(Column::new(END_COLUMN, DataType::NaiveDatetime));
    shape.push(Column::new(ACTIVE_COLUMN, DataType::Boolean));

    match soft_deleted_column {
        None => {
            select.push("NOW(6)".to_string());
            select.push(quote_literal(MAX_TIMESTAMP));
            select.push("TRUE".to_string());
        }
        Some(flag) => {
            let deleted = format!("{} = TRUE", quote_ident(flag));
            let last_sync = if live.has_column(SYNCED_COLUMN) {
                format!(
                    "COALESCE((SELECT MAX({}) FROM {}), NOW(6))",
                    quote_ident(SYNCED_COLUMN),
                    table
                )
            } else {
                "NOW(6)".to_string()
            };
            select.push(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                deleted,
                quote_literal(MIN_TIMESTAMP),
                last_sync
            ));
            select.push(format!(
                "CASE WHEN {} THEN {} ELSE {} END",
                deleted,
                quote_literal(MIN_TIMESTAMP),
                quote_literal(MAX_TIMESTAMP)
            ));
            select.push(format!("CASE WHEN {} THEN FALSE ELSE TRUE END", deleted));
        }
    }

    let select = format!("SELECT {} FROM {}", select.join(", "), table);
    (shape, select)
}

/// Keep the most recent version per record key.
///
/// `projection` is evaluated against the history table, `outer` selects the
/// same columns by name from the ranked subquery.
fn latest_version_select(table: &str, live: &Table, projection: &str, outer: &str) -> String {
    let key: Vec<String> = live.record_key().iter().map(|c| quote_ident(&c.name)).collect();
    format!(
        "SELECT {} FROM (SELECT {}, ROW_NUMBER() OVER (PARTITION BY {} ORDER BY {} DESC) AS {} FROM {}) AS ranked WHERE {} = 1",
        outer,
        projection,
        key.join(", "),
        quote_ident(START_COLUMN),
        quote_ident(ROW_NUMBER_ALIAS),
        table,
        quote_ident(ROW_NUMBER_ALIAS)
    )
}

fn without_history_columns(live: &Table) -> Vec<Column> {
    live.columns
        .iter()
        .filter(|c| !is_history_column(&c.name))
        .cloned()
        .collect()
}

fn quoted(columns: &[Column]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn require_column(live: &Table, column: &str) -> Result<()> {
    if live.has_column(column) {
        Ok(())
    } else {
        Err(ApplyError::PreconditionFailed(format!(
            "Table {} has no column {}",
            live.name, column
        )))
    }
}

fn require_history(live: &Table) -> Result<()> {
    if live.is_history_table() {
        Ok(())
    } else {
        Err(ApplyError::PreconditionFailed(format!(
            "Table {} is not in history mode",
            live.name
        )))
    }
}

fn require_not_history(live: &Table) -> Result<()> {
    if live.is_history_table() {
        Err(ApplyError::PreconditionFailed(format!(
            "Table {} is already in history mode",
            live.name
        )))
    } else {
        Ok(())
    }
}
