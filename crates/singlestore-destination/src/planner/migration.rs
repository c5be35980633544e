//! Tagged migration operations.
//!
//! [`plan_migration`] reads whatever live state an operation needs (table
//! shape, latest history start) and hands it to a pure per-operation
//! planner, so every variant can be tested without a database.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::describe_live_table;
use crate::core::identifier::{qualify, quote_ident, quote_literal, validate_identifier, TempNamer};
use crate::core::plan::PlanStep;
use crate::core::schema::{
    Column, DataType, Table, TypeParams, ACTIVE_COLUMN, DEFAULT_SOFT_DELETE_COLUMN, END_COLUMN,
    START_COLUMN,
};
use crate::core::traits::Connection;
use crate::core::value::BoundParam;
use crate::error::{ApplyError, Result};
use crate::typemap::{format_timestamp, parse_timestamp, to_sql_type};

use super::sync_mode::{history_rows, plan_transition, SyncModeTransition};
use super::{column_list, create_table_sql, drop_table_if_exists, MAX_TIMESTAMP};

/// A schema migration requested by the platform.
///
/// Unknown `op` tags deserialize to [`Migration::Unsupported`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Migration {
    DropTable,
    DropColumnInHistoryMode {
        column: String,
        operation_timestamp: String,
    },
    AddColumnInHistoryMode {
        column: String,
        column_type: DataType,
        #[serde(default)]
        params: Option<TypeParams>,
        #[serde(default)]
        default_value: Option<String>,
        operation_timestamp: String,
    },
    AddColumnWithDefaultValue {
        column: String,
        column_type: DataType,
        #[serde(default)]
        params: Option<TypeParams>,
        #[serde(default)]
        default_value: Option<String>,
    },
    RenameTable {
        to_table: String,
    },
    RenameColumn {
        from_column: String,
        to_column: String,
    },
    CopyTable {
        to_table: String,
    },
    CopyColumn {
        from_column: String,
        to_column: String,
    },
    CopyTableToHistoryMode {
        to_table: String,
        #[serde(default)]
        soft_deleted_column: Option<String>,
    },
    UpdateColumnValue {
        column: String,
        #[serde(default)]
        value: Option<String>,
    },
    TableSyncModeMigration {
        transition: SyncModeTransition,
        #[serde(default)]
        soft_deleted_column: Option<String>,
        #[serde(default)]
        keep_deleted_rows: bool,
    },
    #[serde(other)]
    Unsupported,
}

impl Migration {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Migration::DropTable => "drop_table",
            Migration::DropColumnInHistoryMode { .. } => "drop_column_in_history_mode",
            Migration::AddColumnInHistoryMode { .. } => "add_column_in_history_mode",
            Migration::AddColumnWithDefaultValue { .. } => "add_column_with_default_value",
            Migration::RenameTable { .. } => "rename_table",
            Migration::RenameColumn { .. } => "rename_column",
            Migration::CopyTable { .. } => "copy_table",
            Migration::CopyColumn { .. } => "copy_column",
            Migration::CopyTableToHistoryMode { .. } => "copy_table_to_history_mode",
            Migration::UpdateColumnValue { .. } => "update_column_value",
            Migration::TableSyncModeMigration { .. } => "table_sync_mode_migration",
            Migration::Unsupported => "unsupported",
        }
    }
}

/// Plan `migration` against `database`.`table`.
pub async fn plan_migration<C>(
    conn: &mut C,
    names: &mut dyn TempNamer,
    database: &str,
    table: &str,
    migration: &Migration,
) -> Result<Vec<PlanStep>>
where
    C: Connection + ?Sized,
{
    validate_identifier(database)?;
    validate_identifier(table)?;
    info!("Planning {} on {}.{}", migration.name(), database, table);

    match migration {
        Migration::Unsupported => Err(ApplyError::UnsupportedOperation(
            "Unknown migration operation".to_string(),
        )),
        Migration::DropTable => Ok(vec![PlanStep::new(drop_table_if_exists(database, table))]),
        Migration::RenameTable { to_table } => rename_table(database, table, to_table),
        Migration::RenameColumn {
            from_column,
            to_column,
        } => rename_column(database, table, from_column, to_column),
        Migration::CopyTable { to_table } => copy_table(database, table, to_table),
        Migration::AddColumnWithDefaultValue {
            column,
            column_type,
            params,
            default_value,
        } => {
            let col = new_column(column, *column_type, *params)?;
            Ok(add_column_with_default(
                database,
                table,
                &col,
                default_value.as_deref(),
            ))
        }
        Migration::CopyColumn {
            from_column,
            to_column,
        } => {
            let live = describe_live_table(conn, database, table).await?;
            copy_column(database, &live, from_column, to_column)
        }
        Migration::UpdateColumnValue { column, value } => {
            let live = describe_live_table(conn, database, table).await?;
            update_column_value(database, &live, column, value.as_deref())
        }
        Migration::DropColumnInHistoryMode {
            column,
            operation_timestamp,
        } => {
            let live = describe_live_table(conn, database, table).await?;
            let ts = parse_timestamp(operation_timestamp)?;
            let latest = max_start(conn, database, table).await?;
            drop_column_in_history_mode(database, &live, column, ts, latest)
        }
        Migration::AddColumnInHistoryMode {
            column,
            column_type,
            params,
            default_value,
            operation_timestamp,
        } => {
            let col = new_column(column, *column_type, *params)?;
            let live = describe_live_table(conn, database, table).await?;
            let ts = parse_timestamp(operation_timestamp)?;
            let latest = max_start(conn, database, table).await?;
            add_column_in_history_mode(database, &live, &col, default_value.as_deref(), ts, latest)
        }
        Migration::CopyTableToHistoryMode {
            to_table,
            soft_deleted_column,
        } => {
            let live = describe_live_table(conn, database, table).await?;
            copy_table_to_history_mode(database, &live, to_table, soft_deleted_column.as_deref())
        }
        Migration::TableSyncModeMigration {
            transition,
            soft_deleted_column,
            keep_deleted_rows,
        } => {
            let live = describe_live_table(conn, database, table).await?;
            let flag = soft_deleted_column
                .as_deref()
                .unwrap_or(DEFAULT_SOFT_DELETE_COLUMN);
            plan_transition(database, &live, *transition, flag, *keep_deleted_rows, names)
        }
    }
}

fn new_column(name: &str, data_type: DataType, params: Option<TypeParams>) -> Result<Column> {
    validate_identifier(name)?;
    let mut col = Column::new(name, data_type);
    col.params = params;
    Ok(col)
}

/// Latest `_fivetran_start` of a history table, `None` when it is empty.
async fn max_start<C>(conn: &mut C, database: &str, table: &str) -> Result<Option<NaiveDateTime>>
where
    C: Connection + ?Sized,
{
    let sql = format!(
        "SELECT DATE_FORMAT(MAX({}), '%Y-%m-%d %H:%i:%s.%f') FROM {}",
        quote_ident(START_COLUMN),
        qualify(database, table)
    );
    match conn.query_scalar(&sql).await? {
        Some(value) => {
            debug!("Latest {} of {}.{}: {}", START_COLUMN, database, table, value);
            parse_timestamp(&value).map(Some)
        }
        None => Ok(None),
    }
}

pub fn rename_table(database: &str, table: &str, to_table: &str) -> Result<Vec<PlanStep>> {
    validate_identifier(to_table)?;
    Ok(vec![PlanStep::new(format!(
        "ALTER TABLE {} RENAME TO {}",
        qualify(database, table),
        qualify(database, to_table)
    ))])
}

pub fn rename_column(
    database: &str,
    table: &str,
    from_column: &str,
    to_column: &str,
) -> Result<Vec<PlanStep>> {
    validate_identifier(from_column)?;
    validate_identifier(to_column)?;
    Ok(vec![PlanStep::new(format!(
        "ALTER TABLE {} CHANGE {} {}",
        qualify(database, table),
        quote_ident(from_column),
        quote_ident(to_column)
    ))])
}

pub fn copy_table(database: &str, table: &str, to_table: &str) -> Result<Vec<PlanStep>> {
    validate_identifier(to_table)?;
    let target = qualify(database, to_table);
    Ok(vec![
        PlanStep::new(format!(
            "CREATE TABLE {} LIKE {}",
            target,
            qualify(database, table)
        )),
        PlanStep::new(format!(
            "INSERT INTO {} SELECT * FROM {}",
            target,
            qualify(database, table)
        ))
        .cleanup(drop_table_if_exists(database, to_table)),
    ])
}

pub fn copy_column(
    database: &str,
    live: &Table,
    from_column: &str,
    to_column: &str,
) -> Result<Vec<PlanStep>> {
    validate_identifier(to_column)?;
    let source = live.column(from_column).ok_or_else(|| missing_column(live, from_column))?;
    if live.has_column(to_column) {
        return Err(ApplyError::PreconditionFailed(format!(
            "Table {} already has a column {}",
            live.name, to_column
        )));
    }

    let table = qualify(database, &live.name);
    let target = quote_ident(to_column);
    Ok(vec![
        PlanStep::new(format!(
            "ALTER TABLE {} ADD {} {}",
            table,
            target,
            to_sql_type(source.data_type, source.params.as_ref())
        )),
        PlanStep::new(format!(
            "UPDATE {} SET {} = {}",
            table,
            target,
            quote_ident(from_column)
        ))
        .cleanup(format!("ALTER TABLE {} DROP {}", table, target)),
    ])
}

pub fn add_column_with_default(
    database: &str,
    table: &str,
    col: &Column,
    default_value: Option<&str>,
) -> Vec<PlanStep> {
    let qualified = qualify(database, table);
    let column = quote_ident(&col.name);
    let mut plan = vec![PlanStep::new(format!(
        "ALTER TABLE {} ADD {} {}",
        qualified,
        column,
        to_sql_type(col.data_type, col.params.as_ref())
    ))];
    if let Some(value) = default_value {
        plan.push(
            PlanStep::with_params(
                format!("UPDATE {} SET {} = ?", qualified, column),
                vec![BoundParam::of(value, col.data_type)],
            )
            .cleanup(format!("ALTER TABLE {} DROP {}", qualified, column)),
        );
    }
    plan
}

pub fn update_column_value(
    database: &str,
    live: &Table,
    column: &str,
    value: Option<&str>,
) -> Result<Vec<PlanStep>> {
    let col = live.column(column).ok_or_else(|| missing_column(live, column))?;
    Ok(vec![PlanStep::with_params(
        format!(
            "UPDATE {} SET {} = ?",
            qualify(database, &live.name),
            quote_ident(column)
        ),
        vec![BoundParam::new(value.map(str::to_string), col.data_type)],
    )])
}

/// Fail unless every recorded version started before `ts`.
fn check_history_order(live: &Table, ts: &NaiveDateTime, latest: &NaiveDateTime) -> Result<()> {
    if latest >= ts {
        return Err(ApplyError::PreconditionFailed(format!(
            "Operation timestamp {} must be later than the latest {} of {} ({})",
            format_timestamp(ts),
            START_COLUMN,
            live.name,
            format_timestamp(latest)
        )));
    }
    Ok(())
}

fn require_history_table(live: &Table) -> Result<()> {
    if live.is_history_table() {
        Ok(())
    } else {
        Err(ApplyError::PreconditionFailed(format!(
            "Table {} is not in history mode",
            live.name
        )))
    }
}

/// Expression list that copies every active version of `live` into a new
/// version starting at `ts`, plus its bound parameters in placeholder order.
fn forward_versions(
    live: &Table,
    ts: &str,
    mut override_column: impl FnMut(&Column) -> Option<String>,
) -> (Vec<String>, Vec<BoundParam>) {
    let mut exprs = Vec::with_capacity(live.columns.len());
    let mut params = Vec::new();
    for col in &live.columns {
        let expr = match col.name.as_str() {
            START_COLUMN => {
                params.push(BoundParam::of(ts, DataType::NaiveDatetime));
                "?".to_string()
            }
            END_COLUMN => quote_literal(MAX_TIMESTAMP),
            ACTIVE_COLUMN => "TRUE".to_string(),
            _ => override_column(col).unwrap_or_else(|| quote_ident(&col.name)),
        };
        exprs.push(expr);
    }
    (exprs, params)
}

/// Close every active version that started before `ts`.
fn deactivate_step(table: &str, ts: &NaiveDateTime) -> PlanStep {
    let previous = *ts - chrono::Duration::microseconds(1);
    PlanStep::with_params(
        format!(
            "UPDATE {} SET {} = FALSE, {} = ? WHERE {} = TRUE AND {} < ?",
            table,
            quote_ident(ACTIVE_COLUMN),
            quote_ident(END_COLUMN),
            quote_ident(ACTIVE_COLUMN),
            quote_ident(START_COLUMN)
        ),
        vec![
            BoundParam::of(format_timestamp(&previous), DataType::NaiveDatetime),
            BoundParam::of(format_timestamp(ts), DataType::NaiveDatetime),
        ],
    )
}

fn active_before_clause() -> String {
    format!(
        "WHERE {} = TRUE AND {} < ?",
        quote_ident(ACTIVE_COLUMN),
        quote_ident(START_COLUMN)
    )
}

pub fn drop_column_in_history_mode(
    database: &str,
    live: &Table,
    column: &str,
    ts: NaiveDateTime,
    latest: Option<NaiveDateTime>,
) -> Result<Vec<PlanStep>> {
    require_history_table(live)?;
    let dropped = live.column(column).ok_or_else(|| missing_column(live, column))?;
    if dropped.primary_key || column == START_COLUMN || column == END_COLUMN || column == ACTIVE_COLUMN {
        return Err(ApplyError::PreconditionFailed(format!(
            "Column {} of {} cannot be dropped in history mode",
            column, live.name
        )));
    }
    let Some(latest) = latest else {
        debug!("{} is empty, nothing to drop", live.name);
        return Ok(Vec::new());
    };
    check_history_order(live, &ts, &latest)?;

    let table = qualify(database, &live.name);
    let ts_text = format_timestamp(&ts);
    let (exprs, mut params) = forward_versions(live, &ts_text, |col| {
        (col.name == column).then(|| "NULL".to_string())
    });
    params.push(BoundParam::of(ts_text.as_str(), DataType::NaiveDatetime));
    let names: Vec<&str> = live.columns.iter().map(|c| c.name.as_str()).collect();

    Ok(vec![
        PlanStep::with_params(
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {} {}",
                table,
                column_list(&names),
                exprs.join(", "),
                table,
                active_before_clause()
            ),
            params,
        ),
        deactivate_step(&table, &ts),
    ])
}

pub fn add_column_in_history_mode(
    database: &str,
    live: &Table,
    col: &Column,
    default_value: Option<&str>,
    ts: NaiveDateTime,
    latest: Option<NaiveDateTime>,
) -> Result<Vec<PlanStep>> {
    require_history_table(live)?;
    if live.has_column(&col.name) {
        return Err(ApplyError::PreconditionFailed(format!(
            "Table {} already has a column {}",
            live.name, col.name
        )));
    }

    let table = qualify(database, &live.name);
    let column = quote_ident(&col.name);
    let add = PlanStep::new(format!(
        "ALTER TABLE {} ADD {} {}",
        table,
        column,
        to_sql_type(col.data_type, col.params.as_ref())
    ));
    let Some(latest) = latest else {
        debug!("{} is empty, adding {} without new versions", live.name, col.name);
        return Ok(vec![add]);
    };
    check_history_order(live, &ts, &latest)?;

    let ts_text = format_timestamp(&ts);
    let (mut exprs, mut params) = forward_versions(live, &ts_text, |_| None);
    exprs.push("?".to_string());
    params.push(BoundParam::new(default_value.map(str::to_string), col.data_type));
    params.push(BoundParam::of(ts_text.as_str(), DataType::NaiveDatetime));

    let mut names: Vec<&str> = live.columns.iter().map(|c| c.name.as_str()).collect();
    names.push(&col.name);

    Ok(vec![
        add,
        PlanStep::with_params(
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {} {}",
                table,
                column_list(&names),
                exprs.join(", "),
                table,
                active_before_clause()
            ),
            params,
        )
        .cleanup(format!("ALTER TABLE {} DROP {}", table, column)),
        deactivate_step(&table, &ts),
    ])
}

/// Create `to_table` directly in history shape and fill it from `live`.
pub fn copy_table_to_history_mode(
    database: &str,
    live: &Table,
    to_table: &str,
    soft_deleted_column: Option<&str>,
) -> Result<Vec<PlanStep>> {
    validate_identifier(to_table)?;
    if live.is_history_table() {
        return Err(ApplyError::PreconditionFailed(format!(
            "Table {} is already in history mode",
            live.name
        )));
    }
    let soft = soft_deleted_column.filter(|c| live.has_column(c));
    let (shape, select) = history_rows(&qualify(database, &live.name), live, soft);
    let names: Vec<&str> = shape.iter().map(|c| c.name.as_str()).collect();

    Ok(vec![
        PlanStep::new(create_table_sql(database, &Table::new(to_table, shape.clone()))),
        PlanStep::new(format!(
            "INSERT INTO {} ({}) {}",
            qualify(database, to_table),
            column_list(&names),
            select
        ))
        .cleanup(drop_table_if_exists(database, to_table)),
    ])
}

fn missing_column(live: &Table, column: &str) -> ApplyError {
    ApplyError::PreconditionFailed(format!("Table {} has no column {}", live.name, column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::SequentialNamer;
    use crate::core::schema::SYNCED_COLUMN;
    use crate::testing::MockConnection;

    const MAX_START_QUERY: &str = "DATE_FORMAT(MAX(`_fivetran_start`)";

    fn history_table() -> Table {
        Table::new(
            "items",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("name", DataType::String),
                Column::new(START_COLUMN, DataType::NaiveDatetime).primary(),
                Column::new(END_COLUMN, DataType::NaiveDatetime),
                Column::new(ACTIVE_COLUMN, DataType::Boolean),
            ],
        )
    }

    fn live_table() -> Table {
        Table::new(
            "items",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("name", DataType::String),
                Column::new(SYNCED_COLUMN, DataType::UtcDatetime),
            ],
        )
    }

    async fn plan(conn: &mut MockConnection, migration: Migration) -> Result<Vec<PlanStep>> {
        let mut names = SequentialNamer::new();
        plan_migration(conn, &mut names, "db", "items", &migration).await
    }

    fn values(step: &PlanStep) -> Vec<Option<&str>> {
        step.params().iter().map(|p| p.value.as_deref()).collect()
    }

    #[test]
    fn test_migration_yaml_tags() {
        let m: Migration = serde_yaml::from_str("op: rename_table\nto_table: archive\n").unwrap();
        assert_eq!(
            m,
            Migration::RenameTable {
                to_table: "archive".to_string()
            }
        );

        let m: Migration = serde_yaml::from_str(
            "op: table_sync_mode_migration\ntransition: history_to_live\nkeep_deleted_rows: true\n",
        )
        .unwrap();
        assert_eq!(
            m,
            Migration::TableSyncModeMigration {
                transition: SyncModeTransition::HistoryToLive,
                soft_deleted_column: None,
                keep_deleted_rows: true,
            }
        );

        let m: Migration = serde_yaml::from_str("op: reticulate_splines\n").unwrap();
        assert_eq!(m, Migration::Unsupported);
    }

    #[tokio::test]
    async fn test_unsupported_migration() {
        let mut conn = MockConnection::new();
        let err = plan(&mut conn, Migration::Unsupported).await.unwrap_err();
        assert!(matches!(err, ApplyError::UnsupportedOperation(_)));
    }

    #[tokio::test]
    async fn test_simple_renderings() {
        let mut conn = MockConnection::new();
        let steps = plan(&mut conn, Migration::DropTable).await.unwrap();
        assert_eq!(steps[0].sql(), "DROP TABLE IF EXISTS `db`.`items`");

        let steps = plan(
            &mut conn,
            Migration::RenameTable {
                to_table: "old_items".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(
            steps[0].sql(),
            "ALTER TABLE `db`.`items` RENAME TO `db`.`old_items`"
        );

        let steps = plan(
            &mut conn,
            Migration::RenameColumn {
                from_column: "name".to_string(),
                to_column: "title".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(steps[0].sql(), "ALTER TABLE `db`.`items` CHANGE `name` `title`");

        let steps = plan(
            &mut conn,
            Migration::CopyTable {
                to_table: "items_copy".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(steps[0].sql(), "CREATE TABLE `db`.`items_copy` LIKE `db`.`items`");
        assert_eq!(
            steps[1].cleanup_sql(),
            Some("DROP TABLE IF EXISTS `db`.`items_copy`")
        );
    }

    #[tokio::test]
    async fn test_copy_column_uses_live_type() {
        let mut conn = MockConnection::new().with_table("db", &live_table());
        let steps = plan(
            &mut conn,
            Migration::CopyColumn {
                from_column: "id".to_string(),
                to_column: "id_copy".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(steps[0].sql(), "ALTER TABLE `db`.`items` ADD `id_copy` INT");
        assert_eq!(steps[1].sql(), "UPDATE `db`.`items` SET `id_copy` = `id`");
        assert_eq!(
            steps[1].cleanup_sql(),
            Some("ALTER TABLE `db`.`items` DROP `id_copy`")
        );
    }

    #[tokio::test]
    async fn test_update_column_value_binds_live_type() {
        let mut conn = MockConnection::new().with_table("db", &live_table());
        let steps = plan(
            &mut conn,
            Migration::UpdateColumnValue {
                column: "id".to_string(),
                value: Some("42".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(steps[0].sql(), "UPDATE `db`.`items` SET `id` = ?");
        assert_eq!(steps[0].params(), &[BoundParam::of("42", DataType::Int)]);

        let err = plan(
            &mut conn,
            Migration::UpdateColumnValue {
                column: "missing".to_string(),
                value: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApplyError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_add_column_with_default_value() {
        let mut conn = MockConnection::new();
        let steps = plan(
            &mut conn,
            Migration::AddColumnWithDefaultValue {
                column: "qty".to_string(),
                column_type: DataType::Long,
                params: None,
                default_value: Some("0".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(steps[0].sql(), "ALTER TABLE `db`.`items` ADD `qty` BIGINT");
        assert_eq!(steps[1].sql(), "UPDATE `db`.`items` SET `qty` = ?");
        assert_eq!(steps[1].cleanup_sql(), Some("ALTER TABLE `db`.`items` DROP `qty`"));
    }

    #[tokio::test]
    async fn test_drop_column_in_history_mode() {
        let mut conn = MockConnection::new()
            .with_table("db", &history_table())
            .with_scalar(MAX_START_QUERY, Some("2005-05-24 20:57:00.000000"));
        let steps = plan(
            &mut conn,
            Migration::DropColumnInHistoryMode {
                column: "name".to_string(),
                operation_timestamp: "2005-05-25T20:57:00Z".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(
            steps[0].sql(),
            "INSERT INTO `db`.`items` (`id`, `name`, `_fivetran_start`, `_fivetran_end`, `_fivetran_active`) \
             SELECT `id`, NULL, ?, '9999-12-31 23:59:59.999999', TRUE FROM `db`.`items` \
             WHERE `_fivetran_active` = TRUE AND `_fivetran_start` < ?"
        );
        assert_eq!(
            values(&steps[0]),
            vec![
                Some("2005-05-25 20:57:00.000000"),
                Some("2005-05-25 20:57:00.000000")
            ]
        );
        assert_eq!(
            steps[1].sql(),
            "UPDATE `db`.`items` SET `_fivetran_active` = FALSE, `_fivetran_end` = ? \
             WHERE `_fivetran_active` = TRUE AND `_fivetran_start` < ?"
        );
        assert_eq!(
            values(&steps[1]),
            vec![
                Some("2005-05-25 20:56:59.999999"),
                Some("2005-05-25 20:57:00.000000")
            ]
        );
    }

    #[tokio::test]
    async fn test_drop_column_in_history_mode_preconditions() {
        let drop = || Migration::DropColumnInHistoryMode {
            column: "name".to_string(),
            operation_timestamp: "2005-05-25T20:57:00Z".to_string(),
        };

        let mut empty = MockConnection::new().with_table("db", &history_table());
        assert!(plan(&mut empty, drop()).await.unwrap().is_empty());

        let mut newer = MockConnection::new()
            .with_table("db", &history_table())
            .with_scalar(MAX_START_QUERY, Some("2005-05-25 20:57:00.000000"));
        let err = plan(&mut newer, drop()).await.unwrap_err();
        assert!(matches!(err, ApplyError::PreconditionFailed(_)));

        let mut missing = MockConnection::new()
            .with_table("db", &history_table())
            .with_scalar(MAX_START_QUERY, Some("2000-01-01 00:00:00.000000"));
        let err = plan(
            &mut missing,
            Migration::DropColumnInHistoryMode {
                column: "nope".to_string(),
                operation_timestamp: "2005-05-25T20:57:00Z".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApplyError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_add_column_in_history_mode() {
        let add = || Migration::AddColumnInHistoryMode {
            column: "price".to_string(),
            column_type: DataType::Double,
            params: None,
            default_value: Some("9.5".to_string()),
            operation_timestamp: "2005-05-25T20:57:00Z".to_string(),
        };

        let mut empty = MockConnection::new().with_table("db", &history_table());
        let steps = plan(&mut empty, add()).await.unwrap();
        assert_eq!(
            steps.iter().map(|s| s.sql()).collect::<Vec<_>>(),
            vec!["ALTER TABLE `db`.`items` ADD `price` DOUBLE"]
        );

        let mut conn = MockConnection::new()
            .with_table("db", &history_table())
            .with_scalar(MAX_START_QUERY, Some("2005-05-24 20:57:00.000000"));
        let steps = plan(&mut conn, add()).await.unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(
            steps[1].sql(),
            "INSERT INTO `db`.`items` (`id`, `name`, `_fivetran_start`, `_fivetran_end`, `_fivetran_active`, `price`) \
             SELECT `id`, `name`, ?, '9999-12-31 23:59:59.999999', TRUE, ? FROM `db`.`items` \
             WHERE `_fivetran_active` = TRUE AND `_fivetran_start` < ?"
        );
        assert_eq!(steps[1].params()[1], BoundParam::of("9.5", DataType::Double));
        assert_eq!(
            steps[1].cleanup_sql(),
            Some("ALTER TABLE `db`.`items` DROP `price`")
        );
        assert!(steps[2].sql().starts_with("UPDATE `db`.`items` SET `_fivetran_active` = FALSE"));
    }

    #[tokio::test]
    async fn test_copy_table_to_history_mode() {
        let mut conn = MockConnection::new().with_table("db", &live_table());
        let steps = plan(
            &mut conn,
            Migration::CopyTableToHistoryMode {
                to_table: "items_history".to_string(),
                soft_deleted_column: None,
            },
        )
        .await
        .unwrap();
        assert!(steps[0]
            .sql()
            .starts_with("CREATE TABLE `db`.`items_history` (`id` INT"));
        assert!(steps[0]
            .sql()
            .ends_with("PRIMARY KEY (`id`, `_fivetran_start`))"));
        assert!(steps[1].sql().starts_with("INSERT INTO `db`.`items_history` ("));
        assert_eq!(
            steps[1].cleanup_sql(),
            Some("DROP TABLE IF EXISTS `db`.`items_history`")
        );
    }

    #[tokio::test]
    async fn test_sync_mode_migration_defaults_flag_column() {
        let mut conn = MockConnection::new().with_table("db", &live_table());
        let steps = plan(
            &mut conn,
            Migration::TableSyncModeMigration {
                transition: SyncModeTransition::LiveToSoftDelete,
                soft_deleted_column: None,
                keep_deleted_rows: false,
            },
        )
        .await
        .unwrap();
        assert_eq!(steps[0].sql(), "ALTER TABLE `db`.`items` ADD `_fivetran_deleted` BOOL");
    }

    #[tokio::test]
    async fn test_migration_on_missing_table() {
        let mut conn = MockConnection::new();
        let err = plan(
            &mut conn,
            Migration::CopyColumn {
                from_column: "a".to_string(),
                to_column: "b".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_table_not_found());
    }
}
