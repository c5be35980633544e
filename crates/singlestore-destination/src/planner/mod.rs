//! Schema planners.
//!
//! - [`ddl`]: create, truncate and alter plans from a desired table shape
//! - [`migration`]: tagged migration operations (rename, copy, history-mode
//!   column changes, sync-mode transitions)
//! - [`sync_mode`]: transforms between live, soft-delete and history tables
//!
//! Planners only build [`PlanStep`] lists. Execution, and the cleanup that
//! runs when a step fails, belongs to [`crate::core::plan::execute_plan`].

pub mod ddl;
pub mod migration;
pub mod sync_mode;

pub use ddl::{plan_alter, plan_create, plan_truncate};
pub use migration::{plan_migration, Migration};
pub use sync_mode::{plan_transition, SyncModeTransition};

use crate::core::identifier::{qualify, quote_ident, TempNamer};
use crate::core::plan::PlanStep;
use crate::core::schema::{Column, Table};
use crate::typemap::column_sql_type;

/// `_fivetran_end` of an open history version.
pub const MAX_TIMESTAMP: &str = "9999-12-31 23:59:59.999999";

/// Start and end of versions that were deleted before history began.
pub const MIN_TIMESTAMP: &str = "1000-01-01 00:00:00";

/// Render a column definition list, with a trailing key clause when any
/// column is flagged primary key.
pub(crate) fn column_definitions(columns: &[Column]) -> String {
    let mut defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), column_sql_type(c)))
        .collect();

    let pk: Vec<String> = columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| quote_ident(&c.name))
        .collect();
    if !pk.is_empty() {
        defs.push(format!("PRIMARY KEY ({})", pk.join(", ")));
    }

    defs.join(", ")
}

/// `CREATE TABLE` statement for `table` in `database`.
pub(crate) fn create_table_sql(database: &str, table: &Table) -> String {
    format!(
        "CREATE TABLE {} ({})",
        qualify(database, &table.name),
        column_definitions(&table.columns)
    )
}

/// Comma-separated list of quoted column names.
pub(crate) fn column_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn drop_table_if_exists(database: &str, table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", qualify(database, table))
}

/// Operator warning for a failed rename of a rebuilt table.
pub(crate) fn rename_table_warning(database: &str, table: &str, temp: &str) -> String {
    format!(
        "Table {} has been dropped and its data now lives in {}. Rename {} to {} manually.",
        qualify(database, table),
        qualify(database, temp),
        qualify(database, temp),
        quote_ident(table)
    )
}

/// Rebuild `table` through a temporary copy.
///
/// `shape` is the new column layout and `select` the query (reading from the
/// original table) that produces one row per new row, with its output columns
/// in `shape` order.
pub(crate) fn rebuild_plan(
    database: &str,
    table: &str,
    shape: &[Column],
    select: &str,
    names: &mut dyn TempNamer,
) -> Vec<PlanStep> {
    let temp = names.temp_name(table);
    let original = qualify(database, table);
    let temp_qualified = qualify(database, &temp);
    let drop_temp = drop_table_if_exists(database, &temp);
    let column_names: Vec<&str> = shape.iter().map(|c| c.name.as_str()).collect();

    vec![
        PlanStep::new(create_table_sql(database, &Table::new(&temp, shape.to_vec()))),
        PlanStep::new(format!(
            "INSERT INTO {} ({}) {}",
            temp_qualified,
            column_list(&column_names),
            select
        ))
        .cleanup(drop_temp.clone()),
        PlanStep::new(format!("DROP TABLE {}", original)).cleanup(drop_temp),
        PlanStep::new(format!("ALTER TABLE {} RENAME TO {}", temp_qualified, original))
            .warning(rename_table_warning(database, table, &temp)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identifier::SequentialNamer;
    use crate::core::schema::DataType;

    #[test]
    fn test_column_definitions_with_key() {
        let cols = vec![
            Column::new("id", DataType::Long).primary(),
            Column::new("name", DataType::String),
        ];
        assert_eq!(
            column_definitions(&cols),
            "`id` BIGINT, `name` LONGTEXT CHARACTER SET utf8mb4, PRIMARY KEY (`id`)"
        );
    }

    #[test]
    fn test_rebuild_plan_shape() {
        let shape = vec![Column::new("id", DataType::Int).primary()];
        let mut names = SequentialNamer::new();
        let plan = rebuild_plan("db", "t", &shape, "SELECT `id` FROM `db`.`t`", &mut names);

        let sql: Vec<&str> = plan.iter().map(|s| s.sql()).collect();
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE `db`.`t_tmp_000001` (`id` INT, PRIMARY KEY (`id`))",
                "INSERT INTO `db`.`t_tmp_000001` (`id`) SELECT `id` FROM `db`.`t`",
                "DROP TABLE `db`.`t`",
                "ALTER TABLE `db`.`t_tmp_000001` RENAME TO `db`.`t`",
            ]
        );
        assert_eq!(plan[0].cleanup_sql(), None);
        assert_eq!(
            plan[1].cleanup_sql(),
            Some("DROP TABLE IF EXISTS `db`.`t_tmp_000001`")
        );
        assert_eq!(plan[2].cleanup_sql(), plan[1].cleanup_sql());
        assert!(plan[3].warning_message().unwrap().contains("`db`.`t_tmp_000001`"));
    }
}
