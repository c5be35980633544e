//! End-to-end scenarios against a live SingleStore.
//!
//! Run with `cargo test -- --ignored` after setting `SINGLESTORE_TEST_HOST`
//! (and optionally `SINGLESTORE_TEST_PORT`, `SINGLESTORE_TEST_USER`,
//! `SINGLESTORE_TEST_PASSWORD`, `SINGLESTORE_TEST_DATABASE`).

use std::env;
use std::io::Write;

use chrono::DateTime;
use singlestore_destination::core::schema::{ACTIVE_COLUMN, END_COLUMN, START_COLUMN, SYNCED_COLUMN};
use singlestore_destination::core::Statement;
use singlestore_destination::orchestrator::{
    CreateTableRequest, TruncateRequest, WriteBatchRequest,
};
use singlestore_destination::{
    Column, Connection, DataType, FileParams, Orchestrator, SingleStoreConnection, Table,
    TargetConfig, WriteMode,
};
use tempfile::NamedTempFile;

fn test_config() -> Option<TargetConfig> {
    let host = env::var("SINGLESTORE_TEST_HOST").ok()?;
    Some(TargetConfig {
        host,
        port: env::var("SINGLESTORE_TEST_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3306),
        user: env::var("SINGLESTORE_TEST_USER").unwrap_or_else(|_| "root".to_string()),
        password: env::var("SINGLESTORE_TEST_PASSWORD").unwrap_or_default(),
        database: None,
        ssl_mode: "disable".to_string(),
        driver_parameters: None,
    })
}

fn database() -> String {
    env::var("SINGLESTORE_TEST_DATABASE").unwrap_or_else(|_| "destination_it".to_string())
}

async fn orchestrator() -> Option<Orchestrator<SingleStoreConnection>> {
    let config = test_config()?;
    let conn = SingleStoreConnection::connect(&config).await.unwrap();
    Some(Orchestrator::new(conn))
}

/// Drop and recreate `table`, then load `rows` (SQL value tuples).
async fn fresh_table(orch: &mut Orchestrator<SingleStoreConnection>, table: &Table, rows: &[&str]) {
    let db = database();
    orch.connection()
        .execute(&Statement::new(format!(
            "DROP TABLE IF EXISTS `{}`.`{}`",
            db, table.name
        )))
        .await
        .unwrap();
    orch.create_table(
        &CreateTableRequest {
            database: db.clone(),
            table: table.clone(),
        },
        &mut Vec::new(),
    )
    .await
    .unwrap();
    for row in rows {
        orch.connection()
            .execute(&Statement::new(format!(
                "INSERT INTO `{}`.`{}` VALUES {}",
                db, table.name, row
            )))
            .await
            .unwrap();
    }
}

async fn scalar(orch: &mut Orchestrator<SingleStoreConnection>, sql: &str) -> Option<String> {
    orch.connection().query_scalar(sql).await.unwrap()
}

fn csv_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn batch(table: Table, mode: WriteMode) -> WriteBatchRequest {
    WriteBatchRequest {
        database: database(),
        table,
        mode,
        replace_files: Vec::new(),
        update_files: Vec::new(),
        delete_files: Vec::new(),
        earliest_start_files: Vec::new(),
        keys: Default::default(),
        file_params: FileParams::default(),
        batch_size: None,
    }
}

#[tokio::test]
#[ignore = "requires a SingleStore instance (SINGLESTORE_TEST_HOST)"]
async fn test_delete_rows_by_key() {
    let Some(mut orch) = orchestrator().await else {
        return;
    };
    let table = Table::new(
        "it_delete",
        vec![
            Column::new("c1", DataType::Int).primary(),
            Column::new("c2", DataType::Int),
            Column::new("c3", DataType::Int),
        ],
    );
    fresh_table(
        &mut orch,
        &table,
        &["(1, 2, 3), (4, 5, 6), (7, 8, 9), (10, 11, 12)"],
    )
    .await;

    let file = csv_file("c1,c2,c3\n4,0,0\n7,0,0\n100,0,0\n");
    let mut request = batch(table, WriteMode::Live);
    request.delete_files.push(file.path().to_path_buf());
    orch.write_batch(&request).await.unwrap();

    let remaining = scalar(
        &mut orch,
        &format!(
            "SELECT GROUP_CONCAT(CONCAT(c1, '-', c2, '-', c3) ORDER BY c1) FROM `{}`.`it_delete`",
            database()
        ),
    )
    .await;
    assert_eq!(remaining.as_deref(), Some("1-2-3,10-11-12"));
}

#[tokio::test]
#[ignore = "requires a SingleStore instance (SINGLESTORE_TEST_HOST)"]
async fn test_update_history_closes_previous_version() {
    let Some(mut orch) = orchestrator().await else {
        return;
    };
    let table = Table::new(
        "it_history",
        vec![
            Column::new("id", DataType::Int).primary(),
            Column::new("name", DataType::String),
            Column::new(START_COLUMN, DataType::NaiveDatetime).primary(),
            Column::new(END_COLUMN, DataType::NaiveDatetime),
            Column::new(ACTIVE_COLUMN, DataType::Boolean),
        ],
    );
    fresh_table(
        &mut orch,
        &table,
        &["(1, 'old', '2005-05-24 00:00:00', '9999-12-31 23:59:59.999999', TRUE)"],
    )
    .await;

    let file = csv_file("id,name,_fivetran_start\n1,renamed,2005-05-25T20:57:00Z\n");
    let mut request = batch(table, WriteMode::History);
    request.update_files.push(file.path().to_path_buf());
    orch.write_batch(&request).await.unwrap();

    let db = database();
    let closed_end = scalar(
        &mut orch,
        &format!(
            "SELECT DATE_FORMAT(`_fivetran_end`, '%Y-%m-%d %H:%i:%s.%f') \
             FROM `{}`.`it_history` WHERE name = 'old'",
            db
        ),
    )
    .await;
    assert_eq!(closed_end.as_deref(), Some("2005-05-25 20:56:59.999999"));

    let active = scalar(
        &mut orch,
        &format!(
            "SELECT name FROM `{}`.`it_history` WHERE `_fivetran_active` = TRUE",
            db
        ),
    )
    .await;
    assert_eq!(active.as_deref(), Some("renamed"));
}

#[tokio::test]
#[ignore = "requires a SingleStore instance (SINGLESTORE_TEST_HOST)"]
async fn test_soft_truncate_flags_older_rows() {
    let Some(mut orch) = orchestrator().await else {
        return;
    };
    let table = Table::new(
        "it_truncate",
        vec![
            Column::new("id", DataType::Int).primary(),
            Column::new(SYNCED_COLUMN, DataType::UtcDatetime),
            Column::new("_fivetran_deleted", DataType::Boolean),
        ],
    );
    // Row 3 sits exactly on the cutoff; row 5 was already deleted.
    fresh_table(
        &mut orch,
        &table,
        &[
            "(1, FROM_UNIXTIME(2147483647.123456), FALSE)",
            "(2, FROM_UNIXTIME(2147483647.123457), FALSE)",
            "(3, FROM_UNIXTIME(2147483647.123458), FALSE)",
            "(4, FROM_UNIXTIME(2147483647.123459), FALSE)",
            "(5, FROM_UNIXTIME(2147483647.000001), TRUE)",
        ],
    )
    .await;

    let request = TruncateRequest {
        database: database(),
        table: "it_truncate".to_string(),
        synced_column: SYNCED_COLUMN.to_string(),
        delete_before: DateTime::from_timestamp(2_147_483_647, 123_458_000).unwrap(),
        soft_deleted_column: Some("_fivetran_deleted".to_string()),
    };
    orch.truncate(&request, &mut Vec::new()).await.unwrap();

    let db = database();
    let deleted = scalar(
        &mut orch,
        &format!(
            "SELECT GROUP_CONCAT(id ORDER BY id) FROM `{}`.`it_truncate` WHERE `_fivetran_deleted` = TRUE",
            db
        ),
    )
    .await;
    assert_eq!(deleted.as_deref(), Some("1,2,5"));

    let kept = scalar(
        &mut orch,
        &format!(
            "SELECT GROUP_CONCAT(id ORDER BY id) FROM `{}`.`it_truncate` WHERE `_fivetran_deleted` = FALSE",
            db
        ),
    )
    .await;
    assert_eq!(kept.as_deref(), Some("3,4"));
}
