//! SingleStore connection over the MySQL wire protocol.
//!
//! Wraps a single `mysql_async` session. Plan steps and batch statements rely
//! on running in order on the same session, so there is no pool here.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, SslOpts};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::identifier::quote_literal;
use crate::core::schema::CatalogColumn;
use crate::core::traits::Connection;
use crate::core::value::{SqlValue, Statement};
use crate::error::{ApplyError, Result};

const CATALOG_QUERY: &str = "SELECT COLUMN_NAME, UPPER(DATA_TYPE), IS_NULLABLE, \
     CHARACTER_OCTET_LENGTH, NUMERIC_PRECISION, NUMERIC_SCALE, COLUMN_KEY \
     FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

const DATABASE_QUERY: &str =
    "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?";

/// An open session on a SingleStore cluster.
pub struct SingleStoreConnection {
    conn: Conn,
}

impl SingleStoreConnection {
    /// Open a session and verify it with `SELECT 1`.
    ///
    /// Every session starts with `SET NAMES utf8mb4` followed by one
    /// `SET SESSION` per driver parameter.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("SingleStore TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "prefer" | "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify_ca" => {
                Some(SslOpts::default().with_danger_skip_domain_validation(true))
            }
            "verify-full" | "verify_identity" => Some(SslOpts::default()),
            _ => {
                warn!(
                    "Unknown ssl_mode '{}', defaulting to Preferred",
                    config.ssl_mode
                );
                Some(SslOpts::default().with_danger_accept_invalid_certs(true))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .db_name(config.database.clone())
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .init(session_init(config)?);

        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let opts: Opts = builder.into();
        let conn = Conn::new(opts)
            .await
            .map_err(|e| ApplyError::connection(e, "opening SingleStore session"))?;
        let mut session = Self { conn };
        session.ping().await?;

        info!(
            "Connected to SingleStore: {}:{}/{}",
            config.host,
            config.port,
            config.database.as_deref().unwrap_or("")
        );

        Ok(session)
    }

    /// Run `SELECT 1` on the open session.
    pub async fn ping(&mut self) -> Result<()> {
        self.conn
            .query_drop("SELECT 1")
            .await
            .map_err(|e| ApplyError::connection(e, "testing SingleStore connection"))
    }

    /// Close the session.
    pub async fn close(self) -> Result<()> {
        self.conn
            .disconnect()
            .await
            .map_err(|e| ApplyError::connection(e, "closing SingleStore session"))
    }
}

/// Statements run when the session opens.
fn session_init(config: &TargetConfig) -> Result<Vec<String>> {
    let mut init = vec!["SET NAMES utf8mb4".to_string()];
    for (key, value) in config.session_settings()? {
        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(ApplyError::MalformedInput(format!(
                "Driver parameter '{}' is not a valid session variable name",
                key
            )));
        }
        init.push(format!("SET SESSION {} = {}", key, setting_value(&value)));
    }
    Ok(init)
}

/// Numbers pass through as-is, everything else becomes a string literal.
fn setting_value(value: &str) -> String {
    if !value.is_empty() && value.parse::<f64>().is_ok() {
        value.to_string()
    } else {
        quote_literal(value)
    }
}

#[async_trait]
impl Connection for SingleStoreConnection {
    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        debug!("Executing: {}", statement.sql);

        if statement.params.is_empty() {
            self.conn
                .query_drop(&statement.sql)
                .await
                .map_err(|e| ApplyError::statement(statement.sql.clone(), e))?;
        } else {
            let params = statement
                .params
                .iter()
                .map(|p| p.to_sql_value().map(|v| sql_value_to_mysql(&v)))
                .collect::<Result<Vec<_>>>()?;
            self.conn
                .exec_drop(&statement.sql, params)
                .await
                .map_err(|e| ApplyError::statement(statement.sql.clone(), e))?;
        }

        Ok(self.conn.affected_rows())
    }

    async fn query_scalar(&mut self, sql: &str) -> Result<Option<String>> {
        let value: Option<Option<String>> = self
            .conn
            .query_first(sql)
            .await
            .map_err(|e| ApplyError::statement(sql, e))?;
        Ok(value.flatten())
    }

    async fn database_exists(&mut self, database: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .exec_first(DATABASE_QUERY, (database,))
            .await
            .map_err(|e| ApplyError::statement(DATABASE_QUERY, e))?;
        Ok(found.is_some())
    }

    async fn catalog_columns(
        &mut self,
        database: &str,
        table: &str,
    ) -> Result<Vec<CatalogColumn>> {
        type CatalogRow = (
            String,
            String,
            String,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            String,
        );

        let rows: Vec<CatalogRow> = self
            .conn
            .exec(CATALOG_QUERY, (database, table))
            .await
            .map_err(|e| ApplyError::statement(CATALOG_QUERY, e))?;

        Ok(rows
            .into_iter()
            .map(
                |(name, native_type, nullable, byte_length, precision, scale, key)| CatalogColumn {
                    name,
                    native_type,
                    is_nullable: nullable.eq_ignore_ascii_case("YES"),
                    byte_length,
                    precision,
                    scale,
                    is_primary_key: key.eq_ignore_ascii_case("PRI"),
                },
            )
            .collect())
    }
}

/// Convert a bound value into a driver value.
fn sql_value_to_mysql(value: &SqlValue) -> mysql_async::Value {
    match value {
        SqlValue::Null => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::from(*b),
        SqlValue::I64(i) => mysql_async::Value::from(*i),
        SqlValue::F64(f) => mysql_async::Value::from(*f),
        SqlValue::Text(s) => mysql_async::Value::from(s.as_str()),
        SqlValue::Bytes(b) => mysql_async::Value::from(b.as_slice()),
    }
}
