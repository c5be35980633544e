//! Batch apply engine.
//!
//! A batch file goes through decrypt → decompress → CSV parse
//! ([`decode`]) and its rows are fed to one [`Writer`], which turns them
//! into statements:
//!
//! | category | live mode | history mode |
//! |---|---|---|
//! | replace | [`replace::ReplaceWriter`] | [`replace::ReplaceWriter`] |
//! | update | [`update::UpdateWriter`] | [`history::UpdateHistoryWriter`] |
//! | delete | [`delete::DeleteWriter`] | [`history::DeleteHistoryWriter`] |
//! | earliest start | unsupported | [`history::EarliestStartWriter`] |

pub mod decode;
pub mod delete;
pub mod history;
pub mod replace;
pub mod update;
pub mod writer;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::traits::Connection;
use crate::core::value::Statement;
use crate::error::Result;

pub use writer::{FileCategory, RowWriter, WriteMode, Writer, WriterContext};

/// Largest number of `?` placeholders in one statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// Compression applied to batch files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

/// Encryption applied to batch files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encryption {
    #[default]
    None,
    /// AES-256-CBC with a leading 16-byte IV and PKCS#7 padding.
    Aes,
}

/// How the fields of a batch file are to be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileParams {
    /// Field value that stands for SQL NULL.
    #[serde(default = "default_null_string")]
    pub null_string: String,

    /// Field value meaning "leave this column unchanged".
    #[serde(default = "default_unmodified_string")]
    pub unmodified_string: String,

    #[serde(default)]
    pub compression: Compression,

    #[serde(default)]
    pub encryption: Encryption,

    /// Rows per commit. Requests carry it separately, see
    /// [`crate::orchestrator::WriteBatchRequest::batch_size`].
    #[serde(skip, default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_null_string() -> String {
    "null-string".to_string()
}

fn default_unmodified_string() -> String {
    "unmod-NcK9NIjPUutCsz4mjOQQztbnwnE1sY3".to_string()
}

fn default_batch_size() -> usize {
    10_000
}

impl Default for FileParams {
    fn default() -> Self {
        Self {
            null_string: default_null_string(),
            unmodified_string: default_unmodified_string(),
            compression: Compression::None,
            encryption: Encryption::None,
            batch_size: default_batch_size(),
        }
    }
}

/// Rows per statement for `width` placeholders per row.
pub(crate) fn rows_per_statement(width: usize) -> usize {
    (MAX_PLACEHOLDERS / width.max(1)).max(1)
}

async fn run<C>(conn: &mut C, statements: Vec<Statement>) -> Result<u64>
where
    C: Connection + ?Sized,
{
    let mut affected = 0;
    for statement in &statements {
        debug!("{}", statement.sql);
        affected += conn.execute(statement).await?;
    }
    Ok(affected)
}

/// Apply one batch file with `writer`. Returns the number of affected rows.
///
/// The writer is committed every `batch_size` rows (unless it buffers the
/// whole file) and once more at end of file; the header is re-applied after
/// each intermediate commit. A file without a header row is a no-op.
pub async fn apply_file<C>(
    conn: &mut C,
    writer: &mut Writer,
    path: &Path,
    params: &FileParams,
    key: Option<&[u8]>,
) -> Result<u64>
where
    C: Connection + ?Sized,
{
    let input = decode::open_decoded(path, params, key)?;
    let mut reader = decode::csv_reader(input);
    let mut records = reader.records();

    let header: Vec<String> = match records.next() {
        Some(record) => record?.iter().map(str::to_string).collect(),
        None => {
            info!("{} is empty, nothing to apply", path.display());
            return Ok(0);
        }
    };
    writer.set_header(&header)?;

    let mut affected = 0;
    let mut rows = 0usize;
    let mut pending = 0usize;
    for record in records {
        let record = record?;
        let row: Vec<String> = record.iter().map(str::to_string).collect();
        affected += run(conn, writer.write_row(&row)?).await?;
        rows += 1;
        pending += 1;

        if !writer.buffers_whole_file() && params.batch_size > 0 && pending >= params.batch_size {
            affected += run(conn, writer.commit()?).await?;
            writer.set_header(&header)?;
            pending = 0;
        }
    }
    affected += run(conn, writer.commit()?).await?;

    info!(
        "Applied {} ({} rows, {} affected) with {} writer",
        path.display(),
        rows,
        affected,
        writer.kind()
    );
    Ok(affected)
}
