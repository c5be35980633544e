//! Writer contract and static dispatch over the writer kinds.

use serde::{Deserialize, Serialize};

use crate::core::identifier::{qualify, quote_ident};
use crate::core::schema::{Column, Table};
use crate::core::value::{BoundParam, Statement};
use crate::error::{ApplyError, Result};

use super::delete::DeleteWriter;
use super::history::{DeleteHistoryWriter, EarliestStartWriter, UpdateHistoryWriter};
use super::replace::ReplaceWriter;
use super::update::UpdateWriter;
use super::FileParams;

/// Category a batch file is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Replace,
    Update,
    Delete,
    EarliestStart,
}

/// Sync mode of the table a batch is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Live,
    History,
}

/// Turns CSV rows into statements.
///
/// Writers never execute anything: every method returns the statements to
/// run now, in order.
pub trait RowWriter {
    /// Bind header names to table columns. Called again after every
    /// intermediate commit.
    fn set_header(&mut self, names: &[String]) -> Result<()>;

    /// Consume one row.
    fn write_row(&mut self, row: &[String]) -> Result<Vec<Statement>>;

    /// Flush whatever is buffered.
    fn commit(&mut self) -> Result<Vec<Statement>>;

    /// Whether the writer needs the whole file before its first commit.
    fn buffers_whole_file(&self) -> bool {
        false
    }
}

/// Target table and sentinels shared by every writer.
#[derive(Debug, Clone)]
pub struct WriterContext {
    pub database: String,
    pub table: Table,
    pub null_string: String,
    pub unmodified_string: String,
}

impl WriterContext {
    pub fn new(database: impl Into<String>, table: Table, params: &FileParams) -> Self {
        Self {
            database: database.into(),
            table,
            null_string: params.null_string.clone(),
            unmodified_string: params.unmodified_string.clone(),
        }
    }

    /// Qualified name of the target table.
    pub fn target(&self) -> String {
        qualify(&self.database, &self.table.name)
    }

    /// Bind a raw field for `col`, mapping the null sentinel to NULL.
    pub fn param(&self, raw: &str, col: &Column) -> BoundParam {
        if raw == self.null_string {
            BoundParam::null(col.data_type)
        } else {
            BoundParam::of(raw, col.data_type)
        }
    }

    pub fn is_unmodified(&self, raw: &str) -> bool {
        raw == self.unmodified_string
    }
}

/// Header names resolved against the table.
#[derive(Debug, Clone, Default)]
pub struct Header {
    columns: Vec<Column>,
}

impl Header {
    /// Resolve header names; a name the table does not have is malformed input.
    pub fn resolve(table: &Table, names: &[String]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|name| {
                table.column(name).cloned().ok_or_else(|| {
                    ApplyError::MalformedInput(format!(
                        "Batch file column {} is not a column of {}",
                        name, table.name
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Position of a column the writer cannot work without.
    pub fn require(&self, table: &str, name: &str) -> Result<usize> {
        self.position(name).ok_or_else(|| {
            ApplyError::PreconditionFailed(format!(
                "Batch file for {} is missing required column {}",
                table, name
            ))
        })
    }

    /// Positions of `keys`, in key order.
    pub fn require_all(&self, table: &str, keys: &[&Column]) -> Result<Vec<usize>> {
        keys.iter().map(|k| self.require(table, &k.name)).collect()
    }

    /// Fail unless `row` has one field per header column.
    pub fn check_row(&self, row: &[String]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ApplyError::MalformedInput(format!(
                "Row has {} fields, header has {}",
                row.len(),
                self.columns.len()
            )));
        }
        Ok(())
    }
}

/// `` `k1` = ? AND `k2` = ? `` over the key columns.
pub(crate) fn key_predicate(key_columns: &[&Column]) -> String {
    key_columns
        .iter()
        .map(|c| format!("{} = ?", quote_ident(&c.name)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// One writer per file category and sync mode.
#[derive(Debug)]
pub enum Writer {
    Replace(ReplaceWriter),
    Update(UpdateWriter),
    Delete(DeleteWriter),
    UpdateHistory(UpdateHistoryWriter),
    DeleteHistory(DeleteHistoryWriter),
    EarliestStartHistory(EarliestStartWriter),
}

impl Writer {
    /// Pick the writer for a file.
    ///
    /// Earliest-start files only exist for history-mode tables.
    pub fn for_category(category: FileCategory, mode: WriteMode, ctx: WriterContext) -> Result<Self> {
        match (category, mode) {
            (FileCategory::Replace, _) => Ok(Writer::Replace(ReplaceWriter::new(ctx))),
            (FileCategory::Update, WriteMode::Live) => Ok(Writer::Update(UpdateWriter::new(ctx))),
            (FileCategory::Delete, WriteMode::Live) => Ok(Writer::Delete(DeleteWriter::new(ctx))),
            (FileCategory::Update, WriteMode::History) => {
                Ok(Writer::UpdateHistory(UpdateHistoryWriter::new(ctx)))
            }
            (FileCategory::Delete, WriteMode::History) => {
                Ok(Writer::DeleteHistory(DeleteHistoryWriter::new(ctx)))
            }
            (FileCategory::EarliestStart, WriteMode::History) => {
                Ok(Writer::EarliestStartHistory(EarliestStartWriter::new(ctx)))
            }
            (FileCategory::EarliestStart, WriteMode::Live) => Err(ApplyError::UnsupportedOperation(
                "Earliest-start files require a history-mode table".to_string(),
            )),
        }
    }

    /// Writer name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Writer::Replace(_) => "replace",
            Writer::Update(_) => "update",
            Writer::Delete(_) => "delete",
            Writer::UpdateHistory(_) => "update-history",
            Writer::DeleteHistory(_) => "delete-history",
            Writer::EarliestStartHistory(_) => "earliest-start-history",
        }
    }

    fn inner(&mut self) -> &mut dyn RowWriter {
        match self {
            Writer::Replace(w) => w,
            Writer::Update(w) => w,
            Writer::Delete(w) => w,
            Writer::UpdateHistory(w) => w,
            Writer::DeleteHistory(w) => w,
            Writer::EarliestStartHistory(w) => w,
        }
    }
}

impl RowWriter for Writer {
    fn set_header(&mut self, names: &[String]) -> Result<()> {
        self.inner().set_header(names)
    }

    fn write_row(&mut self, row: &[String]) -> Result<Vec<Statement>> {
        self.inner().write_row(row)
    }

    fn commit(&mut self) -> Result<Vec<Statement>> {
        self.inner().commit()
    }

    fn buffers_whole_file(&self) -> bool {
        matches!(self, Writer::UpdateHistory(_))
    }
}
