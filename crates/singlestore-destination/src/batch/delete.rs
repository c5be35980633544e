//! Delete writer: buffers key tuples and deletes them with one predicate.

use crate::core::schema::Column;
use crate::core::value::{BoundParam, Statement};
use crate::error::{ApplyError, Result};

use super::rows_per_statement;
use super::writer::{key_predicate, Header, RowWriter, WriterContext};

#[derive(Debug)]
pub struct DeleteWriter {
    ctx: WriterContext,
    key_columns: Vec<Column>,
    key_positions: Vec<usize>,
    header: Header,
    keys: Vec<Vec<BoundParam>>,
}

impl DeleteWriter {
    pub fn new(ctx: WriterContext) -> Self {
        Self {
            ctx,
            key_columns: Vec::new(),
            key_positions: Vec::new(),
            header: Header::default(),
            keys: Vec::new(),
        }
    }
}

impl RowWriter for DeleteWriter {
    fn set_header(&mut self, names: &[String]) -> Result<()> {
        let key = self.ctx.table.primary_key();
        if key.is_empty() {
            return Err(ApplyError::PreconditionFailed(format!(
                "Table {} has no primary key to delete by",
                self.ctx.table.name
            )));
        }
        let header = Header::resolve(&self.ctx.table, names)?;
        self.key_positions = header.require_all(&self.ctx.table.name, &key)?;
        self.key_columns = key.into_iter().cloned().collect();
        self.header = header;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<Vec<Statement>> {
        self.header.check_row(row)?;
        let key = self
            .key_positions
            .iter()
            .zip(&self.key_columns)
            .map(|(&i, col)| self.ctx.param(&row[i], col))
            .collect();
        self.keys.push(key);
        Ok(Vec::new())
    }

    /// One `DELETE ... WHERE (key) OR (key) ...`, split only where the
    /// placeholder limit requires it.
    fn commit(&mut self) -> Result<Vec<Statement>> {
        if self.keys.is_empty() {
            return Ok(Vec::new());
        }

        let key_refs: Vec<&Column> = self.key_columns.iter().collect();
        let clause = format!("({})", key_predicate(&key_refs));
        let keys = std::mem::take(&mut self.keys);

        let statements = keys
            .chunks(rows_per_statement(key_refs.len()))
            .map(|chunk| {
                Statement::with_params(
                    format!(
                        "DELETE FROM {} WHERE {}",
                        self.ctx.target(),
                        vec![clause.as_str(); chunk.len()].join(" OR ")
                    ),
                    chunk.concat(),
                )
            })
            .collect();
        Ok(statements)
    }
}
