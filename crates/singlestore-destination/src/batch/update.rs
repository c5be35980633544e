//! Update writer: partial-column updates keyed by the primary key.

use crate::core::identifier::quote_ident;
use crate::core::value::Statement;
use crate::error::{ApplyError, Result};

use super::writer::{key_predicate, Header, RowWriter, WriterContext};

/// Emits one `UPDATE` per row, setting only the columns whose value is not
/// the unmodified sentinel. Rows that change nothing emit nothing.
#[derive(Debug)]
pub struct UpdateWriter {
    ctx: WriterContext,
    header: Header,
    key_positions: Vec<usize>,
}

impl UpdateWriter {
    pub fn new(ctx: WriterContext) -> Self {
        Self {
            ctx,
            header: Header::default(),
            key_positions: Vec::new(),
        }
    }
}

impl RowWriter for UpdateWriter {
    fn set_header(&mut self, names: &[String]) -> Result<()> {
        let key = self.ctx.table.primary_key();
        if key.is_empty() {
            return Err(ApplyError::PreconditionFailed(format!(
                "Table {} has no primary key to update by",
                self.ctx.table.name
            )));
        }
        let header = Header::resolve(&self.ctx.table, names)?;
        self.key_positions = header.require_all(&self.ctx.table.name, &key)?;
        self.header = header;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<Vec<Statement>> {
        self.header.check_row(row)?;

        let mut sets = Vec::new();
        let mut params = Vec::new();
        for (idx, (col, raw)) in self.header.columns().iter().zip(row).enumerate() {
            if self.key_positions.contains(&idx) || self.ctx.is_unmodified(raw) {
                continue;
            }
            sets.push(format!("{} = ?", quote_ident(&col.name)));
            params.push(self.ctx.param(raw, col));
        }
        if sets.is_empty() {
            return Ok(Vec::new());
        }

        let key_columns: Vec<_> = self
            .key_positions
            .iter()
            .map(|&i| &self.header.columns()[i])
            .collect();
        for &i in &self.key_positions {
            params.push(self.ctx.param(&row[i], &self.header.columns()[i]));
        }

        Ok(vec![Statement::with_params(
            format!(
                "UPDATE {} SET {} WHERE {}",
                self.ctx.target(),
                sets.join(", "),
                key_predicate(&key_columns)
            ),
            params,
        )])
    }

    fn commit(&mut self) -> Result<Vec<Statement>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::FileParams;
    use crate::core::schema::{Column, DataType, Table};

    const UNMODIFIED: &str = "unmod-NcK9NIjPUutCsz4mjOQQztbnwnE1sY3";

    fn table() -> Table {
        Table::new(
            "t",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("a", DataType::String),
                Column::new("b", DataType::Long),
            ],
        )
    }

    fn writer() -> UpdateWriter {
        let mut w = UpdateWriter::new(WriterContext::new("db", table(), &FileParams::default()));
        w.set_header(&["a".to_string(), "id".to_string(), "b".to_string()])
            .unwrap();
        w
    }

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_update_sets_only_modified_columns() {
        let mut w = writer();
        let stmts = w.write_row(&row(&["x", "7", UNMODIFIED])).unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].sql, "UPDATE `db`.`t` SET `a` = ? WHERE `id` = ?");
        let values: Vec<_> = stmts[0].params.iter().map(|p| p.value.as_deref()).collect();
        assert_eq!(values, vec![Some("x"), Some("7")]);
    }

    #[test]
    fn test_update_null_sentinel_sets_null() {
        let mut w = writer();
        let stmts = w.write_row(&row(&["null-string", "7", "3"])).unwrap();
        assert_eq!(stmts[0].sql, "UPDATE `db`.`t` SET `a` = ?, `b` = ? WHERE `id` = ?");
        assert_eq!(stmts[0].params[0].value, None);
    }

    #[test]
    fn test_unchanged_row_emits_nothing() {
        let mut w = writer();
        assert!(w
            .write_row(&row(&[UNMODIFIED, "7", UNMODIFIED]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_missing_key_column_fails() {
        let mut w = UpdateWriter::new(WriterContext::new("db", table(), &FileParams::default()));
        let err = w.set_header(&["a".to_string()]).unwrap_err();
        assert!(matches!(err, ApplyError::PreconditionFailed(_)));
    }
}
