//! Replace writer: upserts whole rows with batched `REPLACE INTO`.
//!
//! This is the bulk-load path for replace files. Rows go out as multi-row
//! `REPLACE INTO ... VALUES` statements with every value bound through the
//! driver, so `LOAD DATA LOCAL INFILE` (and the client-side file access it
//! needs) is not used. One statement carries as many whole rows as fit under
//! [`MAX_PLACEHOLDERS`](super::MAX_PLACEHOLDERS).

use crate::core::identifier::quote_ident;
use crate::core::value::{BoundParam, Statement};
use crate::error::Result;

use super::rows_per_statement;
use super::writer::{Header, RowWriter, WriterContext};

#[derive(Debug)]
pub struct ReplaceWriter {
    ctx: WriterContext,
    header: Header,
    rows: Vec<Vec<BoundParam>>,
}

impl ReplaceWriter {
    pub fn new(ctx: WriterContext) -> Self {
        Self {
            ctx,
            header: Header::default(),
            rows: Vec::new(),
        }
    }
}

impl RowWriter for ReplaceWriter {
    fn set_header(&mut self, names: &[String]) -> Result<()> {
        self.header = Header::resolve(&self.ctx.table, names)?;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<Vec<Statement>> {
        self.header.check_row(row)?;
        let params = self
            .header
            .columns()
            .iter()
            .zip(row)
            .map(|(col, raw)| self.ctx.param(raw, col))
            .collect();
        self.rows.push(params);
        Ok(Vec::new())
    }

    fn commit(&mut self) -> Result<Vec<Statement>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }

        let width = self.header.columns().len();
        let columns = self
            .header
            .columns()
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let row_placeholders = format!("({})", vec!["?"; width].join(", "));

        let rows = std::mem::take(&mut self.rows);
        let statements = rows
            .chunks(rows_per_statement(width))
            .map(|chunk| {
                let values = vec![row_placeholders.as_str(); chunk.len()].join(", ");
                Statement::with_params(
                    format!(
                        "REPLACE INTO {} ({}) VALUES {}",
                        self.ctx.target(),
                        columns,
                        values
                    ),
                    chunk.concat(),
                )
            })
            .collect();
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{FileParams, MAX_PLACEHOLDERS};
    use crate::core::schema::{Column, DataType, Table};

    fn writer() -> ReplaceWriter {
        let table = Table::new(
            "t",
            vec![
                Column::new("id", DataType::Int).primary(),
                Column::new("a", DataType::String),
                Column::new("b", DataType::String),
            ],
        );
        let mut w = ReplaceWriter::new(WriterContext::new("db", table, &FileParams::default()));
        w.set_header(&["id".to_string(), "b".to_string(), "a".to_string()])
            .unwrap();
        w
    }

    fn row(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_replace_uses_header_order() {
        let mut w = writer();
        assert!(w.write_row(&row(&["1", "x", "null-string"])).unwrap().is_empty());
        assert!(w.write_row(&row(&["2", "y", "z"])).unwrap().is_empty());

        let stmts = w.commit().unwrap();
        assert_eq!(stmts.len(), 1);
        assert_eq!(
            stmts[0].sql,
            "REPLACE INTO `db`.`t` (`id`, `b`, `a`) VALUES (?, ?, ?), (?, ?, ?)"
        );
        assert_eq!(stmts[0].params[2].value, None);
        assert_eq!(stmts[0].params[4].value.as_deref(), Some("y"));
        assert!(w.commit().unwrap().is_empty());
    }

    #[test]
    fn test_replace_splits_under_placeholder_limit() {
        let mut w = writer();
        let rows = MAX_PLACEHOLDERS / 3 + 1;
        for i in 0..rows {
            w.write_row(&row(&[&i.to_string(), "x", "y"])).unwrap();
        }
        let stmts = w.commit().unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].params.len(), MAX_PLACEHOLDERS / 3 * 3);
        assert_eq!(stmts[1].params.len(), 3);
    }

    #[test]
    fn test_replace_full_chunk_then_remainder() {
        let mut w = writer();
        let per_statement = MAX_PLACEHOLDERS / 3;
        for i in 0..per_statement + 5 {
            w.write_row(&row(&[&i.to_string(), "x", "y"])).unwrap();
        }
        let stmts = w.commit().unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].params.len(), per_statement * 3);
        assert_eq!(stmts[0].sql.matches("(?, ?, ?)").count(), per_statement);
        assert_eq!(stmts[1].params.len(), 15);
        assert_eq!(stmts[1].params[0].value.as_deref(), Some(per_statement.to_string().as_str()));
    }

    #[test]
    fn test_replace_exact_chunk_is_one_statement() {
        let mut w = writer();
        for i in 0..MAX_PLACEHOLDERS / 3 {
            w.write_row(&row(&[&i.to_string(), "x", "y"])).unwrap();
        }
        assert_eq!(w.commit().unwrap().len(), 1);
    }

    #[test]
    fn test_row_width_must_match_header() {
        let mut w = writer();
        assert!(w.write_row(&row(&["1", "x"])).is_err());
    }
}
