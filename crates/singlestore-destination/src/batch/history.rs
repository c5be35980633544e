//! History-mode (SCD2) writers.
//!
//! A version of a record is its key plus `_fivetran_start`. Versions are
//! never changed in place: a new version is inserted and its predecessor is
//! closed by setting `_fivetran_end` one microsecond before the new start.

use chrono::{Duration, NaiveDateTime};

use crate::core::identifier::{quote_ident, quote_literal};
use crate::core::schema::{Column, DataType, ACTIVE_COLUMN, END_COLUMN, START_COLUMN};
use crate::core::value::{BoundParam, Statement};
use crate::error::{ApplyError, Result};
use crate::planner::MAX_TIMESTAMP;
use crate::typemap::{format_timestamp, parse_timestamp};

use super::writer::{key_predicate, Header, RowWriter, WriterContext};

/// Header layout shared by the history writers.
#[derive(Debug, Default)]
struct HistoryHeader {
    header: Header,
    key_columns: Vec<Column>,
    key_positions: Vec<usize>,
}

impl HistoryHeader {
    fn resolve(ctx: &WriterContext, names: &[String], required: &str) -> Result<(Self, usize)> {
        let table = &ctx.table;
        if !table.is_history_table() {
            return Err(ApplyError::PreconditionFailed(format!(
                "Table {} is not in history mode",
                table.name
            )));
        }
        let header = Header::resolve(table, names)?;
        let required_pos = header.require(&table.name, required)?;
        let key = table.record_key();
        let key_positions = header.require_all(&table.name, &key)?;
        Ok((
            Self {
                header,
                key_columns: key.into_iter().cloned().collect(),
                key_positions,
            },
            required_pos,
        ))
    }

    fn key_params(&self, ctx: &WriterContext, row: &[String]) -> Vec<BoundParam> {
        self.key_positions
            .iter()
            .zip(&self.key_columns)
            .map(|(&i, col)| ctx.param(&row[i], col))
            .collect()
    }

    /// Key predicate, prefixed with `AND` when the table has a record key.
    fn key_clause(&self) -> String {
        let refs: Vec<&Column> = self.key_columns.iter().collect();
        if refs.is_empty() {
            String::new()
        } else {
            format!("{} AND ", key_predicate(&refs))
        }
    }
}

fn timestamp_param(ts: &NaiveDateTime) -> BoundParam {
    BoundParam::of(format_timestamp(ts), DataType::NaiveDatetime)
}

fn before(ts: &NaiveDateTime) -> NaiveDateTime {
    *ts - Duration::microseconds(1)
}

fn active() -> String {
    format!("{} = TRUE", quote_ident(ACTIVE_COLUMN))
}

fn parse_start(raw: &str) -> Result<NaiveDateTime> {
    parse_timestamp(raw).map_err(|_| {
        ApplyError::MalformedInput(format!("Invalid {} value '{}'", START_COLUMN, raw))
    })
}

/// Update-history writer.
///
/// Buffers the whole file and applies rows in `_fivetran_start` order. For
/// each row a new version is inserted, with columns missing from the file or
/// carrying the unmodified sentinel copied from the active version, and the
/// previously active version is closed.
#[derive(Debug)]
pub struct UpdateHistoryWriter {
    ctx: WriterContext,
    layout: HistoryHeader,
    start_position: usize,
    rows: Vec<(NaiveDateTime, Vec<String>)>,
}

impl UpdateHistoryWriter {
    pub fn new(ctx: WriterContext) -> Self {
        Self {
            ctx,
            layout: HistoryHeader::default(),
            start_position: 0,
            rows: Vec::new(),
        }
    }

    fn statements_for(&self, start: &NaiveDateTime, row: &[String]) -> Vec<Statement> {
        let target = self.ctx.target();
        let table = &self.ctx.table;

        let mut columns = Vec::with_capacity(table.columns.len());
        let mut exprs = Vec::with_capacity(table.columns.len());
        let mut params = Vec::new();
        for col in &table.columns {
            columns.push(quote_ident(&col.name));
            let expr = match col.name.as_str() {
                START_COLUMN => {
                    params.push(timestamp_param(start));
                    "?".to_string()
                }
                END_COLUMN => quote_literal(MAX_TIMESTAMP),
                ACTIVE_COLUMN => "TRUE".to_string(),
                name => match self.layout.header.position(name) {
                    Some(i) if !self.ctx.is_unmodified(&row[i]) => {
                        params.push(self.ctx.param(&row[i], col));
                        "?".to_string()
                    }
                    _ => quote_ident(name),
                },
            };
            exprs.push(expr);
        }
        let keys = self.layout.key_params(&self.ctx, row);
        params.extend(keys.iter().cloned());

        let insert = Statement::with_params(
            format!(
                "INSERT INTO {} ({}) SELECT {} FROM {} WHERE {}{}",
                target,
                columns.join(", "),
                exprs.join(", "),
                target,
                self.layout.key_clause(),
                active()
            ),
            params,
        );

        let mut close_params = vec![timestamp_param(&before(start))];
        close_params.extend(keys);
        close_params.push(timestamp_param(start));
        let close = Statement::with_params(
            format!(
                "UPDATE {} SET {} = FALSE, {} = ? WHERE {}{} AND {} < ?",
                target,
                quote_ident(ACTIVE_COLUMN),
                quote_ident(END_COLUMN),
                self.layout.key_clause(),
                active(),
                quote_ident(START_COLUMN)
            ),
            close_params,
        );

        vec![insert, close]
    }
}

impl RowWriter for UpdateHistoryWriter {
    fn set_header(&mut self, names: &[String]) -> Result<()> {
        let (layout, start_position) = HistoryHeader::resolve(&self.ctx, names, START_COLUMN)?;
        self.layout = layout;
        self.start_position = start_position;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<Vec<Statement>> {
        self.layout.header.check_row(row)?;
        let start = parse_start(&row[self.start_position])?;
        self.rows.push((start, row.to_vec()));
        Ok(Vec::new())
    }

    fn commit(&mut self) -> Result<Vec<Statement>> {
        let mut rows = std::mem::take(&mut self.rows);
        rows.sort_by_key(|(start, _)| *start);
        Ok(rows
            .iter()
            .flat_map(|(start, row)| self.statements_for(start, row))
            .collect())
    }

    fn buffers_whole_file(&self) -> bool {
        true
    }
}

/// Delete-history writer: closes the active version of each key with the
/// row's `_fivetran_end`.
#[derive(Debug)]
pub struct DeleteHistoryWriter {
    ctx: WriterContext,
    layout: HistoryHeader,
    end_position: usize,
}

impl DeleteHistoryWriter {
    pub fn new(ctx: WriterContext) -> Self {
        Self {
            ctx,
            layout: HistoryHeader::default(),
            end_position: 0,
        }
    }
}

impl RowWriter for DeleteHistoryWriter {
    fn set_header(&mut self, names: &[String]) -> Result<()> {
        let (layout, end_position) = HistoryHeader::resolve(&self.ctx, names, END_COLUMN)?;
        self.layout = layout;
        self.end_position = end_position;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<Vec<Statement>> {
        self.layout.header.check_row(row)?;
        let end = parse_timestamp(&row[self.end_position])?;

        let mut params = vec![timestamp_param(&end)];
        params.extend(self.layout.key_params(&self.ctx, row));
        Ok(vec![Statement::with_params(
            format!(
                "UPDATE {} SET {} = FALSE, {} = ? WHERE {}{}",
                self.ctx.target(),
                quote_ident(ACTIVE_COLUMN),
                quote_ident(END_COLUMN),
                self.layout.key_clause(),
                active()
            ),
            params,
        )])
    }

    fn commit(&mut self) -> Result<Vec<Statement>> {
        Ok(Vec::new())
    }
}

/// Earliest-start writer.
///
/// For each key, drops the versions starting at or after the row's
/// `_fivetran_start` and closes the version still open across that instant.
#[derive(Debug)]
pub struct EarliestStartWriter {
    ctx: WriterContext,
    layout: HistoryHeader,
    start_position: usize,
}

impl EarliestStartWriter {
    pub fn new(ctx: WriterContext) -> Self {
        Self {
            ctx,
            layout: HistoryHeader::default(),
            start_position: 0,
        }
    }
}

impl RowWriter for EarliestStartWriter {
    fn set_header(&mut self, names: &[String]) -> Result<()> {
        let (layout, start_position) = HistoryHeader::resolve(&self.ctx, names, START_COLUMN)?;
        self.layout = layout;
        self.start_position = start_position;
        Ok(())
    }

    fn write_row(&mut self, row: &[String]) -> Result<Vec<Statement>> {
        self.layout.header.check_row(row)?;
        let start = parse_start(&row[self.start_position])?;
        let target = self.ctx.target();
        let keys = self.layout.key_params(&self.ctx, row);

        let mut delete_params = keys.clone();
        delete_params.push(timestamp_param(&start));
        let delete = Statement::with_params(
            format!(
                "DELETE FROM {} WHERE {}{} >= ?",
                target,
                self.layout.key_clause(),
                quote_ident(START_COLUMN)
            ),
            delete_params,
        );

        let mut close_params = vec![timestamp_param(&before(&start))];
        close_params.extend(keys);
        close_params.push(timestamp_param(&start));
        let close = Statement::with_params(
            format!(
                "UPDATE {} SET {} = FALSE, {} = ? WHERE {}{} >= ?",
                target,
                quote_ident(ACTIVE_COLUMN),
                quote_ident(END_COLUMN),
                self.layout.key_clause(),
                quote_ident(END_COLUMN)
            ),
            close_params,
        );

        Ok(vec![delete, close])
    }

    fn commit(&mut self) -> Result<Vec<Statement>> {
        Ok(Vec::new())
    }
}
