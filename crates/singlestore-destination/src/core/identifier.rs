//! Identifier validation, quoting and temporary-object naming.
//!
//! SQL identifiers cannot be passed as statement parameters, so every table
//! and column name that reaches generated SQL goes through [`quote_ident`].
//! Quoting is bit-exact with what the engine expects: names are wrapped in
//! backticks and embedded backticks are doubled. String literals are wrapped
//! in single quotes with embedded quotes doubled.

use uuid::Uuid;

use crate::error::{ApplyError, Result};

/// Maximum identifier length accepted by the engine.
const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Validate an identifier before it is used in generated SQL.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes
/// - Identifiers exceeding the maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ApplyError::MalformedInput(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(ApplyError::MalformedInput(format!(
            "Identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ApplyError::MalformedInput(format!(
            "Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote an identifier using backticks.
///
/// ```
/// use singlestore_destination::core::identifier::quote_ident;
/// assert_eq!(quote_ident("users"), "`users`");
/// assert_eq!(quote_ident("table`name"), "`table``name`");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Qualify a table name with its database.
pub fn qualify(database: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(database), quote_ident(table))
}

/// Quote a string literal. Backslash is an escape character under the
/// default `sql_mode`, so it is doubled along with single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', r"\\").replace('\'', "''"))
}

/// Source of suffixes for temporary tables and columns.
///
/// Planners never pick names themselves; the caller injects a namer so that
/// tests can assert exact statements.
pub trait TempNamer: Send {
    /// Return the next 6-character lowercase hex suffix.
    fn suffix(&mut self) -> String;

    /// Temporary name derived from `base`: `<base>_tmp_<suffix>`.
    fn temp_name(&mut self, base: &str) -> String {
        format!("{}_tmp_{}", base, self.suffix())
    }
}

/// Random suffixes taken from a v4 UUID.
#[derive(Debug, Clone, Default)]
pub struct RandomNamer;

impl TempNamer for RandomNamer {
    fn suffix(&mut self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        id[..6].to_string()
    }
}

/// Deterministic suffixes: `000001`, `000002`, ...
#[derive(Debug, Clone, Default)]
pub struct SequentialNamer {
    next: u32,
}

impl SequentialNamer {
    /// Create a namer whose first suffix is `000001`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TempNamer for SequentialNamer {
    fn suffix(&mut self) -> String {
        self.next = self.next.wrapping_add(1) & 0x00ff_ffff;
        format!("{:06x}", self.next)
    }
}
