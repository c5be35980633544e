//! Error types for the destination library.

use thiserror::Error;

/// Boxed driver error carried by [`ApplyError::StatementExecution`].
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for planning and batch apply operations.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection could not be established or tested
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Introspection target does not exist.
    ///
    /// Callers treat this as "not yet created" rather than as a failure.
    #[error("Table {database}.{table} does not exist")]
    TableNotFound { database: String, table: String },

    /// Requested operation is not supported (unknown migration, wrong file category)
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A precondition checked against the live table or the batch file failed
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Input could not be parsed (timestamps, driver parameters, field values)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A SQL statement failed on the target
    #[error("Statement failed: {source}\n  Statement: {statement}")]
    StatementExecution {
        statement: String,
        #[source]
        source: DriverError,
    },

    /// IO error (batch files, config files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApplyError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        ApplyError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a TableNotFound error
    pub fn table_not_found(database: impl Into<String>, table: impl Into<String>) -> Self {
        ApplyError::TableNotFound {
            database: database.into(),
            table: table.into(),
        }
    }

    /// Wrap a driver error together with the statement that raised it
    pub fn statement(statement: impl Into<String>, source: impl Into<DriverError>) -> Self {
        ApplyError::StatementExecution {
            statement: statement.into(),
            source: source.into(),
        }
    }

    /// Whether this error means the target table is absent.
    pub fn is_table_not_found(&self) -> bool {
        matches!(self, ApplyError::TableNotFound { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ApplyError::Config(_) | ApplyError::Yaml(_) | ApplyError::Json(_) => 2,
            ApplyError::Connection { .. } => 3,
            ApplyError::TableNotFound { .. } => 4,
            ApplyError::UnsupportedOperation(_) => 5,
            ApplyError::PreconditionFailed(_) => 6,
            ApplyError::MalformedInput(_) | ApplyError::Csv(_) => 7,
            ApplyError::StatementExecution { .. } => 8,
            ApplyError::Io(_) => 9,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for destination operations.
pub type Result<T> = std::result::Result<T, ApplyError>;
