//! Error types for the SQL gateway.
//!
//! Every failure the adapter can report is a variant of [`DbError`]. Errors
//! that happen after a connection was acquired are only handed back to the
//! caller once that connection has been released.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Connection pool is full ({max} connections in use)")]
    PoolFull { max: u32 },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Failed to begin transaction: {source}")]
    Begin {
        #[source]
        source: Box<DbError>,
    },

    #[error("Statement {index} failed: {source}")]
    Statement {
        /// Zero-based position of the failing statement in its batch.
        index: usize,
        #[source]
        source: Box<DbError>,
    },

    #[error("Rollback failed: {source} (after: {original})")]
    Rollback {
        #[source]
        source: Box<DbError>,
        /// The statement error that triggered the rollback.
        original: Box<DbError>,
    },

    #[error("Failed to commit transaction: {source}")]
    Commit {
        #[source]
        source: Box<DbError>,
    },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timeout: {operation} exceeded {elapsed_millis}ms")]
    Timeout {
        operation: String,
        elapsed_millis: u64,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a pool-full error for a pool of the given size.
    pub fn pool_full(max: u32) -> Self {
        Self::PoolFull { max }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Wrap a failed begin signal.
    pub fn begin(source: DbError) -> Self {
        Self::Begin {
            source: Box::new(source),
        }
    }

    /// Wrap the failure of the statement at `index`.
    pub fn statement(index: usize, source: DbError) -> Self {
        Self::Statement {
            index,
            source: Box::new(source),
        }
    }

    /// Combine a failed rollback with the statement error that caused it.
    pub fn rollback(source: DbError, original: DbError) -> Self {
        Self::Rollback {
            source: Box::new(source),
            original: Box::new(original),
        }
    }

    /// Wrap a failed commit signal.
    pub fn commit(source: DbError) -> Self {
        Self::Commit {
            source: Box::new(source),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_millis: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_millis,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::PoolFull { .. } => Some("Retry once in-flight operations have completed"),
            Self::Begin { source }
            | Self::Statement { source, .. }
            | Self::Rollback { source, .. }
            | Self::Commit { source } => source.suggestion(),
            _ => None,
        }
    }

    /// The statement error a failed rollback was cleaning up after.
    pub fn original(&self) -> Option<&DbError> {
        match self {
            Self::Rollback { original, .. } => Some(original),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PoolFull { .. } | Self::Connection { .. } | Self::Timeout { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out establishing a backend connection",
                "Increase connection_timeout_millis or check server load",
            ),
            sqlx::Error::PoolClosed => DbError::PoolClosed,
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
