//! Error types for sqlbridge
//!
//! Failures are classified so callers can tell apart:
//! - Retriable errors (connection, timeout, pool exhaustion)
//! - Programming errors (unwired API, malformed templates)
//! - Statement failures reported by the DBMS

use std::fmt;
use thiserror::Error;

/// Result type for sqlbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Connect/terminate failed at the driver boundary (retriable)
    Connection,
    /// API used before it was wired to a connection
    Wiring,
    /// Statement template could not be rendered
    Template,
    /// Pool has no free connection (retriable with backoff)
    PoolExhausted,
    /// The DBMS rejected or failed a statement
    Statement,
    /// Invalid configuration
    Configuration,
    /// Operation timed out (retriable)
    Timeout,
    /// Unknown/other errors
    Other,
}

impl ErrorCategory {
    /// Whether errors in this category are generally retriable
    #[inline]
    pub const fn is_retriable(self) -> bool {
        matches!(self, Self::Connection | Self::Timeout | Self::PoolExhausted)
    }
}

/// Main error type for sqlbridge
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    /// Connection could not be established or terminated
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider holds no live connection (closed and not reconnected)
    #[error("not connected: {message}")]
    NotConnected { message: String },

    /// API method called before `wire`
    #[error("database API is not wired: {message}")]
    NotWired { message: String },

    /// Template placeholder missing from the values, or malformed template
    #[error("template error: {message}")]
    Template { message: String },

    /// No connection available in the pool
    #[error("pool '{pool}' exhausted: {message}")]
    PoolExhausted { pool: String, message: String },

    /// Statement rejected or failed by the DBMS
    #[error("statement error: {message}")]
    Statement {
        message: String,
        sql: Option<String>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Operation timed out
    #[error("timeout: {message}")]
    Timeout { message: String },

    /// Internal error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Connection { .. } | Self::NotConnected { .. } => ErrorCategory::Connection,
            Self::NotWired { .. } => ErrorCategory::Wiring,
            Self::Template { .. } => ErrorCategory::Template,
            Self::PoolExhausted { .. } => ErrorCategory::PoolExhausted,
            Self::Statement { .. } => ErrorCategory::Statement,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Internal { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error is retriable
    #[inline]
    pub fn is_retriable(&self) -> bool {
        self.category().is_retriable()
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a not-connected error
    pub fn not_connected(message: impl Into<String>) -> Self {
        Self::NotConnected {
            message: message.into(),
        }
    }

    /// Create a not-wired error
    pub fn not_wired(message: impl Into<String>) -> Self {
        Self::NotWired {
            message: message.into(),
        }
    }

    /// Create a template error
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(pool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PoolExhausted {
            pool: pool.into(),
            message: message.into(),
        }
    }

    /// Create a statement error
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql: None,
            source: None,
        }
    }

    /// Create a statement error carrying the rendered SQL
    pub fn statement_with_sql(message: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::Statement {
            message: message.into(),
            sql: Some(sql.into()),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The SQL attached to a statement error, if any
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Statement { sql, .. } => sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Wiring => write!(f, "wiring"),
            Self::Template => write!(f, "template"),
            Self::PoolExhausted => write!(f, "pool_exhausted"),
            Self::Statement => write!(f, "statement"),
            Self::Configuration => write!(f, "configuration"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}
