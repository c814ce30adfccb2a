//! Error types and handling for XQSync
//!
//! Errors fall into two tiers. Fatal errors stop the whole run: a bad option,
//! an unreachable endpoint, an output root that cannot be created. Recoverable
//! errors belong to a single document and are retried or recorded by the
//! worker that hit them; they never escape it.

use std::path::PathBuf;

/// Error severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Low severity - operation can continue
    Low,
    /// Medium severity - operation should be retried
    Medium,
    /// High severity - the current document is abandoned
    High,
    /// Fatal severity - the entire run must stop
    Fatal,
}

/// Main error type for XQSync operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Message naming the offending option
        message: String,
    },

    /// A connection string option did not parse
    #[error("Invalid connection string '{value}': {reason}")]
    InvalidConnectionString {
        /// The rejected value, with any password redacted
        value: String,
        /// Why it was rejected
        reason: String,
    },

    /// The output root could not be created or written
    #[error("Output root unavailable at {}: {message}", path.display())]
    OutputRootUnavailable {
        /// Directory that could not be prepared
        path: PathBuf,
        /// Underlying failure
        message: String,
    },

    /// The configured hooks could not be resolved
    #[error("Configuration hooks '{name}' unavailable: {message}")]
    HooksUnavailable {
        /// Requested hooks name
        name: String,
        /// Why resolution failed
        message: String,
    },

    /// The first session to an endpoint could not be established
    #[error("Connection refused by {endpoint}: {message}")]
    ConnectionRefused {
        /// Endpoint, rendered without credentials
        endpoint: String,
        /// Underlying failure
        message: String,
    },

    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        /// Error message from the I/O operation
        message: String,
    },

    /// A session request failed
    #[error("Session error: {message}")]
    Session {
        /// Error message reported by the session
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {seconds} seconds")]
    Timeout {
        /// Number of seconds after which the operation timed out
        seconds: u64,
    },

    /// A document could not be interpreted
    #[error("Malformed document '{uri}': {message}")]
    MalformedDocument {
        /// Document identifier
        uri: String,
        /// What was wrong with it
        message: String,
    },

    /// Document metadata could not be read or written
    #[error("Metadata error: {message}")]
    Metadata {
        /// Error message
        message: String,
    },

    /// The source did not hold the requested document
    #[error("Document not found: {uri}")]
    DocumentNotFound {
        /// Requested identifier
        uri: String,
    },

    /// Operation cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with custom message
    #[error("{message}")]
    Other {
        /// Custom error message
        message: String,
    },
}

/// Error kind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Configuration errors, including connection strings and hooks
    Config,
    /// Output root errors
    OutputRoot,
    /// Connection establishment errors
    Connection,
    /// I/O related errors
    Io,
    /// Session request errors
    Session,
    /// Timeout
    Timeout,
    /// Document content or metadata errors
    Document,
    /// Missing document
    NotFound,
    /// Cancellation
    Cancelled,
    /// Other errors
    Other,
}

impl Error {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. }
            | Self::InvalidConnectionString { .. }
            | Self::HooksUnavailable { .. } => ErrorKind::Config,
            Self::OutputRootUnavailable { .. } => ErrorKind::OutputRoot,
            Self::ConnectionRefused { .. } => ErrorKind::Connection,
            Self::Io { .. } => ErrorKind::Io,
            Self::Session { .. } => ErrorKind::Session,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::MalformedDocument { .. } | Self::Metadata { .. } => ErrorKind::Document,
            Self::DocumentNotFound { .. } => ErrorKind::NotFound,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. }
            | Self::InvalidConnectionString { .. }
            | Self::OutputRootUnavailable { .. }
            | Self::HooksUnavailable { .. }
            | Self::ConnectionRefused { .. } => ErrorSeverity::Fatal,
            Self::DocumentNotFound { .. } => ErrorSeverity::High,
            Self::Cancelled => ErrorSeverity::Low,
            Self::Io { .. }
            | Self::Session { .. }
            | Self::Timeout { .. }
            | Self::MalformedDocument { .. }
            | Self::Metadata { .. }
            | Self::Other { .. } => ErrorSeverity::Medium,
        }
    }

    /// Check if this error must stop the run
    pub fn is_fatal(&self) -> bool {
        self.severity() == ErrorSeverity::Fatal
    }

    /// Check if this error is confined to a single document
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    /// Check if this error should trigger a retry
    pub fn should_retry(&self) -> bool {
        self.is_recoverable() && self.severity() == ErrorSeverity::Medium
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new session error
    pub fn session<S: Into<String>>(message: S) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a new metadata error
    pub fn metadata<S: Into<String>>(message: S) -> Self {
        Self::Metadata {
            message: message.into(),
        }
    }

    /// Create a new malformed document error
    pub fn malformed<U: Into<String>, S: Into<String>>(uri: U, message: S) -> Self {
        Self::MalformedDocument {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found<U: Into<String>>(uri: U) -> Self {
        Self::DocumentNotFound { uri: uri.into() }
    }

    /// Create a new output root error
    pub fn output_root<P: Into<PathBuf>, S: Into<String>>(path: P, message: S) -> Self {
        Self::OutputRootUnavailable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }
}
