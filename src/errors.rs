//! Global Notifier Error Hierarchy
//!
//! Discovery-time failures (schema, session open) surface synchronously to whoever
//! drives `on_admin_change`. Per-realm runtime failures (diff computation) are isolated
//! to that realm and reported through the application target.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

use crate::ListenIdent;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Admin realm is missing the expected object type or columns
    #[error("Unexpected schema in admin realm: {0}")]
    SchemaViolation(String),

    /// Opening a replicated session failed (network, auth or local I/O)
    #[error("Failed to open session for {server_url}: {reason}")]
    SessionOpen { server_url: String, reason: String },

    /// Accessor called with an identifier never handed out by discovery
    #[error("Unknown listener: {0}")]
    UnknownListener(ListenIdent),

    /// Per-realm diff failure, never fatal to other realms
    #[error("Diff computation failed for listener {listen_ident}: {reason}")]
    DiffComputation {
        listen_ident: ListenIdent,
        reason: String,
    },

    /// Server-assigned realm id that cannot be mapped to a local file
    #[error("Invalid realm id: {0:?}")]
    InvalidRealmId(String),

    /// Base URL or virtual path could not be composed into a server URL
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Storage engine failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration validation failures
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Discovery requested before `start()` opened the admin session
    #[error("Notifier has not been started")]
    NotStarted,

    /// The control loop has exited, requests can no longer be served
    #[error("Control loop is not running")]
    ControlLoopStopped,

    #[error("Control loop did not answer within {0:?}")]
    RequestTimeout(Duration),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Read snapshot could not be opened
    #[error("Snapshot operation failed: {0}")]
    Snapshot(String),

    /// Two snapshots handed to a diff engine that did not produce them
    #[error("Snapshots are not comparable: {0}")]
    IncompatibleSnapshot(String),

    #[error("Row {row} out of bounds in table {table} with {len} rows")]
    OutOfBounds {
        table: String,
        row: usize,
        len: usize,
    },

    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("Table not found: {0}")]
    TableNotFound(String),
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::InvalidUri(e.to_string())
    }
}
