use std::path::PathBuf;
use thiserror::Error;

/// Rejected user input. Everything except `Cancelled` is recoverable by
/// asking again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Input cannot be empty")]
    Empty,

    #[error("Invalid IP address or hostname: {0}")]
    InvalidTarget(String),

    #[error("Please enter valid numbers for ports (got {0:?})")]
    InvalidPort(String),

    #[error("Ports must be between 1 and 65535 (got {0})")]
    PortOutOfRange(u64),

    #[error("Starting port {start} must not be greater than ending port {end}")]
    StartAfterEnd { start: u16, end: u16 },

    #[error("cancelled by user")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Could not resolve hostname: {0}")]
    NotFound(String),

    #[error("Lookup of {host} failed: {source}")]
    Lookup {
        host: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Could not find a writable directory for output")]
    NoWritableDirectory,

    #[error("Could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}
