//! Error types shared by the transport, configuration and workflow layers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::DeviceRole;

/// Setup defects detected before any device I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no model code configured")]
    NoModels,
    #[error("no model code selected")]
    NoModelSelected,
    #[error("model code '{0}' not found in configuration")]
    UnknownModel(String),
    #[error("no port configured for {0}")]
    MissingPort(DeviceRole),
    #[error("config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a serial exchange that did not produce a usable reply.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The port could not be opened (device absent, busy, bad name).
    #[error("serial error on {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    /// The port opened but a read or write failed.
    #[error("I/O error on {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: io::Error,
    },
    /// Nothing arrived before the deadline.
    #[error("no response from {port} (timeout)")]
    Timeout { port: String },
    /// The device answered with ERRO or FAIL.
    #[error("{port} FAIL - {response}")]
    DeviceReported { port: String, response: String },
}

impl ChannelError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChannelError::Open { .. } | ChannelError::Io { .. } => FailureKind::Transport,
            ChannelError::Timeout { .. } => FailureKind::Timeout,
            ChannelError::DeviceReported { .. } => FailureKind::DeviceReported,
        }
    }
}

/// Coarse classification of a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum FailureKind {
    Configuration,
    Transport,
    Timeout,
    Mismatch,
    DeviceReported,
}

/// Every way a validation cycle can stop short of "ALL PASSED".
#[derive(Debug, Error)]
pub enum CycleFailure {
    #[error("FAIL: configuration - {0}")]
    Config(#[from] ConfigError),

    #[error("FAIL: {device} {port} - {source}")]
    Channel {
        device: DeviceRole,
        port: String,
        #[source]
        source: ChannelError,
    },

    #[error("FAIL: {device} {port} - {field} mismatch | expected={expected} | got={actual}")]
    Mismatch {
        device: DeviceRole,
        port: String,
        field: &'static str,
        expected: String,
        actual: String,
    },

    #[error("FAIL: {device} {port} - no {field} in reply")]
    MissingField {
        device: DeviceRole,
        port: String,
        field: &'static str,
    },

    #[error("FAIL: Scan book wrong! | BOOK1={book1} | BOOK2={book2}")]
    BlankBooks { book1: String, book2: String },

    #[error("FAIL: BOOK mismatch! | Expected {expected} | Got {actual}")]
    BookMismatch { expected: String, actual: String },

    #[error("FAIL: Internal Error! book inputs are not committed")]
    BooksNotCommitted,
}

impl CycleFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            CycleFailure::Config(_) | CycleFailure::BooksNotCommitted => {
                FailureKind::Configuration
            }
            CycleFailure::Channel { source, .. } => source.kind(),
            CycleFailure::Mismatch { .. }
            | CycleFailure::MissingField { .. }
            | CycleFailure::BlankBooks { .. }
            | CycleFailure::BookMismatch { .. } => FailureKind::Mismatch,
        }
    }
}
