//! Error types for driving implementations under test.

use std::path::PathBuf;

use capcompat_protocol::{ArchiveError, CodecError, DidError, KeyAlgorithm, KeyError, RecordError};
use thiserror::Error;

/// Coarse classification of a [`DriverError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Output could not be decoded: bad record, DID, URL or key bytes.
    Decode,
    /// Implementations disagree on the wire.
    Protocol,
    /// The harness was misused, e.g. stopping an unknown service.
    Lifecycle,
    /// A child process failed, hung or was canceled.
    Process,
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to read implementation config from: {}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("implementation command is empty")]
    EmptyCommand,

    #[error("failed to spawn `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", exit_label(.code))]
    Exit {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("failed to decode output of `{command}`")]
    Decode {
        command: String,
        output: String,
        #[source]
        source: RecordError,
    },

    #[error("failed to parse DID in output: {value}")]
    InvalidDid {
        value: String,
        #[source]
        source: DidError,
    },

    #[error("failed to parse URL in output: {value}: {reason}")]
    InvalidUrl { value: String, reason: String },

    #[error("failed to parse {algorithm} key")]
    Key {
        algorithm: KeyAlgorithm,
        #[source]
        source: KeyError,
    },

    #[error("failed to parse {algorithm} key in output of `{command}`")]
    KeyMaterial {
        algorithm: KeyAlgorithm,
        command: String,
        output: String,
        #[source]
        source: KeyError,
    },

    #[error("failed to decode response in output of `{command}`")]
    Response {
        command: String,
        output: String,
        #[source]
        source: CodecError,
    },

    #[error("failed to encode caveats")]
    Caveats(#[source] RecordError),

    #[error("unexpectedly found {0} receipts in response message")]
    ReceiptCount(usize),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("service already running: {0}")]
    DuplicateService(String),

    #[error("unexpected status: POST {url} -> {status}")]
    ShutdownStatus { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("`{command}` did not report a service within {secs}s")]
    StartTimeout { command: String, secs: u64 },

    #[error("`{command}` exited before reporting a service")]
    ExitedBeforeReady { command: String },

    #[error("operation canceled")]
    Canceled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl DriverError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DriverError::Decode { .. }
            | DriverError::InvalidDid { .. }
            | DriverError::InvalidUrl { .. }
            | DriverError::Key { .. }
            | DriverError::KeyMaterial { .. }
            | DriverError::Response { .. }
            | DriverError::Caveats(_) => ErrorClass::Decode,
            DriverError::ReceiptCount(_)
            | DriverError::ShutdownStatus { .. }
            | DriverError::Archive(_) => ErrorClass::Protocol,
            DriverError::Config { .. }
            | DriverError::EmptyCommand
            | DriverError::UnknownService(_)
            | DriverError::DuplicateService(_) => ErrorClass::Lifecycle,
            DriverError::Spawn { .. }
            | DriverError::Exit { .. }
            | DriverError::Http(_)
            | DriverError::StartTimeout { .. }
            | DriverError::ExitedBeforeReady { .. }
            | DriverError::Canceled
            | DriverError::Io(_) => ErrorClass::Process,
        }
    }

    /// Raw process output attached to the error, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            DriverError::Exit { output, .. }
            | DriverError::Decode { output, .. }
            | DriverError::KeyMaterial { output, .. }
            | DriverError::Response { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, DriverError::Canceled)
    }
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;
