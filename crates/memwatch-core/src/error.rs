//! Error types for memwatch.
//!
//! Every failure the server can observe is a [`WatchError`]. None of them is
//! fatal to the server: [`WatchError::kind`] tells the caller whether the
//! failure concerns a single command or a whole session.

use crate::host::ControllerClass;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the memwatch server.
#[derive(Debug, Error)]
pub enum WatchError {
    // Parse errors
    #[error("Unknown command: {verb}")]
    UnknownCommand { verb: String },

    #[error("Empty command line")]
    EmptyCommand,

    #[error("Invalid arguments for {verb}: {message}")]
    InvalidArguments { verb: String, message: String },

    // Precondition errors
    #[error("Guest memory not initialized, can't execute {verb}")]
    MemoryNotReady { verb: String },

    #[error("Host not running, can't execute {verb}")]
    HostNotRunning { verb: String },

    #[error("Invalid {class} slot {slot}, {count} slots available")]
    SlotOutOfRange {
        class: ControllerClass,
        slot: usize,
        count: usize,
    },

    #[error("Invalid filename: {name:?}")]
    InvalidFilename { name: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Could not load snapshot: {name}")]
    SnapshotLoadFailed { name: String },

    // Connection errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Line exceeds {limit} bytes without a terminator")]
    LineTooLong { limit: usize },

    #[error("Outbound queue full for session {session}")]
    OutboundFull { session: u64 },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for memwatch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Coarse classification of a [`WatchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed command; the command is dropped.
    Parse,
    /// Host not ready or argument out of domain; the command is dropped.
    Precondition,
    /// The session's connection is unusable; the session is retired.
    Connection,
    /// Anything else.
    Internal,
}

impl From<std::io::Error> for WatchError {
    fn from(err: std::io::Error) -> Self {
        WatchError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WatchError {
    fn from(err: serde_json::Error) -> Self {
        WatchError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl WatchError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        WatchError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for [`WatchError::InvalidArguments`].
    pub fn invalid_args(verb: &str, message: impl Into<String>) -> Self {
        WatchError::InvalidArguments {
            verb: verb.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WatchError::UnknownCommand { .. }
            | WatchError::EmptyCommand
            | WatchError::InvalidArguments { .. } => ErrorKind::Parse,

            WatchError::MemoryNotReady { .. }
            | WatchError::HostNotRunning { .. }
            | WatchError::SlotOutOfRange { .. }
            | WatchError::InvalidFilename { .. }
            | WatchError::Validation { .. }
            | WatchError::SnapshotLoadFailed { .. } => ErrorKind::Precondition,

            WatchError::Io { .. }
            | WatchError::LineTooLong { .. }
            | WatchError::OutboundFull { .. } => ErrorKind::Connection,

            _ => ErrorKind::Internal,
        }
    }

    /// Whether this error ends the session it occurred on.
    pub fn is_terminal_for_session(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WatchError::SlotOutOfRange {
            class: ControllerClass::Pad,
            slot: 7,
            count: 4,
        };
        assert_eq!(err.to_string(), "Invalid GC slot 7, 4 slots available");

        let err = WatchError::UnknownCommand {
            verb: "JUMP".into(),
        };
        assert_eq!(err.to_string(), "Unknown command: JUMP");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(WatchError::invalid_args("READ", "missing addr").kind(), ErrorKind::Parse);
        assert_eq!(
            WatchError::HostNotRunning { verb: "PAUSE".into() }.kind(),
            ErrorKind::Precondition
        );
        assert_eq!(WatchError::LineTooLong { limit: 8 }.kind(), ErrorKind::Connection);
        assert_eq!(
            WatchError::Config { message: "bad".into() }.kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_terminal_errors() {
        let io = WatchError::from(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(io.is_terminal_for_session());
        assert!(!WatchError::EmptyCommand.is_terminal_for_session());
    }
}
