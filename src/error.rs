//! Error types for Chatflow.
//!
//! All errors in Chatflow are represented by the `ChatflowError` enum,
//! which provides specific variants for different error categories.

use std::{io::ErrorKind, string::FromUtf8Error};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all Chatflow operations.
///
/// `Graph`, `Script` and `External` are produced while a turn is running and are
/// turned into a session halt by the dispatcher. `Session` is what the public entry
/// points return when an event does not fit the session's current state.
#[derive(Deserialize, Serialize, Error, Debug, Clone, PartialEq)]
pub enum ChatflowError {
    /// Engine-level errors (startup, shutdown, configuration).
    #[error("{0}")]
    Engine(String),

    /// Configuration parsing or validation errors.
    #[error("{0}")]
    Config(String),

    /// Data conversion errors.
    #[error("{0}")]
    Convert(String),

    /// Dangling edge, missing anchor, duplicated handle.
    #[error("graph integrity: {0}")]
    Graph(String),

    /// User script failed to run.
    #[error("script: {0}")]
    Script(String),

    /// Structured exception with error code.
    #[error("ecode: {ecode}, message: {message}")]
    Exception {
        ecode: String,
        message: String,
    },

    /// Timeout, network failure or non-2xx status of an outbound call.
    #[error("external call: {0}")]
    External(String),

    /// The event does not fit the session state (closed, not paused, wrong pause kind).
    #[error("session state: {0}")]
    Session(String),

    /// Runtime execution errors.
    #[error("{0}")]
    Runtime(String),

    /// Storage operation errors.
    #[error("{0}")]
    Store(String),

    /// Flow definition and publish errors.
    #[error("{0}")]
    Flow(String),

    /// Node definition errors.
    #[error("{0}")]
    Node(String),

    /// Edge definition errors.
    #[error("{0}")]
    Edge(String),

    /// Action execution errors.
    #[error("{0}")]
    Action(String),

    /// I/O operation errors.
    #[error("{0}")]
    IoError(String),

    /// Message queue errors.
    #[error("{0}")]
    Queue(String),
}

impl From<ChatflowError> for String {
    fn from(val: ChatflowError) -> Self {
        val.to_string()
    }
}

impl From<std::io::Error> for ChatflowError {
    fn from(error: std::io::Error) -> Self {
        ChatflowError::IoError(error.to_string())
    }
}

impl From<ChatflowError> for std::io::Error {
    fn from(val: ChatflowError) -> Self {
        #[allow(clippy::io_other_error)]
        std::io::Error::new(ErrorKind::Other, val.to_string())
    }
}

impl From<FromUtf8Error> for ChatflowError {
    fn from(_: FromUtf8Error) -> Self {
        ChatflowError::Runtime("Error with utf-8 string convert".to_string())
    }
}

impl From<serde_json::Error> for ChatflowError {
    fn from(error: serde_json::Error) -> Self {
        ChatflowError::Convert(error.to_string())
    }
}

impl From<toml::de::Error> for ChatflowError {
    fn from(error: toml::de::Error) -> Self {
        ChatflowError::Config(error.to_string())
    }
}

impl From<jsonschema::ValidationError<'_>> for ChatflowError {
    fn from(error: jsonschema::ValidationError<'_>) -> Self {
        ChatflowError::Node(error.to_string())
    }
}
