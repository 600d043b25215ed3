// src/core/errors.rs

//! Defines the error type of the harness and the classification of upstream
//! error messages.

use std::sync::Arc;
use std::time::Duration;
use strum_macros::{AsRefStr, Display, EnumIter};
use thiserror::Error;

/// The category a failure falls into, inferred from the raw error text.
///
/// The proxy and the stores are developed independently and their error text
/// is not a designed contract, so this mapping is best-effort. Text that does
/// not match any known wording lands in `Unclassified` rather than in an
/// unrelated category.
///
/// `ConnectionFailed` and `Config` never come from upstream text; the harness
/// raises them itself before any exchange takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorClass {
    NotAuthenticated,
    InvalidCredential,
    AuthNotConfigured,
    UnsupportedCommand,
    ReadOnly,
    Timeout,
    ConnectionClosed,
    ConnectionFailed,
    Config,
    Unclassified,
}

/// Known upstream wordings, checked in order. Matching is case-insensitive.
const CLASSIFICATION_TABLE: &[(&str, ErrorClass)] = &[
    ("noauth", ErrorClass::NotAuthenticated),
    ("operation not permitted", ErrorClass::NotAuthenticated),
    ("authentication required", ErrorClass::NotAuthenticated),
    ("invalid password", ErrorClass::InvalidCredential),
    ("wrongpass", ErrorClass::InvalidCredential),
    ("no password is set", ErrorClass::AuthNotConfigured),
    ("unknown command", ErrorClass::UnsupportedCommand),
    ("read only", ErrorClass::ReadOnly),
    ("readonly", ErrorClass::ReadOnly),
    ("timed out", ErrorClass::Timeout),
    ("timeout", ErrorClass::Timeout),
    ("connection closed", ErrorClass::ConnectionClosed),
    ("socket closed", ErrorClass::ConnectionClosed),
    ("connection reset", ErrorClass::ConnectionClosed),
];

impl ErrorClass {
    /// Maps a raw error message onto a category.
    pub fn classify(message: &str) -> Self {
        let lowered = message.to_ascii_lowercase();
        CLASSIFICATION_TABLE
            .iter()
            .find(|(needle, _)| lowered.contains(needle))
            .map(|(_, class)| *class)
            .unwrap_or(ErrorClass::Unclassified)
    }
}

/// The main error enum of the harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// An error reply sent back by the proxy or the store.
    #[error("{message}")]
    Server { class: ErrorClass, message: String },

    #[error("Timeout after {duration:?}: {operation} timed out")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl HarnessError {
    /// Builds a `Server` error from the raw reply text, classifying it on the way.
    pub fn server(message: impl Into<String>) -> Self {
        let message = message.into();
        HarnessError::Server {
            class: ErrorClass::classify(&message),
            message,
        }
    }

    /// The category of this failure.
    pub fn class(&self) -> ErrorClass {
        match self {
            HarnessError::Server { class, .. } => *class,
            HarnessError::Timeout { .. } => ErrorClass::Timeout,
            HarnessError::ConnectionClosed => ErrorClass::ConnectionClosed,
            HarnessError::Io(e) => match e.kind() {
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof => ErrorClass::ConnectionClosed,
                std::io::ErrorKind::TimedOut => ErrorClass::Timeout,
                _ => ErrorClass::classify(&e.to_string()),
            },
            HarnessError::Connection { .. } => ErrorClass::ConnectionFailed,
            HarnessError::Config(_) => ErrorClass::Config,
            HarnessError::Protocol(_) => ErrorClass::Unclassified,
        }
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
impl Clone for HarnessError {
    fn clone(&self) -> Self {
        match self {
            HarnessError::Config(s) => HarnessError::Config(s.clone()),
            HarnessError::Connection { endpoint, reason } => HarnessError::Connection {
                endpoint: endpoint.clone(),
                reason: reason.clone(),
            },
            HarnessError::ConnectionClosed => HarnessError::ConnectionClosed,
            HarnessError::Io(e) => HarnessError::Io(Arc::clone(e)),
            HarnessError::Server { class, message } => HarnessError::Server {
                class: *class,
                message: message.clone(),
            },
            HarnessError::Timeout {
                operation,
                duration,
            } => HarnessError::Timeout {
                operation: operation.clone(),
                duration: *duration,
            },
            HarnessError::Protocol(s) => HarnessError::Protocol(s.clone()),
        }
    }
}

impl PartialEq for HarnessError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HarnessError::Io(e1), HarnessError::Io(e2)) => {
                e1.kind() == e2.kind() && e1.to_string() == e2.to_string()
            }
            (HarnessError::Config(s1), HarnessError::Config(s2)) => s1 == s2,
            (HarnessError::Protocol(s1), HarnessError::Protocol(s2)) => s1 == s2,
            (
                HarnessError::Connection {
                    endpoint: e1,
                    reason: r1,
                },
                HarnessError::Connection {
                    endpoint: e2,
                    reason: r2,
                },
            ) => e1 == e2 && r1 == r2,
            (
                HarnessError::Server {
                    class: c1,
                    message: m1,
                },
                HarnessError::Server {
                    class: c2,
                    message: m2,
                },
            ) => c1 == c2 && m1 == m2,
            (
                HarnessError::Timeout {
                    operation: o1,
                    duration: d1,
                },
                HarnessError::Timeout {
                    operation: o2,
                    duration: d2,
                },
            ) => o1 == o2 && d1 == d2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => HarnessError::ConnectionClosed,
            _ => HarnessError::Io(Arc::new(e)),
        }
    }
}

impl From<std::num::ParseIntError> for HarnessError {
    fn from(e: std::num::ParseIntError) -> Self {
        HarnessError::Protocol(format!("invalid integer: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for HarnessError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        HarnessError::Protocol(format!("invalid UTF-8: {e}"))
    }
}
