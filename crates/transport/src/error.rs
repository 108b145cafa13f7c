//! Error types for the protocol engine.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::time::Duration;

use crate::client::ConnectionState;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by [`crate::Client`] and the components behind it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The byte stream produced an unterminated line longer than allowed.
    #[error("unterminated frame exceeded the maximum of {max} bytes")]
    FramingOverflow {
        /// The configured maximum frame length.
        max: usize,
    },

    /// A reply matched the pending request but could not be decoded.
    #[error("could not decode reply {reply:?}: {source}")]
    Decode {
        /// Text of the offending reply.
        reply: String,
        /// Why the decoder rejected it.
        #[source]
        source: DecodeError,
    },

    /// No matching reply arrived within the request's window.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// Another request is outstanding and the client is configured to fail fast.
    #[error("another request is already in progress")]
    RequestInProgress,

    /// The transport failed; the connection is now faulted.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The operation needs an open connection.
    #[error("not connected (connection is {0})")]
    NotConnected(ConnectionState),

    /// The request was abandoned because the connection was closed.
    #[error("request cancelled by close")]
    Cancelled,

    /// The device answered the request with an error code.
    #[error("device error: {0}")]
    Device(DeviceError),

    /// `open` was called on a connection that is already open.
    #[error("connection is already open")]
    AlreadyOpen,

    /// An I/O error while acquiring the transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Failure reported by a [`crate::Command`] result decoder.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct DecodeError {
    reason: String,
}

impl DecodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// An error code sent by the device in place of a regular reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceError {
    /// Numeric error code as sent on the wire.
    pub code: u16,
    /// Human readable description of the code.
    pub description: Cow<'static, str>,
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:02} ({})", self.code, self.description)
    }
}

/// Errors loading [`crate::config::Settings`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("reading configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::config::Settings`].
    #[error("parsing configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
