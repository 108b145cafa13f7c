use transport::{DeviceError, Value};

use crate::errors::ErrorCode;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{model} has no property {name:?}")]
    UnknownProperty { model: &'static str, name: String },

    #[error("property {0:?} cannot be read")]
    NotReadable(&'static str),

    #[error("property {0:?} cannot be set")]
    NotWritable(&'static str),

    #[error("property {0:?} needs a channel")]
    ChannelRequired(&'static str),

    #[error("property {0:?} has no channels")]
    UnexpectedChannel(&'static str),

    #[error("channel {channel} of {property:?} is outside {first}..={last}")]
    ChannelOutOfRange {
        property: &'static str,
        channel: u32,
        first: u32,
        last: u32,
    },

    #[error("{value} is not a valid {property:?} (expected {expected})")]
    InvalidValue {
        property: &'static str,
        value: Value,
        expected: String,
    },

    #[error(transparent)]
    Transport(#[from] transport::Error),
}

impl Error {
    /// The error code the device answered with, if that is what happened.
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            Error::Transport(transport::Error::Device(e)) => Some(e),
            _ => None,
        }
    }

    /// `true` when the device rejected the request with `code`.
    pub fn is_code(&self, code: ErrorCode) -> bool {
        self.device_error().is_some_and(|e| e.code == code.code())
    }
}
