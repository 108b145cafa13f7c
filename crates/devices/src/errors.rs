//! SIS error codes
//!
//! A device that rejects a command answers with `E` and a two digit code
//! instead of the regular reply. Hardware failures append a descriptor,
//! e.g. `E30:02`.
use std::borrow::Cow;
use std::fmt;

use transport::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    InvalidInputNumber = 1,
    InvalidSwitchAttempt = 6,
    InvalidFunction = 9,
    InvalidCommand = 10,
    InvalidPreset = 11,
    InvalidPort = 12,
    InvalidParameter = 13,
    NotValidForConfiguration = 14,
    InvalidForSignalType = 17,
    Busy = 22,
    PrivilegeViolation = 24,
    DeviceNotPresent = 25,
    MaxConnectionsExceeded = 26,
    InvalidEventNumber = 27,
    BadFilename = 28,
    HardwareFailure = 30,
    PortPassthroughNotSet = 31,
    IncorrectVChipPassword = 32,
    BadLogoFileType = 33,
}

const ALL: [ErrorCode; 19] = [
    ErrorCode::InvalidInputNumber,
    ErrorCode::InvalidSwitchAttempt,
    ErrorCode::InvalidFunction,
    ErrorCode::InvalidCommand,
    ErrorCode::InvalidPreset,
    ErrorCode::InvalidPort,
    ErrorCode::InvalidParameter,
    ErrorCode::NotValidForConfiguration,
    ErrorCode::InvalidForSignalType,
    ErrorCode::Busy,
    ErrorCode::PrivilegeViolation,
    ErrorCode::DeviceNotPresent,
    ErrorCode::MaxConnectionsExceeded,
    ErrorCode::InvalidEventNumber,
    ErrorCode::BadFilename,
    ErrorCode::HardwareFailure,
    ErrorCode::PortPassthroughNotSet,
    ErrorCode::IncorrectVChipPassword,
    ErrorCode::BadLogoFileType,
];

impl ErrorCode {
    pub fn from_code(code: u16) -> Option<Self> {
        ALL.into_iter().find(|c| c.code() == code)
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::InvalidInputNumber => "invalid input number",
            ErrorCode::InvalidSwitchAttempt => "invalid switch attempt in this mode",
            ErrorCode::InvalidFunction => "invalid function number",
            ErrorCode::InvalidCommand => "invalid command",
            ErrorCode::InvalidPreset => "invalid preset number",
            ErrorCode::InvalidPort => "invalid port number",
            ErrorCode::InvalidParameter => "invalid parameter",
            ErrorCode::NotValidForConfiguration => "not valid for this configuration",
            ErrorCode::InvalidForSignalType => "invalid command for signal type",
            ErrorCode::Busy => "busy",
            ErrorCode::PrivilegeViolation => "privilege violation",
            ErrorCode::DeviceNotPresent => "device not present",
            ErrorCode::MaxConnectionsExceeded => "maximum number of connections exceeded",
            ErrorCode::InvalidEventNumber => "invalid event number",
            ErrorCode::BadFilename => "bad filename or file not found",
            ErrorCode::HardwareFailure => "hardware failure",
            ErrorCode::PortPassthroughNotSet => {
                "attempt to break port passthrough when not set"
            }
            ErrorCode::IncorrectVChipPassword => "incorrect V-chip password",
            ErrorCode::BadLogoFileType => "bad file type for logo",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:02} ({})", self.code(), self.description())
    }
}

/// Build the [`DeviceError`] for a code, known or not.
pub fn device_error(code: u16) -> DeviceError {
    let description = ErrorCode::from_code(code).map_or("unknown error", ErrorCode::description);
    DeviceError {
        code,
        description: Cow::Borrowed(description),
    }
}

/// Recognise an error reply line.
///
/// Only `E` followed by exactly two digits counts, so replies such as
/// `Exe1` are left alone.
pub fn parse(line: &str) -> Option<DeviceError> {
    let rest = line.strip_prefix('E')?;
    let (digits, descriptor) = match rest.split_once(':') {
        Some((digits, descriptor)) => (digits, Some(descriptor)),
        None => (rest, None),
    };
    if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let code = digits.parse().ok()?;
    let mut error = device_error(code);

    match descriptor {
        None => {}
        Some(d) if !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()) => {
            error.description = Cow::Owned(format!("{}, descriptor {d}", error.description));
        }
        Some(_) => return None,
    }
    Some(error)
}
