//! Error types and result definitions for the rustylight crate.
//! Includes device-reported protocol errors and conversion from standard IO/JSON errors.

use crate::protocol::Method;
use thiserror::Error;

/// Represents all possible errors that can occur when talking to a Yeelight device.
#[derive(Error, Debug, Clone)]
pub enum YeelightError {
    /// Standard IO error (network, socket options, etc.)
    #[error("IO error: {0}")]
    Io(String),

    /// An outbound command could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// An inbound line was not valid JSON or had an unexpected structure
    #[error("Decode error: {0}")]
    Decode(String),

    /// A send was attempted while no socket is open
    #[error("Device not connected")]
    NotConnected,

    /// No result arrived before the request deadline
    #[error("Timeout waiting for device")]
    Timeout,

    /// The connection dropped while the request was in flight
    #[error("Connection to device lost")]
    Disconnected,

    /// The pending request was superseded by another one with the same id
    #[error("Request cancelled")]
    Cancelled,

    /// The device answered with an error object
    #[error("Device error {code}: {message}")]
    Protocol { code: i64, message: String },

    /// The method is not in the list the device advertised
    #[error("The operation {0} is not allowed by the device")]
    UnsupportedOperation(Method),

    /// A wire name did not match any known method, property or model
    #[error("Unknown name '{0}'")]
    UnknownName(String),

    /// Device hostname not found in a group
    #[error("Device '{0}' not found")]
    DeviceNotFound(String),

    /// Device hostname already present in a group
    #[error("Device '{0}' already exists")]
    DuplicateDevice(String),
}

/// A specialized Result type for Yeelight operations.
pub type Result<T> = std::result::Result<T, YeelightError>;

impl From<std::io::Error> for YeelightError {
    fn from(err: std::io::Error) -> Self {
        YeelightError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for YeelightError {
    fn from(err: serde_json::Error) -> Self {
        YeelightError::Decode(err.to_string())
    }
}

impl YeelightError {
    /// True when the request was abandoned because its deadline passed.
    ///
    /// A timeout is a cancellation outcome, not a device-side failure; callers
    /// use this to tell it apart from [`YeelightError::Protocol`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, YeelightError::Timeout)
    }

    /// True for failures tied to the socket rather than to a single request.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            YeelightError::Io(_) | YeelightError::NotConnected | YeelightError::Disconnected
        )
    }

    /// Returns the device-reported code and message, if any.
    pub fn protocol_error(&self) -> Option<(i64, &str)> {
        match self {
            YeelightError::Protocol { code, message } => Some((*code, message.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_distinct_from_protocol_error() {
        let timeout = YeelightError::Timeout;
        let protocol = YeelightError::Protocol {
            code: -1,
            message: "unsupported method".into(),
        };

        assert!(timeout.is_timeout());
        assert!(timeout.protocol_error().is_none());
        assert!(!protocol.is_timeout());
        assert_eq!(protocol.protocol_error(), Some((-1, "unsupported method")));
    }

    #[test]
    fn io_errors_convert() {
        let err: YeelightError =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(err.is_connection_error());
        assert!(err.to_string().contains("refused"));
    }
}
