//! Error types for the Modbus client engine
//!
//! Every failure a caller can observe falls into one of five kinds:
//! argument validation, transport, framing, server exception, or a response
//! whose shape disagrees with the request. Each kind is a distinct variant so
//! callers can match on it instead of parsing message strings.

use std::fmt;

use thiserror::Error;

use crate::constants::*;

/// Result type for modbus-link operations
pub type ModbusResult<T> = std::result::Result<T, ModbusError>;

/// Errors surfaced by the client, codecs and transports
#[derive(Debug, Error)]
pub enum ModbusError {
    /// An operation argument is outside its documented range. Nothing was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Connect or handshake failure
    #[error("connection error: {0}")]
    Connection(String),

    /// Read or write failure on an established channel
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configured deadline elapsed before the I/O phase completed
    #[error("timeout: {0}")]
    Timeout(String),

    /// Corrupt or spurious frame: bad checksum, bad delimiters, mismatched
    /// framing fields, or a length field out of range
    #[error("frame error: {0}")]
    Frame(String),

    /// The server answered with an exception response
    #[error(transparent)]
    Exception(#[from] ModbusException),

    /// The response frame is well-formed but its content does not match the
    /// request (byte count inconsistent, echoed field differs, empty data)
    #[error("response mismatch: {0}")]
    Mismatch(String),

    /// Invalid handler configuration (certificate paths, server name)
    #[error("configuration error: {0}")]
    Config(String),
}

impl ModbusError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ModbusError::InvalidArgument(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        ModbusError::Connection(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        ModbusError::Timeout(msg.into())
    }

    pub fn frame(msg: impl Into<String>) -> Self {
        ModbusError::Frame(msg.into())
    }

    pub fn mismatch(msg: impl Into<String>) -> Self {
        ModbusError::Mismatch(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        ModbusError::Config(msg.into())
    }
}

/// Exception response returned by a Modbus server
///
/// Produced when the response function code equals the request function code
/// with the high bit set. The transport remains healthy after an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModbusException {
    /// Function code of the original request
    pub function_code: u8,
    /// Exception code reported by the server (0 if the response carried none)
    pub exception_code: u8,
}

impl ModbusException {
    pub fn new(function_code: u8, exception_code: u8) -> Self {
        Self {
            function_code,
            exception_code,
        }
    }

    /// Human-readable name of the exception code
    pub fn description(&self) -> &'static str {
        match self.exception_code {
            EXCEPTION_ILLEGAL_FUNCTION => "illegal function",
            EXCEPTION_ILLEGAL_DATA_ADDRESS => "illegal data address",
            EXCEPTION_ILLEGAL_DATA_VALUE => "illegal data value",
            EXCEPTION_SERVER_DEVICE_FAILURE => "server device failure",
            EXCEPTION_ACKNOWLEDGE => "acknowledge",
            EXCEPTION_SERVER_DEVICE_BUSY => "server device busy",
            EXCEPTION_MEMORY_PARITY_ERROR => "memory parity error",
            EXCEPTION_GATEWAY_PATH_UNAVAILABLE => "gateway path unavailable",
            EXCEPTION_GATEWAY_TARGET_FAILED => "gateway target device failed to respond",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ModbusException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exception '{}' ({}), function '{}'",
            self.exception_code,
            self.description(),
            self.function_code
        )
    }
}

impl std::error::Error for ModbusException {}
