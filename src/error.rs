//! Our error types for the MHS-5200A.

use core::time::Duration;

use thiserror::Error;

pub type Result<T, I> = core::result::Result<T, Error<I>>;

/// Custom error type for MHS-5200A communications.
///
/// Generic over the error type of the underlying [embedded_io] transport.
#[derive(Error, Debug)]
pub enum Error<I: embedded_io::Error> {
    /// The byte layer failed. The session should be considered unusable.
    #[error("Serial communication error: {0:?}")]
    SerialError(I),
    /// No newline terminated response arrived within the response window.
    #[error("No response from the instrument within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    InvalidValue(#[from] ValueError),
    #[error("Unknown command {0}")]
    UnknownCommand(String),
    #[error("Unknown parameter {0}")]
    UnknownParameter(String),
    #[error("{command} is missing its {parameter} parameter")]
    MissingParameter {
        command: String,
        parameter: &'static str,
    },
    /// A command or response did not fit in its fixed size buffer.
    #[error("Buffer capacity exceeded")]
    BufferError,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from decoding instrument responses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Expected {expected:?}, got {got:?} instead")]
    UnexpectedResponse { expected: String, got: String },
    #[error("Response too short, expected at least {expected} bytes but got {got}")]
    ResponseTooShort { expected: usize, got: usize },
    #[error("Could not parse {0:?} as a number")]
    InvalidNumber(String),
    #[error("Command does not fit in the command buffer")]
    CommandTooLong,
}

/// Errors for values the instrument would not accept.
///
/// These are raised before anything is written to the transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("{value} is not a valid {quantity}, supported values are between {min} and {max}")]
    OutOfRange {
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{name:?} is not a valid {quantity}")]
    UnknownName { quantity: &'static str, name: String },
    #[error("Expected exactly {expected} samples, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("Line {line}: {text:?} is not a valid sample")]
    InvalidSample { line: usize, text: String },
}

impl ValueError {
    pub(crate) fn check_range(
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    ) -> core::result::Result<f64, ValueError> {
        if value.is_nan() || value < min || value > max {
            Err(ValueError::OutOfRange {
                quantity,
                value,
                min,
                max,
            })
        } else {
            Ok(value)
        }
    }
}
