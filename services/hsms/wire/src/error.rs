//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Incomplete message (need more data)
    #[error("incomplete message")]
    Incomplete,

    /// Builder argument missing or not valid for the chosen format
    #[error("invalid construction: {0}")]
    Construction(&'static str),

    /// Unknown SECS-II format code
    #[error("unknown format code {0:#04x}")]
    Format(u8),

    /// Value outside the numeric range of its format
    #[error("value out of range for {0}")]
    Range(&'static str),

    /// Value kind does not match the format
    #[error("value does not match format {0}")]
    Shape(&'static str),

    /// Missing or oversized item size
    #[error("invalid item size: {0:?}")]
    Size(Option<usize>),

    /// Payload length is not a multiple of the element width
    #[error("length {len} not a multiple of width {width}")]
    Width {
        /// Declared payload length
        len: usize,
        /// Element width of the format
        width: usize,
    },

    /// Unknown HSMS session type
    #[error("unknown message type {0}")]
    Type(u8),

    /// Presentation type other than SECS-II
    #[error("unsupported presentation type {0}")]
    PType(u8),

    /// Declared message length exceeds the configured maximum
    #[error("message too large: {0}")]
    TooLarge(usize),

    /// Malformed message structure
    #[error("malformed message")]
    Malformed,
}
