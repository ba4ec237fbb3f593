//! Session error types.

use crate::timers::Timer;
use hsms_wire::WireError;
use thiserror::Error;

/// Errors returned to callers of the session API
#[derive(Error, Debug)]
pub enum SessionError {
    /// `start` called on a running session
    #[error("session already started")]
    AlreadyStarted,

    /// Operation on a stopped session
    #[error("session not started")]
    NotStarted,

    /// Operation needs a TCP connection
    #[error("not connected")]
    NotConnected,

    /// Data messages need a selected session
    #[error("not selected")]
    NotSelected,

    /// Select requested on a selected session
    #[error("already selected")]
    AlreadySelected,

    /// The session task has exited
    #[error("session closed")]
    Closed,

    /// Wire protocol error
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Socket error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a connection was torn down
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Failure {
    /// A timer expired
    #[error("{0} expired")]
    Timeout(Timer),

    /// Separate.req sent or received
    #[error("separated")]
    Separated,

    /// The socket closed or failed
    #[error("transport: {0}")]
    Transport(String),

    /// Undecodable bytes on the stream
    #[error("malformed message: {0}")]
    Malformed(WireError),
}
