//! Error types for the BME IPC layer.

use std::fmt;
use std::io;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

/// Why a frame read reported end-of-stream.
///
/// All of these leave the connection unusable; the remedy is always the same
/// (close it and, if desired, reconnect).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EofReason {
    /// Peer closed the connection before a header arrived.
    Closed,
    /// Peer closed the connection part way through a header.
    TruncatedHeader { got: usize },
    /// Header sync word did not match.
    OutOfSync { sync: i32 },
    /// Header declared a negative payload size.
    NegativeSize { size: i32 },
}

impl fmt::Display for EofReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EofReason::Closed => write!(f, "connection closed"),
            EofReason::TruncatedHeader { got } => {
                write!(f, "truncated header ({} of 8 bytes)", got)
            }
            EofReason::OutOfSync { sync } => write!(f, "out of sync (sync word {:#010x})", sync),
            EofReason::NegativeSize { size } => write!(f, "negative payload size {}", size),
        }
    }
}

/// Coarse classification of an [`IpcError`].
///
/// Callers that only need to pick a remedy can match on this instead of
/// the individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    Eof,
    BadMessage,
    Transport,
    State,
    Handshake,
    Server,
}

/// IPC-specific error types.
#[derive(Debug, Error)]
pub enum IpcError {
    /// No data or EOF arrived within the bounded wait.
    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    /// Stream ended or lost framing; the connection is no longer usable.
    #[error("End of stream: {0}")]
    Eof(EofReason),

    /// Frame declared more bytes than the caller's buffer holds.
    #[error("Message too large: {declared} bytes declared, buffer holds {capacity}")]
    Oversized { declared: usize, capacity: usize },

    /// Frame payload ended before the declared size.
    #[error("Bad message: got {actual} of {expected} payload bytes")]
    ShortPayload { expected: usize, actual: usize },

    /// Status packet of a request was not a single 4-byte word.
    #[error("Bad status word: got {actual} of 4 bytes")]
    StatusSize { actual: usize },

    /// A fixed-size reply arrived with the wrong length. The frame itself was
    /// read in full, so the stream is still usable.
    #[error("Unexpected reply size: expected {expected} bytes, got {actual}")]
    ReplySize { expected: usize, actual: usize },

    /// Underlying socket call failed, or a frame was only partially written.
    #[error("Transport error: {0}")]
    Transport(#[source] io::Error),

    /// `connect` called while a connection is already active.
    #[error("Already connected")]
    AlreadyConnected,

    /// Operation attempted without an active connection.
    #[error("Not connected")]
    NotConnected,

    /// Cookie exchange failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Server answered a typed call with a negative status.
    #[error("Server returned status {0}")]
    ServerStatus(i32),
}

impl IpcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IpcError::Timeout(_) => ErrorKind::Timeout,
            IpcError::Eof(_) => ErrorKind::Eof,
            IpcError::Oversized { .. }
            | IpcError::ShortPayload { .. }
            | IpcError::StatusSize { .. }
            | IpcError::ReplySize { .. } => ErrorKind::BadMessage,
            IpcError::Transport(_) => ErrorKind::Transport,
            IpcError::AlreadyConnected | IpcError::NotConnected => ErrorKind::State,
            IpcError::Handshake(_) => ErrorKind::Handshake,
            IpcError::ServerStatus(_) => ErrorKind::Server,
        }
    }

    /// OS error code carried by a transport error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            IpcError::Transport(err) => err.raw_os_error(),
            IpcError::Timeout(_) => Some(Errno::ETIMEDOUT as i32),
            _ => None,
        }
    }

    /// Whether the connection must be considered broken after this error.
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(
            self,
            IpcError::AlreadyConnected
                | IpcError::NotConnected
                | IpcError::ServerStatus(_)
                | IpcError::ReplySize { .. }
        )
    }

    /// Error reported for a partially written frame.
    pub(crate) fn short_write() -> Self {
        IpcError::Transport(io::Error::from(SHORT_WRITE_ERRNO))
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
const SHORT_WRITE_ERRNO: Errno = Errno::ECOMM;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SHORT_WRITE_ERRNO: Errno = Errno::EIO;

impl From<io::Error> for IpcError {
    fn from(err: io::Error) -> Self {
        IpcError::Transport(err)
    }
}

impl From<Errno> for IpcError {
    fn from(errno: Errno) -> Self {
        IpcError::Transport(io::Error::from(errno))
    }
}
