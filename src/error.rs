//! Error types for the framed transport and segment layer.

use std::io;
use thiserror::Error;

use crate::segment::ConversationId;

/// Errors that can occur while moving frames and segments.
#[derive(Error, Debug)]
pub enum StackError {
    /// Could not bind the listening socket.
    #[error("Bind failed: {0}")]
    Bind(#[source] io::Error),

    /// Could not open an active connection to the peer.
    #[error("Connect failed: {0}")]
    Connect(#[source] io::Error),

    /// Accepting the incoming connection failed.
    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    /// No live connection.
    #[error("Not connected")]
    NotConnected,

    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame could not be read completely.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame payload above the configured maximum.
    #[error("Frame too large: {size} bytes exceeds maximum of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    /// A frame payload did not decode as a segment.
    #[error("Malformed segment: {0}")]
    MalformedSegment(#[from] serde_json::Error),

    /// No conversation registered under this id.
    #[error("Unknown conversation: {0}")]
    UnknownConversation(ConversationId),

    /// The receive loop was already started for this connection.
    #[error("Receive loop already running")]
    AlreadyReceiving,
}

/// Result type alias for stack operations.
pub type Result<T> = std::result::Result<T, StackError>;

impl StackError {
    /// Create a new malformed frame error.
    pub fn malformed_frame(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Check if this error is recoverable (transient).
    ///
    /// `NotConnected` is recoverable in the sense that the caller may retry
    /// after establishing a new connection.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if e.kind() == io::ErrorKind::WouldBlock
                || e.kind() == io::ErrorKind::TimedOut
                || e.kind() == io::ErrorKind::Interrupted
        ) || matches!(self, Self::NotConnected)
    }

    /// Check if this error leaves the connection unusable.
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::MalformedFrame(_) | Self::MalformedSegment(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StackError::FrameTooLarge { size: 20, max: 10 };
        assert_eq!(
            format!("{err}"),
            "Frame too large: 20 bytes exceeds maximum of 10 bytes"
        );

        let err = StackError::UnknownConversation(ConversationId(7));
        assert_eq!(format!("{err}"), "Unknown conversation: #7");

        assert_eq!(format!("{}", StackError::NotConnected), "Not connected");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "test");
        let err: StackError = io_err.into();
        assert!(matches!(err, StackError::Io(_)));
        assert!(err.is_fatal_to_connection());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_recoverable() {
        assert!(StackError::NotConnected.is_recoverable());
        assert!(!StackError::NotConnected.is_fatal_to_connection());
        let err = StackError::Io(io::Error::new(io::ErrorKind::Interrupted, "eintr"));
        assert!(err.is_recoverable());
        assert!(StackError::malformed_frame("short").is_fatal_to_connection());
    }
}
