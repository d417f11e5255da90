//! Pipeline errors

use thiserror::Error;

use crate::protocol::CodecError;

/// Errors that can occur while moving data through the pipe
#[derive(Error, Debug)]
pub enum PipeError {
    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// More frames in one read than a bundle holds
    #[error("Message bundle full: capacity is {capacity} frames")]
    BundleOverflow {
        /// Bundle capacity in frames
        capacity: usize,
    },

    /// Channel closed or never opened
    #[error("Not connected")]
    NotConnected,

    /// Connector could not open the endpoint
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Pre-connect hook refused the connection
    #[error("Pre-connect hook failed: {0}")]
    PreConnectHook(String),

    /// Read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
