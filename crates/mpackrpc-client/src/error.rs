use std::time::Duration;

use mpackrpc_codec::{CodecError, FormatError};

use crate::envelope::RemoteError;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] mpackrpc_transport::TransportError),

    /// Encoding or decoding error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The host sent something the protocol does not allow.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The host answered the request with an error.
    #[error("remote error: {0}")]
    Remote(RemoteError),

    /// No response arrived in time.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The channel was closed before or while the request was in flight.
    #[error("channel {0} is closed")]
    ChannelClosed(u16),

    /// No channel with this id was ever attached.
    #[error("unknown channel {0}")]
    UnknownChannel(u16),
}

impl From<FormatError> for ClientError {
    fn from(err: FormatError) -> Self {
        ClientError::Codec(CodecError::Format(err))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
