use std::path::PathBuf;

/// Errors that can occur while connecting to or talking with the host process.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the host's listen address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The operation is not available for this kind of stream.
    #[error("{operation} is not supported on {transport} streams")]
    Unsupported {
        operation: &'static str,
        transport: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;
