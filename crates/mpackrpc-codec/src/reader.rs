use std::io::{ErrorKind, Read};
use std::time::Duration;

use bytes::BytesMut;
use mpackrpc_transport::IpcStream;

use crate::decode::{decode_value, ensure_message, CodecConfig};
use crate::error::{CodecError, Result};
use crate::value::Value;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete values from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete values.
pub struct MessageReader<T> {
    inner: T,
    buf: BytesMut,
    config: CodecConfig,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: CodecConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete value (blocking).
    ///
    /// Returns `Err(CodecError::ConnectionClosed)` when EOF is reached between
    /// values and `Err(CodecError::UnexpectedEof)` when it cuts one short.
    pub fn read_value(&mut self) -> Result<Value> {
        loop {
            if let Some(value) = decode_value(&mut self.buf, &self.config)? {
                return Ok(value);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            };

            if read == 0 {
                return Err(if self.buf.is_empty() {
                    CodecError::ConnectionClosed
                } else {
                    CodecError::UnexpectedEof
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read the next message, which must be an array.
    pub fn read_message(&mut self) -> Result<Value> {
        self.read_value().and_then(ensure_message)
    }

    /// Bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

impl MessageReader<IpcStream> {
    /// Create a message reader for `IpcStream` and apply a read timeout.
    pub fn with_timeout(
        inner: IpcStream,
        config: CodecConfig,
        read_timeout: Option<Duration>,
    ) -> Result<Self> {
        inner
            .set_read_timeout(read_timeout)
            .map_err(transport_to_codec_error)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn transport_to_codec_error(err: mpackrpc_transport::TransportError) -> CodecError {
    match err {
        mpackrpc_transport::TransportError::Io(io) => CodecError::Io(io),
        mpackrpc_transport::TransportError::Connect { source, .. } => CodecError::Io(source),
        other => CodecError::Io(std::io::Error::other(other.to_string())),
    }
}
