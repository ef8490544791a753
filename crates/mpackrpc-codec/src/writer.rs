use std::io::{ErrorKind, Write};
use std::time::Duration;

use bytes::BytesMut;
use mpackrpc_transport::IpcStream;

use crate::decode::CodecConfig;
use crate::encode::encode_into;
use crate::error::{CodecError, Result};
use crate::format::Encoded;
use crate::reader::transport_to_codec_error;
use crate::value::Value;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete messages to any `Write` stream.
pub struct MessageWriter<T> {
    inner: T,
    buf: BytesMut,
    config: CodecConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, CodecConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: CodecConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send a value (blocking).
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let result = encode_into(value, &mut buf).and_then(|()| self.send(&buf));
        self.buf = buf;
        result
    }

    /// Send a value that was already packed by the format encoder.
    pub fn write_encoded(&mut self, encoded: &Encoded) -> Result<()> {
        self.send(&encoded.packed)
    }

    /// Send pre-encoded bytes holding exactly one message.
    pub fn send(&mut self, packed: &[u8]) -> Result<()> {
        if packed.len() > self.config.max_payload_size {
            return Err(CodecError::PayloadTooLarge {
                size: packed.len(),
                max: self.config.max_payload_size,
            });
        }

        let mut offset = 0usize;
        while offset < packed.len() {
            match self.inner.write(&packed[offset..]) {
                Ok(0) => return Err(CodecError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                // An expired write timeout surfaces as WouldBlock or TimedOut.
                Err(err) => return Err(CodecError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(CodecError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

impl MessageWriter<IpcStream> {
    /// Create a message writer for `IpcStream` and apply a write timeout.
    pub fn with_timeout(
        inner: IpcStream,
        config: CodecConfig,
        write_timeout: Option<Duration>,
    ) -> Result<Self> {
        inner
            .set_write_timeout(write_timeout)
            .map_err(transport_to_codec_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::decode::decode_value;
    use crate::format::{encode_fmt, Arg};

    fn request(seq: u32) -> Value {
        Value::Array(vec![
            Value::UInt(0),
            Value::UInt(seq.into()),
            Value::str("nvim_get_mode"),
            Value::Array(vec![]),
        ])
    }

    fn decode_all(bytes: Vec<u8>) -> Vec<Value> {
        let mut wire = BytesMut::from(bytes.as_slice());
        let mut out = Vec::new();
        while let Some(value) = decode_value(&mut wire, &CodecConfig::default()).unwrap() {
            out.push(value);
        }
        assert!(wire.is_empty());
        out
    }

    #[test]
    fn write_single_value() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_value(&request(1)).unwrap();

        let written = writer.into_inner().into_inner();
        assert_eq!(decode_all(written), vec![request(1)]);
    }

    #[test]
    fn write_multiple_values() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        for seq in 1..=3 {
            writer.write_value(&request(seq)).unwrap();
        }

        let written = writer.into_inner().into_inner();
        assert_eq!(decode_all(written), vec![request(1), request(2), request(3)]);
    }

    #[test]
    fn write_encoded_sends_packed_bytes() {
        let encoded = encode_fmt(
            0,
            "[d,d,s:[]]",
            &[Arg::Int(0), Arg::Int(9), Arg::from("nvim_get_mode")],
        )
        .unwrap();
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_encoded(&encoded).unwrap();

        let written = writer.into_inner().into_inner();
        assert_eq!(written.as_slice(), encoded.packed.as_ref());
        assert_eq!(decode_all(written), vec![request(9)]);
    }

    #[test]
    fn payload_too_large_rejected() {
        let cfg = CodecConfig {
            max_payload_size: 4,
            ..CodecConfig::default()
        };
        let mut writer = MessageWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.write_value(&request(1)).unwrap_err();
        assert!(matches!(err, CodecError::PayloadTooLarge { .. }));
        // The buffer is kept usable after a failed write.
        assert!(writer.send(&[0x90]).is_ok());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = MessageWriter::new(sink);

        writer.write_value(&Value::Array(vec![])).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut writer = MessageWriter::new(cursor);

        let _ = writer.get_ref();
        let _ = writer.get_mut();
        let _ = writer.config();
        let _inner = writer.into_inner();
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = MessageWriter::new(writer_impl);
        writer.write_value(&request(5)).unwrap();

        let inner = writer.into_inner();
        assert_eq!(decode_all(inner.data), vec![request(5)]);
    }

    #[test]
    fn would_block_write_is_an_error() {
        let mut writer = MessageWriter::new(BlockedWriter {
            kind: ErrorKind::WouldBlock,
            attempts: 0,
        });
        let err = writer.write_value(&request(6)).unwrap_err();
        assert!(matches!(err, CodecError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
        assert_eq!(writer.get_ref().attempts, 1);
    }

    #[test]
    fn timed_out_write_is_an_error() {
        let mut writer = MessageWriter::new(BlockedWriter {
            kind: ErrorKind::TimedOut,
            attempts: 0,
        });
        let err = writer.write_value(&request(6)).unwrap_err();
        assert!(matches!(err, CodecError::Io(ref e) if e.kind() == ErrorKind::TimedOut));
        assert_eq!(writer.get_ref().attempts, 1);
    }

    #[test]
    fn would_block_flush_is_an_error() {
        let mut writer = MessageWriter::new(BlockedFlush { data: Vec::new() });
        let err = writer.write_value(&request(8)).unwrap_err();
        assert!(matches!(err, CodecError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    #[cfg(unix)]
    fn stalled_peer_hits_write_timeout() {
        let (left, _right) = IpcStream::pair().unwrap();
        let mut writer = MessageWriter::with_timeout(
            left,
            CodecConfig::default(),
            Some(Duration::from_millis(50)),
        )
        .unwrap();

        // Far larger than any socket buffer; the peer never reads.
        let big = Value::str(vec![b'x'; 8 * 1024 * 1024]);
        let started = std::time::Instant::now();
        let err = writer.write_value(&big).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Io(ref e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        ));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut writer = MessageWriter::new(TrickleWriter { data: Vec::new() });
        writer.write_value(&request(7)).unwrap();
        assert_eq!(decode_all(writer.into_inner().data), vec![request(7)]);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = MessageWriter::new(ZeroWriter);
        let err = writer.write_value(&request(1)).unwrap_err();
        assert!(matches!(err, CodecError::ConnectionClosed));
    }

    #[test]
    #[cfg(unix)]
    fn applies_write_timeout_for_ipc_stream() {
        let (left, _right) = IpcStream::pair().unwrap();
        let writer = MessageWriter::with_timeout(
            left,
            CodecConfig::default(),
            Some(Duration::from_millis(10)),
        );
        assert!(writer.is_ok());
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    /// Every write fails with `kind`, as a socket past its send timeout does.
    struct BlockedWriter {
        kind: ErrorKind,
        attempts: usize,
    }

    impl Write for BlockedWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            self.attempts += 1;
            Err(std::io::Error::from(self.kind))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BlockedFlush {
        data: Vec<u8>,
    }

    impl Write for BlockedFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }

    /// Accepts at most two bytes per call.
    struct TrickleWriter {
        data: Vec<u8>,
    }

    impl Write for TrickleWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(2);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
