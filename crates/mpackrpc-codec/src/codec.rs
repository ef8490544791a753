//! `tokio-util` codec for async transports.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::decode::{decode_value, CodecConfig};
use crate::encode::encode_into;
use crate::error::CodecError;
use crate::value::Value;

/// Decodes a byte stream into values and encodes values onto it.
#[derive(Debug, Clone, Default)]
pub struct MpackCodec {
    config: CodecConfig,
}

impl MpackCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }
}

impl Decoder for MpackCodec {
    type Item = Value;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>, CodecError> {
        decode_value(src, &self.config)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Value>, CodecError> {
        match self.decode(src)? {
            Some(value) => Ok(Some(value)),
            None if src.is_empty() => Ok(None),
            None => Err(CodecError::UnexpectedEof),
        }
    }
}

impl Encoder<&Value> for MpackCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &Value, dst: &mut BytesMut) -> Result<(), CodecError> {
        encode_into(item, dst)
    }
}

impl Encoder<Value> for MpackCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Value, dst: &mut BytesMut) -> Result<(), CodecError> {
        encode_into(&item, dst)
    }
}
