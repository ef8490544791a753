use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::error::{CodecError, Result};
use crate::table::{identify, WireTag};
use crate::value::{Ext, Value};

/// Default maximum message and length-field size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default maximum container nesting depth.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Largest extension payload accepted. Handles are at most a `u32`
/// wrapped in a msgpack integer.
const MAX_EXT_PAYLOAD: usize = 8;

/// Configuration for the decoder.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum size of a buffered message and of any string or container
    /// length field. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Maximum container nesting depth. Default: 512.
    pub max_depth: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Decode one value from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete value yet,
/// leaving it untouched. On success, consumes exactly the value's bytes;
/// strings in the result share the buffer's allocation.
pub fn decode_value(src: &mut BytesMut, config: &CodecConfig) -> Result<Option<Value>> {
    let Some(len) = measure(&src[..], config)? else {
        if src.len() > config.max_payload_size {
            return Err(CodecError::PayloadTooLarge {
                size: src.len(),
                max: config.max_payload_size,
            });
        }
        return Ok(None); // Need more data
    };

    if len > config.max_payload_size {
        return Err(CodecError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        });
    }

    let frame = src.split_to(len).freeze();
    let value = Decoder::new(&frame, config).value(0)?;
    trace!(len, kind = %value.kind(), "decoded value");
    Ok(Some(value))
}

/// Decode one message: a value whose top level must be an array.
pub fn decode_message(src: &mut BytesMut, config: &CodecConfig) -> Result<Option<Value>> {
    decode_value(src, config)?.map(ensure_message).transpose()
}

/// Decode one value from a complete slice, returning it and the number of
/// bytes it occupied.
///
/// A slice that ends inside the value is [`CodecError::UnexpectedEof`].
pub fn decode_slice(input: &[u8]) -> Result<(Value, usize)> {
    let config = CodecConfig {
        max_payload_size: usize::MAX,
        ..CodecConfig::default()
    };
    let len = measure(input, &config)?.ok_or(CodecError::UnexpectedEof)?;
    let frame = Bytes::copy_from_slice(&input[..len]);
    let value = Decoder::new(&frame, &config).value(0)?;
    Ok((value, len))
}

/// Reject any top-level value that is not an array.
pub fn ensure_message(value: Value) -> Result<Value> {
    match value {
        Value::Array(_) => Ok(value),
        other => Err(CodecError::ProtocolViolation(format!(
            "top-level {} where a message array was expected",
            other.kind()
        ))),
    }
}

/// What a lead byte and its fixed-size tail say about the value.
enum Header {
    Nil,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Str(usize),
    Array(usize),
    Map(usize),
    Ext { kind: i8, len: usize },
}

/// Length in bytes of the first complete value in `buf`, or `None` if more
/// bytes are needed. Walks headers only, nothing is allocated per value.
fn measure(buf: &[u8], config: &CodecConfig) -> Result<Option<usize>> {
    // Children still expected by each open container.
    let mut open: Vec<usize> = Vec::new();
    let mut pos = 0usize;

    loop {
        let Some(header) = read_header(buf, &mut pos)? else {
            return Ok(None);
        };

        let children = match header {
            Header::Str(len) => {
                check_len(len, config)?;
                if take(buf, &mut pos, len).is_none() {
                    return Ok(None);
                }
                0
            }
            Header::Ext { len, .. } => {
                check_ext_len(len)?;
                if take(buf, &mut pos, len).is_none() {
                    return Ok(None);
                }
                0
            }
            Header::Array(len) => {
                check_len(len, config)?;
                len
            }
            Header::Map(len) => {
                check_len(len, config)?;
                len.checked_mul(2).ok_or(CodecError::PayloadTooLarge {
                    size: len,
                    max: config.max_payload_size,
                })?
            }
            Header::Nil | Header::Bool(_) | Header::Int(_) | Header::UInt(_) => 0,
        };

        if children > 0 {
            if open.len() >= config.max_depth {
                return Err(CodecError::DepthExceeded(config.max_depth));
            }
            open.push(children);
            continue;
        }

        // One value finished; close every container it completes.
        loop {
            match open.last_mut() {
                None => return Ok(Some(pos)),
                Some(remaining) => {
                    *remaining -= 1;
                    if *remaining > 0 {
                        break;
                    }
                    open.pop();
                }
            }
        }
    }
}

struct Decoder<'b> {
    src: &'b Bytes,
    pos: usize,
    config: &'b CodecConfig,
}

impl<'b> Decoder<'b> {
    fn new(src: &'b Bytes, config: &'b CodecConfig) -> Self {
        Self {
            src,
            pos: 0,
            config,
        }
    }

    /// `depth` is the number of containers enclosing this value.
    fn value(&mut self, depth: usize) -> Result<Value> {
        let header = read_header(self.src, &mut self.pos)?.ok_or(CodecError::UnexpectedEof)?;
        let value = match header {
            Header::Nil => Value::Nil,
            Header::Bool(b) => Value::Bool(b),
            Header::Int(n) => Value::Int(n),
            Header::UInt(n) => Value::UInt(n),
            Header::Str(len) => {
                check_len(len, self.config)?;
                let start = self.pos;
                take(self.src, &mut self.pos, len).ok_or(CodecError::UnexpectedEof)?;
                Value::Str(self.src.slice(start..self.pos))
            }
            Header::Ext { kind, len } => {
                check_ext_len(len)?;
                let payload =
                    take(self.src, &mut self.pos, len).ok_or(CodecError::UnexpectedEof)?;
                Value::Ext(Ext::new(kind, ext_handle(payload)?))
            }
            Header::Array(len) => {
                self.enter(len, depth)?;
                let mut items = Vec::with_capacity(len.min(self.remaining()));
                for _ in 0..len {
                    items.push(self.value(depth + 1)?);
                }
                Value::Array(items)
            }
            Header::Map(len) => {
                self.enter(len, depth)?;
                let mut entries = Vec::with_capacity(len.min(self.remaining() / 2));
                for _ in 0..len {
                    let key = self.value(depth + 1)?;
                    let value = self.value(depth + 1)?;
                    entries.push((key, value));
                }
                Value::Map(entries)
            }
        };
        Ok(value)
    }

    fn enter(&self, len: usize, depth: usize) -> Result<()> {
        check_len(len, self.config)?;
        if len > 0 && depth >= self.config.max_depth {
            return Err(CodecError::DepthExceeded(self.config.max_depth));
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.src.len().saturating_sub(self.pos)
    }
}

fn read_header(buf: &[u8], pos: &mut usize) -> Result<Option<Header>> {
    let Some(&lead) = buf.get(*pos) else {
        return Ok(None);
    };
    let entry = identify(lead)?;
    *pos += 1;

    let header = match entry.tag {
        WireTag::Nil => Some(Header::Nil),
        WireTag::True => Some(Header::Bool(true)),
        WireTag::False => Some(Header::Bool(false)),
        WireTag::PosFixInt => Some(Header::UInt(u64::from(entry.payload(lead)))),
        WireTag::NegFixInt => Some(Header::Int(i64::from(lead as i8))),
        WireTag::UInt8 => be_uint(buf, pos, 1).map(Header::UInt),
        WireTag::UInt16 => be_uint(buf, pos, 2).map(Header::UInt),
        WireTag::UInt32 => be_uint(buf, pos, 4).map(Header::UInt),
        WireTag::UInt64 => be_uint(buf, pos, 8).map(Header::UInt),
        WireTag::Int8 => be_int(buf, pos, 1).map(Header::Int),
        WireTag::Int16 => be_int(buf, pos, 2).map(Header::Int),
        WireTag::Int32 => be_int(buf, pos, 4).map(Header::Int),
        WireTag::Int64 => be_int(buf, pos, 8).map(Header::Int),
        WireTag::FixStr => Some(Header::Str(usize::from(entry.payload(lead)))),
        WireTag::Str8 => be_len(buf, pos, 1).map(Header::Str),
        WireTag::Str16 => be_len(buf, pos, 2).map(Header::Str),
        WireTag::Str32 => be_len(buf, pos, 4).map(Header::Str),
        WireTag::FixArray => Some(Header::Array(usize::from(entry.payload(lead)))),
        WireTag::Array16 => be_len(buf, pos, 2).map(Header::Array),
        WireTag::Array32 => be_len(buf, pos, 4).map(Header::Array),
        WireTag::FixMap => Some(Header::Map(usize::from(entry.payload(lead)))),
        WireTag::Map16 => be_len(buf, pos, 2).map(Header::Map),
        WireTag::Map32 => be_len(buf, pos, 4).map(Header::Map),
        WireTag::FixExt1 => ext_kind(buf, pos, 1),
        WireTag::FixExt2 => ext_kind(buf, pos, 2),
        WireTag::FixExt4 => ext_kind(buf, pos, 4),
        WireTag::FixExt8 => ext_kind(buf, pos, 8),
        WireTag::FixExt16 => ext_kind(buf, pos, 16),
        WireTag::Ext8 => be_len(buf, pos, 1).and_then(|len| ext_kind(buf, pos, len)),
        WireTag::Ext16 => be_len(buf, pos, 2).and_then(|len| ext_kind(buf, pos, len)),
        WireTag::Ext32 => be_len(buf, pos, 4).and_then(|len| ext_kind(buf, pos, len)),
        WireTag::Bin8 | WireTag::Bin16 | WireTag::Bin32 => {
            return Err(CodecError::Unsupported("bin values"));
        }
    };
    Ok(header)
}

fn ext_kind(buf: &[u8], pos: &mut usize, len: usize) -> Option<Header> {
    let kind = take(buf, pos, 1)?[0] as i8;
    Some(Header::Ext { kind, len })
}

fn take<'b>(buf: &'b [u8], pos: &mut usize, n: usize) -> Option<&'b [u8]> {
    let end = pos.checked_add(n)?;
    let slice = buf.get(*pos..end)?;
    *pos = end;
    Some(slice)
}

fn be_uint(buf: &[u8], pos: &mut usize, width: usize) -> Option<u64> {
    take(buf, pos, width).map(fold_be)
}

fn be_int(buf: &[u8], pos: &mut usize, width: usize) -> Option<i64> {
    let shift = 64 - 8 * width as u32;
    be_uint(buf, pos, width).map(|raw| ((raw << shift) as i64) >> shift)
}

fn be_len(buf: &[u8], pos: &mut usize, width: usize) -> Option<usize> {
    be_uint(buf, pos, width).map(|n| n as usize)
}

fn fold_be(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn check_len(len: usize, config: &CodecConfig) -> Result<()> {
    if len > config.max_payload_size {
        return Err(CodecError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        });
    }
    Ok(())
}

fn check_ext_len(len: usize) -> Result<()> {
    if len > MAX_EXT_PAYLOAD {
        return Err(CodecError::Unsupported("extension payload wider than 8 bytes"));
    }
    Ok(())
}

/// The handle carried by an extension payload.
///
/// The host wraps handles in a msgpack integer that fills the payload
/// exactly; anything else is read as a raw big-endian number.
fn ext_handle(payload: &[u8]) -> Result<u32> {
    let mut pos = 0usize;
    let nested = match read_header(payload, &mut pos) {
        Ok(Some(Header::UInt(n))) if pos == payload.len() => Some(i128::from(n)),
        Ok(Some(Header::Int(n))) if pos == payload.len() => Some(i128::from(n)),
        _ => None,
    };
    let number = nested.unwrap_or_else(|| i128::from(fold_be(payload)));
    u32::try_from(number).map_err(|_| CodecError::ExtOutOfRange)
}
