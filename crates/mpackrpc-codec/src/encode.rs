use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::table::{self, FIXCONTAINER_MAX, FIXSTR_MAX, NEG_FIXINT_MIN, POS_FIXINT_MAX};
use crate::value::{Ext, Value};

/// Encode a value tree into a fresh buffer.
pub fn encode(value: &Value) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(64);
    encode_into(value, &mut dst)?;
    Ok(dst.freeze())
}

/// Append the encoding of `value` to `dst`, always choosing the most compact
/// wire family.
///
/// Fails only for strings or containers longer than `u32::MAX`.
pub fn encode_into(value: &Value, dst: &mut BytesMut) -> Result<()> {
    match value {
        Value::Nil => write_nil(dst),
        Value::Bool(b) => write_bool(dst, *b),
        Value::Int(n) => write_int(dst, *n),
        Value::UInt(n) => write_uint(dst, *n),
        Value::Ext(ext) => write_ext(dst, *ext),
        Value::Str(bytes) => write_str(dst, bytes)?,
        Value::Array(items) => {
            write_array_header(dst, items.len())?;
            for item in items {
                encode_into(item, dst)?;
            }
        }
        Value::Map(entries) => {
            write_map_header(dst, entries.len())?;
            for (key, value) in entries {
                encode_into(key, dst)?;
                encode_into(value, dst)?;
            }
        }
    }
    Ok(())
}

pub(crate) fn write_nil(dst: &mut BytesMut) {
    dst.put_u8(table::NIL);
}

pub(crate) fn write_bool(dst: &mut BytesMut, b: bool) {
    dst.put_u8(if b { table::TRUE } else { table::FALSE });
}

pub(crate) fn write_uint(dst: &mut BytesMut, n: u64) {
    if n <= POS_FIXINT_MAX {
        dst.put_u8(n as u8);
    } else if n <= u64::from(u8::MAX) {
        dst.put_u8(table::UINT_8);
        dst.put_u8(n as u8);
    } else if n <= u64::from(u16::MAX) {
        dst.put_u8(table::UINT_16);
        dst.put_u16(n as u16);
    } else if n <= u64::from(u32::MAX) {
        dst.put_u8(table::UINT_32);
        dst.put_u32(n as u32);
    } else {
        dst.put_u8(table::UINT_64);
        dst.put_u64(n);
    }
}

pub(crate) fn write_int(dst: &mut BytesMut, n: i64) {
    if n >= 0 {
        write_uint(dst, n as u64);
    } else if n >= NEG_FIXINT_MIN {
        dst.put_i8(n as i8);
    } else if n >= i64::from(i8::MIN) {
        dst.put_u8(table::INT_8);
        dst.put_i8(n as i8);
    } else if n >= i64::from(i16::MIN) {
        dst.put_u8(table::INT_16);
        dst.put_i16(n as i16);
    } else if n >= i64::from(i32::MIN) {
        dst.put_u8(table::INT_32);
        dst.put_i32(n as i32);
    } else {
        dst.put_u8(table::INT_64);
        dst.put_i64(n);
    }
}

pub(crate) fn write_str(dst: &mut BytesMut, bytes: &[u8]) -> Result<()> {
    let len = bytes.len();
    if len <= FIXSTR_MAX {
        dst.put_u8(table::FIXSTR | len as u8);
    } else if len <= usize::from(u8::MAX) {
        dst.put_u8(table::STR_8);
        dst.put_u8(len as u8);
    } else if len <= usize::from(u16::MAX) {
        dst.put_u8(table::STR_16);
        dst.put_u16(len as u16);
    } else {
        dst.put_u8(table::STR_32);
        dst.put_u32(wire_len(len)?);
    }
    dst.put_slice(bytes);
    Ok(())
}

pub(crate) fn write_array_header(dst: &mut BytesMut, len: usize) -> Result<()> {
    write_container_header(dst, len, table::FIXARRAY, table::ARRAY_16, table::ARRAY_32)
}

/// `len` counts pairs, not elements.
pub(crate) fn write_map_header(dst: &mut BytesMut, len: usize) -> Result<()> {
    write_container_header(dst, len, table::FIXMAP, table::MAP_16, table::MAP_32)
}

fn write_container_header(dst: &mut BytesMut, len: usize, fix: u8, tag16: u8, tag32: u8) -> Result<()> {
    if len <= FIXCONTAINER_MAX {
        dst.put_u8(fix | len as u8);
    } else if len <= usize::from(u16::MAX) {
        dst.put_u8(tag16);
        dst.put_u16(len as u16);
    } else {
        dst.put_u8(tag32);
        dst.put_u32(wire_len(len)?);
    }
    Ok(())
}

/// Extension handles are written as a msgpack unsigned integer inside the
/// ext payload, the way the host encodes its own handles.
pub(crate) fn write_ext(dst: &mut BytesMut, ext: Ext) {
    let mut payload = BytesMut::with_capacity(5);
    write_uint(&mut payload, u64::from(ext.num));
    match payload.len() {
        1 => dst.put_u8(table::FIXEXT_1),
        2 => dst.put_u8(table::FIXEXT_2),
        len => {
            dst.put_u8(table::EXT_8);
            dst.put_u8(len as u8);
        }
    }
    dst.put_i8(ext.kind);
    dst.put_slice(&payload);
}

fn wire_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| CodecError::PayloadTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(value: &Value) -> Vec<u8> {
        encode(value).unwrap().to_vec()
    }

    #[test]
    fn unsigned_families() {
        assert_eq!(bytes_of(&Value::UInt(0)), [0x00]);
        assert_eq!(bytes_of(&Value::UInt(127)), [0x7F]);
        assert_eq!(bytes_of(&Value::UInt(128)), [0xCC, 0x80]);
        assert_eq!(bytes_of(&Value::UInt(256)), [0xCD, 0x01, 0x00]);
        assert_eq!(bytes_of(&Value::UInt(65_536)), [0xCE, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(bytes_of(&Value::UInt(u64::MAX))[0], 0xCF);
    }

    #[test]
    fn signed_families() {
        assert_eq!(bytes_of(&Value::Int(5)), [0x05]);
        assert_eq!(bytes_of(&Value::Int(-1)), [0xFF]);
        assert_eq!(bytes_of(&Value::Int(-32)), [0xE0]);
        assert_eq!(bytes_of(&Value::Int(-33)), [0xD0, 0xDF]);
        assert_eq!(bytes_of(&Value::Int(-129)), [0xD1, 0xFF, 0x7F]);
        assert_eq!(bytes_of(&Value::Int(-40_000))[0], 0xD2);
        assert_eq!(bytes_of(&Value::Int(i64::MIN))[0], 0xD3);
    }

    #[test]
    fn string_length_picks_smallest_family() {
        for (len, lead) in [
            (0usize, 0xA0u8),
            (31, 0xBF),
            (32, 0xD9),
            (255, 0xD9),
            (256, 0xDA),
            (65_535, 0xDA),
            (65_536, 0xDB),
        ] {
            let bytes = bytes_of(&Value::str(vec![b'x'; len]));
            assert_eq!(bytes[0], lead, "length {len}");
        }
    }

    #[test]
    fn container_headers() {
        let small = Value::Array(vec![Value::Nil; 15]);
        assert_eq!(bytes_of(&small)[0], 0x9F);
        let medium = Value::Array(vec![Value::Nil; 16]);
        assert_eq!(&bytes_of(&medium)[..3], [0xDC, 0x00, 0x10]);
        let map = Value::Map(vec![(Value::Int(1), Value::Bool(false))]);
        assert_eq!(bytes_of(&map), [0x81, 0x01, 0xC2]);
    }

    #[test]
    fn ext_handles_are_nested_uints() {
        assert_eq!(bytes_of(&Value::Ext(Ext::new(0, 5))), [0xD4, 0x00, 0x05]);
        assert_eq!(bytes_of(&Value::Ext(Ext::new(1, 200))), [0xD5, 0x01, 0xCC, 0xC8]);
        assert_eq!(
            bytes_of(&Value::Ext(Ext::new(2, 1000))),
            [0xC7, 0x03, 0x02, 0xCD, 0x03, 0xE8]
        );
    }
}
