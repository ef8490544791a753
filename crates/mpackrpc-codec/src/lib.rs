//! MessagePack value model and codec for msgpack-RPC.
//!
//! - [`Value`]: the tagged union every message is built from
//! - [`table`]: the lead-byte type table
//! - [`decode_value`]: streaming decoder over a `BytesMut` read buffer
//! - [`encode`] and [`encode_fmt`]: tree encoder and format-string encoder,
//!   including batched `nvim_call_atomic` requests
//! - [`expect`]: typed extraction with narrow coercions
//! - [`destroy`]: non-recursive teardown of value trees
//! - [`MessageReader`] / [`MessageWriter`]: whole messages over blocking streams
//!
//! Floats, `bin` and timestamps are not supported.

#[cfg(feature = "async")]
pub mod codec;
pub mod decode;
pub mod encode;
pub mod error;
pub mod expect;
pub mod format;
pub mod reader;
pub mod release;
pub mod table;
pub mod value;
pub mod writer;

#[cfg(feature = "async")]
pub use codec::MpackCodec;
pub use decode::{
    decode_message, decode_slice, decode_value, ensure_message, CodecConfig, DEFAULT_MAX_DEPTH,
    DEFAULT_MAX_PAYLOAD,
};
pub use encode::{encode, encode_into};
pub use error::{CodecError, FormatError, Result};
pub use expect::{expect, expect_key, ExpectKind, Extracted};
pub use format::{encode_fmt, Arg, AtomicCallBatch, Encoded};
pub use reader::MessageReader;
pub use release::{destroy, Node};
pub use table::{identify, Group, TypeTableEntry, WireTag, TYPE_TABLE};
pub use value::{Ext, Value, ValueKind};
pub use writer::MessageWriter;
