//! The wire tag table.
//!
//! Every lead byte of a MessagePack value either names its type exactly
//! (`0xC0` is nil, `0xDA` is a string with a 16-bit length, ...) or belongs to
//! a fixed family that packs a small length or value into its low bits
//! (`0xA0..=0xBF` are strings of 0-31 bytes). [`TYPE_TABLE`] lists both kinds
//! in the order they are tried; [`identify`] resolves a lead byte against it.

use crate::error::{CodecError, Result};

/// Semantic group a wire tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    Nil,
    Bool,
    /// Signed integer with an explicit 1/2/4/8 byte payload.
    Int,
    /// Unsigned integer with an explicit 1/2/4/8 byte payload.
    UInt,
    /// 7-bit non-negative integer stored in the lead byte.
    PosFixInt,
    /// 5-bit negative integer stored in the lead byte.
    NegFixInt,
    Str,
    Array,
    Map,
    Ext,
    Bin,
}

/// Individual wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireTag {
    Nil,
    True,
    False,
    Str8,
    Str16,
    Str32,
    Array16,
    Array32,
    Map16,
    Map32,
    Bin8,
    Bin16,
    Bin32,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Ext8,
    Ext16,
    Ext32,
    FixExt1,
    FixExt2,
    FixExt4,
    FixExt8,
    FixExt16,
    FixStr,
    FixArray,
    FixMap,
    PosFixInt,
    NegFixInt,
}

pub const NIL: u8 = 0xC0;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;
pub const BIN_8: u8 = 0xC4;
pub const BIN_16: u8 = 0xC5;
pub const BIN_32: u8 = 0xC6;
pub const EXT_8: u8 = 0xC7;
pub const EXT_16: u8 = 0xC8;
pub const EXT_32: u8 = 0xC9;
pub const UINT_8: u8 = 0xCC;
pub const UINT_16: u8 = 0xCD;
pub const UINT_32: u8 = 0xCE;
pub const UINT_64: u8 = 0xCF;
pub const INT_8: u8 = 0xD0;
pub const INT_16: u8 = 0xD1;
pub const INT_32: u8 = 0xD2;
pub const INT_64: u8 = 0xD3;
pub const FIXEXT_1: u8 = 0xD4;
pub const FIXEXT_2: u8 = 0xD5;
pub const FIXEXT_4: u8 = 0xD6;
pub const FIXEXT_8: u8 = 0xD7;
pub const FIXEXT_16: u8 = 0xD8;
pub const STR_8: u8 = 0xD9;
pub const STR_16: u8 = 0xDA;
pub const STR_32: u8 = 0xDB;
pub const ARRAY_16: u8 = 0xDC;
pub const ARRAY_32: u8 = 0xDD;
pub const MAP_16: u8 = 0xDE;
pub const MAP_32: u8 = 0xDF;
pub const FIXSTR: u8 = 0xA0;
pub const FIXARRAY: u8 = 0x90;
pub const FIXMAP: u8 = 0x80;
pub const POS_FIXINT: u8 = 0x00;
pub const NEG_FIXINT: u8 = 0xE0;

/// Largest string length that fits a fixstr lead byte.
pub const FIXSTR_MAX: usize = 31;
/// Largest element count that fits a fixarray / fixmap lead byte.
pub const FIXCONTAINER_MAX: usize = 15;
/// Largest value that fits a positive fixint.
pub const POS_FIXINT_MAX: u64 = 127;
/// Smallest value that fits a negative fixint.
pub const NEG_FIXINT_MIN: i64 = -32;

/// One row of the tag table.
#[derive(Debug, PartialEq, Eq)]
pub struct TypeTableEntry {
    pub group: Group,
    pub tag: WireTag,
    /// `true` for families that store a payload in the low bits of the lead byte.
    pub fixed: bool,
    /// The exact lead byte, or the family prefix for fixed entries.
    pub value: u8,
    /// Number of low bits carrying the payload in fixed families.
    pub shift: u8,
    pub name: &'static str,
}

impl TypeTableEntry {
    const fn exact(group: Group, tag: WireTag, value: u8, name: &'static str) -> Self {
        Self {
            group,
            tag,
            fixed: false,
            value,
            shift: 0,
            name,
        }
    }

    const fn family(group: Group, tag: WireTag, value: u8, shift: u8, name: &'static str) -> Self {
        Self {
            group,
            tag,
            fixed: true,
            value,
            shift,
            name,
        }
    }

    /// Whether `lead` is claimed by this entry.
    pub fn matches(&self, lead: u8) -> bool {
        if self.fixed {
            (lead >> self.shift) == (self.value >> self.shift)
        } else {
            lead == self.value
        }
    }

    /// The payload bits of a fixed-family lead byte (0 for exact entries).
    pub fn payload(&self, lead: u8) -> u8 {
        if self.fixed {
            lead & !(0xFFu8 << self.shift)
        } else {
            0
        }
    }
}

/// All supported tags, in the order they are tried.
pub static TYPE_TABLE: [TypeTableEntry; 34] = [
    TypeTableEntry::exact(Group::Nil, WireTag::Nil, NIL, "nil"),
    TypeTableEntry::exact(Group::Bool, WireTag::True, TRUE, "true"),
    TypeTableEntry::exact(Group::Bool, WireTag::False, FALSE, "false"),
    TypeTableEntry::exact(Group::Str, WireTag::Str8, STR_8, "str8"),
    TypeTableEntry::exact(Group::Str, WireTag::Str16, STR_16, "str16"),
    TypeTableEntry::exact(Group::Str, WireTag::Str32, STR_32, "str32"),
    TypeTableEntry::exact(Group::Array, WireTag::Array16, ARRAY_16, "array16"),
    TypeTableEntry::exact(Group::Array, WireTag::Array32, ARRAY_32, "array32"),
    TypeTableEntry::exact(Group::Map, WireTag::Map16, MAP_16, "map16"),
    TypeTableEntry::exact(Group::Map, WireTag::Map32, MAP_32, "map32"),
    TypeTableEntry::exact(Group::Bin, WireTag::Bin8, BIN_8, "bin8"),
    TypeTableEntry::exact(Group::Bin, WireTag::Bin16, BIN_16, "bin16"),
    TypeTableEntry::exact(Group::Bin, WireTag::Bin32, BIN_32, "bin32"),
    TypeTableEntry::exact(Group::Int, WireTag::Int8, INT_8, "int8"),
    TypeTableEntry::exact(Group::Int, WireTag::Int16, INT_16, "int16"),
    TypeTableEntry::exact(Group::Int, WireTag::Int32, INT_32, "int32"),
    TypeTableEntry::exact(Group::Int, WireTag::Int64, INT_64, "int64"),
    TypeTableEntry::exact(Group::UInt, WireTag::UInt8, UINT_8, "uint8"),
    TypeTableEntry::exact(Group::UInt, WireTag::UInt16, UINT_16, "uint16"),
    TypeTableEntry::exact(Group::UInt, WireTag::UInt32, UINT_32, "uint32"),
    TypeTableEntry::exact(Group::UInt, WireTag::UInt64, UINT_64, "uint64"),
    TypeTableEntry::exact(Group::Ext, WireTag::Ext8, EXT_8, "ext8"),
    TypeTableEntry::exact(Group::Ext, WireTag::Ext16, EXT_16, "ext16"),
    TypeTableEntry::exact(Group::Ext, WireTag::Ext32, EXT_32, "ext32"),
    TypeTableEntry::exact(Group::Ext, WireTag::FixExt1, FIXEXT_1, "fixext1"),
    TypeTableEntry::exact(Group::Ext, WireTag::FixExt2, FIXEXT_2, "fixext2"),
    TypeTableEntry::exact(Group::Ext, WireTag::FixExt4, FIXEXT_4, "fixext4"),
    TypeTableEntry::exact(Group::Ext, WireTag::FixExt8, FIXEXT_8, "fixext8"),
    TypeTableEntry::exact(Group::Ext, WireTag::FixExt16, FIXEXT_16, "fixext16"),
    TypeTableEntry::family(Group::Str, WireTag::FixStr, FIXSTR, 5, "fixstr"),
    TypeTableEntry::family(Group::Array, WireTag::FixArray, FIXARRAY, 4, "fixarray"),
    TypeTableEntry::family(Group::Map, WireTag::FixMap, FIXMAP, 4, "fixmap"),
    TypeTableEntry::family(Group::PosFixInt, WireTag::PosFixInt, POS_FIXINT, 7, "positive fixint"),
    TypeTableEntry::family(Group::NegFixInt, WireTag::NegFixInt, NEG_FIXINT, 5, "negative fixint"),
];

/// Resolve a lead byte to its table entry.
///
/// Fails with [`CodecError::MalformedTag`] for bytes outside the supported
/// format family (`0xC1` and the float tags).
pub fn identify(lead: u8) -> Result<&'static TypeTableEntry> {
    TYPE_TABLE
        .iter()
        .find(|entry| entry.matches(lead))
        .ok_or(CodecError::MalformedTag(lead))
}
