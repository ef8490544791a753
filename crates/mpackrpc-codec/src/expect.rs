use std::fmt;

use bytes::Bytes;
use tracing::warn;

use crate::release::Node;
use crate::value::{Ext, Value, ValueKind};

/// The kind a caller wants out of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectKind {
    Nil,
    /// A boolean; integers are accepted as C-style truth values.
    Bool,
    /// A signed number; extension handles are accepted as their handle.
    Num,
    String,
    Array,
    Dict,
    Ext,
    /// An array whose every element is a string.
    StrList,
}

impl fmt::Display for ExpectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExpectKind::Nil => "nil",
            ExpectKind::Bool => "bool",
            ExpectKind::Num => "number",
            ExpectKind::String => "string",
            ExpectKind::Array => "array",
            ExpectKind::Dict => "dictionary",
            ExpectKind::Ext => "ext",
            ExpectKind::StrList => "string list",
        };
        f.write_str(name)
    }
}

/// A typed result pulled out of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Nil,
    Bool(bool),
    Num(i64),
    String(Bytes),
    Array(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    Ext(Ext),
    StrList(Vec<Bytes>),
}

impl Extracted {
    pub fn as_num(&self) -> Option<i64> {
        match *self {
            Extracted::Num(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Extracted::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Extracted::String(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// String contents, with invalid UTF-8 replaced.
    pub fn into_string(self) -> Option<String> {
        self.into_bytes()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn into_array(self) -> Option<Vec<Value>> {
        match self {
            Extracted::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_dict(self) -> Option<Vec<(Value, Value)>> {
        match self {
            Extracted::Dict(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn into_str_list(self) -> Option<Vec<Bytes>> {
        match self {
            Extracted::StrList(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_ext(self) -> Option<Ext> {
        match self {
            Extracted::Ext(ext) => Some(ext),
            _ => None,
        }
    }
}

/// Pull a value of the wanted kind out of `node`.
///
/// An owned node is consumed: containers move into the result and everything
/// else is released. A borrowed node is left intact. A value of the wrong
/// kind is logged and yields `None`; it is never an error.
pub fn expect<'a>(node: impl Into<Node<'a>>, kind: ExpectKind) -> Option<Extracted> {
    let node = node.into();
    let found = node.as_value().kind();

    let extracted = match kind {
        ExpectKind::Array | ExpectKind::Dict => take_container(node, kind),
        _ => {
            let extracted = extract_scalar(node.as_value(), kind);
            node.release();
            extracted
        }
    };

    if extracted.is_none() {
        warn!(expected = %kind, found = %found, "unexpected value kind");
    }
    extracted
}

/// Look up `key` in a dictionary and extract its value.
pub fn expect_key(dict: &Value, key: &str, kind: ExpectKind) -> Option<Extracted> {
    match dict.get_str(key) {
        Some(value) => expect(value, kind),
        None => {
            if dict.kind() == ValueKind::Map {
                warn!(key, "dictionary has no such key");
            } else {
                warn!(key, found = %dict.kind(), "key lookup in a non-dictionary");
            }
            None
        }
    }
}

fn extract_scalar(value: &Value, kind: ExpectKind) -> Option<Extracted> {
    match (kind, value) {
        (ExpectKind::Nil, Value::Nil) => Some(Extracted::Nil),
        (ExpectKind::Bool, Value::Bool(b)) => Some(Extracted::Bool(*b)),
        (ExpectKind::Bool, Value::Int(n)) => Some(Extracted::Bool(*n != 0)),
        (ExpectKind::Bool, Value::UInt(n)) => Some(Extracted::Bool(*n != 0)),
        (ExpectKind::Num, Value::Int(n)) => Some(Extracted::Num(*n)),
        (ExpectKind::Num, Value::UInt(n)) => i64::try_from(*n).ok().map(Extracted::Num),
        (ExpectKind::Num, Value::Ext(ext)) => Some(Extracted::Num(i64::from(ext.num))),
        (ExpectKind::String, Value::Str(bytes)) => Some(Extracted::String(bytes.clone())),
        (ExpectKind::Ext, Value::Ext(ext)) => Some(Extracted::Ext(*ext)),
        (ExpectKind::StrList, Value::Array(items)) => items
            .iter()
            .map(|item| item.as_bytes().cloned())
            .collect::<Option<Vec<_>>>()
            .map(Extracted::StrList),
        _ => None,
    }
}

fn take_container(node: Node<'_>, kind: ExpectKind) -> Option<Extracted> {
    match (kind, node) {
        (ExpectKind::Array, Node::Owned(Value::Array(items))) => Some(Extracted::Array(items)),
        (ExpectKind::Array, Node::Borrowed(Value::Array(items))) => {
            Some(Extracted::Array(items.clone()))
        }
        (ExpectKind::Dict, Node::Owned(Value::Map(entries))) => Some(Extracted::Dict(entries)),
        (ExpectKind::Dict, Node::Borrowed(Value::Map(entries))) => {
            Some(Extracted::Dict(entries.clone()))
        }
        (_, node) => {
            node.release();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_coerces_to_number() {
        let value = Value::Ext(Ext::new(0, 5));
        assert_eq!(expect(&value, ExpectKind::Num), Some(Extracted::Num(5)));
        assert_eq!(
            expect(value, ExpectKind::Ext).and_then(Extracted::into_ext),
            Some(Ext::new(0, 5))
        );
    }

    #[test]
    fn string_is_not_a_number() {
        let value = Value::str("12");
        assert_eq!(expect(&value, ExpectKind::Num), None);
        // Borrowed input survives the failed extraction.
        assert_eq!(value.as_str(), Some("12"));
    }

    #[test]
    fn integers_coerce_to_bool() {
        assert_eq!(expect(Value::Int(0), ExpectKind::Bool), Some(Extracted::Bool(false)));
        assert_eq!(expect(Value::UInt(2), ExpectKind::Bool), Some(Extracted::Bool(true)));
        assert_eq!(expect(Value::str("true"), ExpectKind::Bool), None);
    }

    #[test]
    fn huge_unsigned_is_not_a_number() {
        assert_eq!(expect(Value::UInt(u64::MAX), ExpectKind::Num), None);
    }

    #[test]
    fn containers_move_out_of_owned_values() {
        let value = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        let items = expect(value, ExpectKind::Array).and_then(Extracted::into_array);
        assert_eq!(items.map(|v| v.len()), Some(2));

        let dict = Value::Map(vec![(Value::str("a"), Value::Nil)]);
        let entries = expect(&dict, ExpectKind::Dict).and_then(Extracted::into_dict);
        assert_eq!(entries.map(|v| v.len()), Some(1));
        assert!(expect(&dict, ExpectKind::Array).is_none());
    }

    #[test]
    fn string_lists() {
        let lines = Value::Array(vec![Value::str("one"), Value::str("two")]);
        let list = expect(&lines, ExpectKind::StrList)
            .and_then(Extracted::into_str_list)
            .unwrap();
        assert_eq!(list, vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]);

        let mixed = Value::Array(vec![Value::str("one"), Value::Int(2)]);
        assert!(expect(mixed, ExpectKind::StrList).is_none());
    }

    #[test]
    fn keyed_lookup() {
        let info = Value::Map(vec![
            (Value::str("name"), Value::str("mpackrpc")),
            (Value::str("version"), Value::Map(vec![(Value::str("major"), Value::UInt(0))])),
        ]);
        assert_eq!(
            expect_key(&info, "name", ExpectKind::String).and_then(Extracted::into_string),
            Some("mpackrpc".to_string())
        );
        assert!(expect_key(&info, "version", ExpectKind::Dict).is_some());
        assert!(expect_key(&info, "missing", ExpectKind::String).is_none());
        assert!(expect_key(&Value::Nil, "name", ExpectKind::String).is_none());
    }

    #[test]
    fn nil_extraction() {
        assert_eq!(expect(Value::Nil, ExpectKind::Nil), Some(Extracted::Nil));
        assert!(expect(Value::Int(0), ExpectKind::Nil).is_none());
    }
}
