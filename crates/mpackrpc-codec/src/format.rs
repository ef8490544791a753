//! Format-string driven encoding.
//!
//! A format string describes the shape of one value; arguments supply its
//! scalars:
//!
//! | code | meaning                                          |
//! |------|--------------------------------------------------|
//! | `d` `l` | signed integer                                |
//! | `u`  | unsigned integer                                 |
//! | `b`  | boolean                                          |
//! | `s` `c` | string                                        |
//! | `n`  | nil, consumes no argument                        |
//! | `[` `]` | array                                         |
//! | `{` `}` | dictionary, even number of elements           |
//! | `!`  | take further arguments from the next argument, an [`Arg::Forward`] |
//! | `@`  | take further arguments from the records of the next argument, an [`Arg::Batch`] |
//! | `*`  | move to the next batch record                    |
//!
//! Codes are case-insensitive; `;` `:` `.` `,` and spaces are ignored.
//!
//! ```
//! use mpackrpc_codec::{encode_fmt, Value};
//!
//! let encoded = encode_fmt(0, "[ddd]", &[1.into(), 2.into(), 3.into()]).unwrap();
//! assert_eq!(encoded.value, Value::Array(vec![1.into(), 2.into(), 3.into()]));
//! assert_eq!(encoded.packed[0], 0x93);
//! ```

use bytes::{Bytes, BytesMut};

use crate::encode::{
    write_array_header, write_bool, write_int, write_map_header, write_nil, write_str,
    write_uint,
};
use crate::error::FormatError;
use crate::value::Value;

const BASE_CAPACITY: usize = 128;
/// Upper bound on the pre-sized output buffer; it grows past this as needed.
const MAX_PRESIZE: usize = 1 << 20;

/// One argument consumed by a format code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arg<'a> {
    Int(i64),
    UInt(u64),
    Bool(bool),
    Str(&'a [u8]),
    Nil,
    /// Argument list handed through by a wrapper (`!`).
    Forward(&'a [Arg<'a>]),
    /// Argument records of a batch (`@`, `*`).
    Batch(&'a [Vec<Arg<'a>>]),
}

macro_rules! arg_from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for Arg<'_> {
            fn from(n: $t) -> Self {
                Arg::Int(i64::from(n))
            }
        }
    )*};
}

macro_rules! arg_from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for Arg<'_> {
            fn from(n: $t) -> Self {
                Arg::UInt(u64::from(n))
            }
        }
    )*};
}

arg_from_signed!(i8, i16, i32, i64);
arg_from_unsigned!(u8, u16, u32, u64);

impl From<bool> for Arg<'_> {
    fn from(b: bool) -> Self {
        Arg::Bool(b)
    }
}

impl<'a> From<&'a str> for Arg<'a> {
    fn from(s: &'a str) -> Self {
        Arg::Str(s.as_bytes())
    }
}

impl<'a> From<&'a [u8]> for Arg<'a> {
    fn from(s: &'a [u8]) -> Self {
        Arg::Str(s)
    }
}

impl<'a> From<&'a String> for Arg<'a> {
    fn from(s: &'a String) -> Self {
        Arg::Str(s.as_bytes())
    }
}

impl<'a> From<&'a Bytes> for Arg<'a> {
    fn from(s: &'a Bytes) -> Self {
        Arg::Str(s.as_ref())
    }
}

/// A value together with its packed bytes, ready to be written as is.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub value: Value,
    pub packed: Bytes,
}

/// Several calls sent as one `nvim_call_atomic` request.
///
/// Each call contributes its own format (usually `s[...]`: method name and
/// parameters) and its own argument record, so calls of different shapes
/// can share a batch.
#[derive(Debug, Default, Clone)]
pub struct AtomicCallBatch<'a> {
    formats: Vec<String>,
    records: Vec<Vec<Arg<'a>>>,
}

impl<'a> AtomicCallBatch<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a call described by `fmt` with its own arguments.
    pub fn push(&mut self, fmt: impl Into<String>, args: Vec<Arg<'a>>) -> &mut Self {
        self.formats.push(fmt.into());
        self.records.push(args);
        self
    }

    /// Append `method(params...)`, where `params_fmt` describes the elements
    /// of the parameter array.
    pub fn push_call(&mut self, method: &'a str, params_fmt: &str, params: &[Arg<'a>]) -> &mut Self {
        let mut args = Vec::with_capacity(params.len() + 1);
        args.push(Arg::from(method));
        args.extend_from_slice(params);
        self.push(format!("s[{params_fmt}]"), args)
    }

    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    /// Format of the array holding every call, to be encoded with
    /// [`Arg::Batch`] over [`records`](Self::records) as its next argument.
    pub fn format(&self) -> String {
        let mut fmt = String::from("[");
        for (i, call) in self.formats.iter().enumerate() {
            let control = if i == 0 { '@' } else { '*' };
            fmt.push_str(&format!(" [{control}{call}],"));
        }
        fmt.push_str(" ]");
        fmt
    }

    pub fn records(&self) -> &[Vec<Arg<'a>>] {
        &self.records
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Array,
    Dict,
}

/// Encode the value described by `fmt`.
///
/// `size_hint` only pre-sizes the output buffer. Arguments left over after
/// the format is exhausted are ignored.
pub fn encode_fmt(size_hint: usize, fmt: &str, args: &[Arg<'_>]) -> Result<Encoded, FormatError> {
    let counts = count_elements(fmt)?;
    let mut emitter = Emitter {
        counts: &counts[1..],
        next_count: 0,
        source: Source::Args { args, next: 0 },
        packed: BytesMut::with_capacity(presize(size_hint)),
        open: Vec::new(),
        root: None,
    };

    for (position, ch) in fmt.char_indices() {
        emitter.step(position, ch)?;
    }

    let value = emitter.root.ok_or(FormatError::Empty)?;
    Ok(Encoded {
        value,
        packed: emitter.packed.freeze(),
    })
}

fn presize(size_hint: usize) -> usize {
    BASE_CAPACITY
        .saturating_add(size_hint.saturating_mul(64))
        .min(MAX_PRESIZE)
}

/// First pass: the element count of the top level, then of every container
/// in order of its opening bracket. No arguments are touched.
fn count_elements(fmt: &str) -> Result<Vec<usize>, FormatError> {
    let mut counts = vec![0usize];
    // (index into counts, kind) of each open container
    let mut stack: Vec<(usize, Container)> = Vec::new();
    let mut current = 0usize;

    for (position, ch) in fmt.char_indices() {
        match ch.to_ascii_lowercase() {
            'd' | 'l' | 'u' | 'b' | 's' | 'c' | 'n' => counts[current] += 1,
            open @ ('[' | '{') => {
                counts[current] += 1;
                stack.push((current, kind_of(open)));
                counts.push(0);
                current = counts.len() - 1;
            }
            close @ (']' | '}') => {
                let Some((parent, kind)) = stack.pop() else {
                    return Err(FormatError::Unbalanced { position });
                };
                if kind != kind_of(close) {
                    return Err(FormatError::Unbalanced { position });
                }
                if kind == Container::Dict && counts[current] % 2 != 0 {
                    return Err(FormatError::OddDictionary { position });
                }
                current = parent;
            }
            ';' | ':' | '.' | ' ' | ',' | '!' | '@' | '*' => {}
            _ => return Err(FormatError::UnknownCode { code: ch, position }),
        }
    }

    if !stack.is_empty() {
        return Err(FormatError::Unbalanced { position: fmt.len() });
    }
    match counts[0] {
        0 => Err(FormatError::Empty),
        1 => Ok(counts),
        count => Err(FormatError::MultipleTopLevel { count }),
    }
}

fn kind_of(bracket: char) -> Container {
    match bracket {
        '{' | '}' => Container::Dict,
        _ => Container::Array,
    }
}

enum Source<'s, 'a: 's> {
    Args { args: &'s [Arg<'a>], next: usize },
    Batch { records: &'a [Vec<Arg<'a>>], record: usize, next: usize },
}

impl<'s, 'a: 's> Source<'s, 'a> {
    fn next(&mut self) -> Option<Arg<'a>> {
        match self {
            Source::Args { args, next } => {
                let arg = args.get(*next).copied();
                *next += 1;
                arg
            }
            Source::Batch {
                records,
                record,
                next,
            } => {
                let arg = records.get(*record)?.get(*next).copied();
                *next += 1;
                arg
            }
        }
    }
}

/// An open container being filled in the second pass.
enum Open {
    Array(Vec<Value>),
    Dict {
        entries: Vec<(Value, Value)>,
        key: Option<Value>,
    },
}

struct Emitter<'s, 'a: 's> {
    counts: &'s [usize],
    next_count: usize,
    source: Source<'s, 'a>,
    packed: BytesMut,
    open: Vec<Open>,
    root: Option<Value>,
}

impl<'s, 'a: 's> Emitter<'s, 'a> {
    fn step(&mut self, position: usize, ch: char) -> Result<(), FormatError> {
        let code = ch.to_ascii_lowercase();
        match code {
            'd' | 'l' => {
                let n = match self.arg(code, position)? {
                    Arg::Int(n) => n,
                    Arg::UInt(n) => i64::try_from(n).map_err(|_| mismatch(code, position))?,
                    _ => return Err(mismatch(code, position)),
                };
                write_int(&mut self.packed, n);
                self.push(Value::Int(n));
            }
            'u' => {
                let n = match self.arg(code, position)? {
                    Arg::UInt(n) => n,
                    Arg::Int(n) => u64::try_from(n).map_err(|_| mismatch(code, position))?,
                    _ => return Err(mismatch(code, position)),
                };
                write_uint(&mut self.packed, n);
                self.push(Value::UInt(n));
            }
            'b' => {
                let b = match self.arg(code, position)? {
                    Arg::Bool(b) => b,
                    Arg::Int(n) => n != 0,
                    Arg::UInt(n) => n != 0,
                    _ => return Err(mismatch(code, position)),
                };
                write_bool(&mut self.packed, b);
                self.push(Value::Bool(b));
            }
            's' | 'c' => {
                let Arg::Str(s) = self.arg(code, position)? else {
                    return Err(mismatch(code, position));
                };
                write_str(&mut self.packed, s).map_err(|_| mismatch(code, position))?;
                self.push(Value::str(s));
            }
            'n' => {
                write_nil(&mut self.packed);
                self.push(Value::Nil);
            }
            '[' => {
                let count = self.take_count();
                write_array_header(&mut self.packed, count).map_err(|_| mismatch(code, position))?;
                self.open.push(Open::Array(Vec::with_capacity(count)));
            }
            '{' => {
                let pairs = self.take_count() / 2;
                write_map_header(&mut self.packed, pairs).map_err(|_| mismatch(code, position))?;
                self.open.push(Open::Dict {
                    entries: Vec::with_capacity(pairs),
                    key: None,
                });
            }
            ']' | '}' => {
                let value = match self.open.pop() {
                    Some(Open::Array(items)) => Value::Array(items),
                    Some(Open::Dict { entries, .. }) => Value::Map(entries),
                    None => return Err(FormatError::Unbalanced { position }),
                };
                self.push(value);
            }
            '!' if matches!(self.source, Source::Batch { .. }) => {
                return Err(FormatError::ForwardInBatch { position });
            }
            '!' => match self.arg(code, position)? {
                Arg::Forward(args) => self.source = Source::Args { args, next: 0 },
                _ => return Err(mismatch_expected(code, position, "a forwarded argument list")),
            },
            '@' => match self.arg(code, position)? {
                Arg::Batch(records) if !records.is_empty() => {
                    self.source = Source::Batch {
                        records,
                        record: 0,
                        next: 0,
                    }
                }
                Arg::Batch(_) => return Err(FormatError::BatchExhausted { position }),
                _ => return Err(mismatch_expected(code, position, "a batch of argument records")),
            },
            '*' => match &mut self.source {
                Source::Batch {
                    records,
                    record,
                    next,
                } => {
                    *record += 1;
                    *next = 0;
                    if *record >= records.len() {
                        return Err(FormatError::BatchExhausted { position });
                    }
                }
                Source::Args { .. } => return Err(FormatError::ControlOutsideBatch { position }),
            },
            _ => {}
        }
        Ok(())
    }

    fn arg(&mut self, code: char, position: usize) -> Result<Arg<'a>, FormatError> {
        self.source
            .next()
            .ok_or(FormatError::MissingArgument { code, position })
    }

    fn take_count(&mut self) -> usize {
        let count = self.counts.get(self.next_count).copied().unwrap_or(0);
        self.next_count += 1;
        count
    }

    /// Attach a finished value to the innermost open container.
    fn push(&mut self, value: Value) {
        match self.open.last_mut() {
            Some(Open::Array(items)) => items.push(value),
            Some(Open::Dict { entries, key }) => match key.take() {
                Some(k) => entries.push((k, value)),
                None => *key = Some(value),
            },
            None => self.root = Some(value),
        }
    }
}

fn mismatch(code: char, position: usize) -> FormatError {
    let expected = match code {
        'd' | 'l' => "a signed integer",
        'u' => "an unsigned integer",
        'b' => "a boolean",
        's' | 'c' => "a string",
        _ => "a container header",
    };
    mismatch_expected(code, position, expected)
}

fn mismatch_expected(code: char, position: usize, expected: &'static str) -> FormatError {
    FormatError::ArgumentMismatch {
        code,
        expected,
        position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_slice;

    fn assert_packed_matches(encoded: &Encoded) {
        let (decoded, used) = decode_slice(&encoded.packed).unwrap();
        assert_eq!(used, encoded.packed.len());
        assert_eq!(decoded, encoded.value);
    }

    #[test]
    fn array_of_three_ints() {
        let encoded = encode_fmt(0, "[ddd]", &[1.into(), 2.into(), 3.into()]).unwrap();
        assert_eq!(
            encoded.value,
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert_eq!(encoded.packed.as_ref(), [0x93, 0x01, 0x02, 0x03]);
    }

    #[test]
    fn codes_are_case_insensitive_and_separators_ignored() {
        let args = [Arg::from(-5i64), Arg::from(7u32), Arg::from(true), Arg::from("x")];
        let lower = encode_fmt(0, "[l, u; b: s]", &args).unwrap();
        let upper = encode_fmt(0, "[L.U B,S]", &args).unwrap();
        assert_eq!(lower, upper);
        assert_packed_matches(&lower);
    }

    #[test]
    fn dictionary_pairs_consecutive_pushes() {
        let encoded = encode_fmt(
            0,
            "{s:d, s:[n], c:{}}",
            &["a".into(), 1.into(), "b".into(), "c".into()],
        )
        .unwrap();
        assert_eq!(
            encoded.value,
            Value::Map(vec![
                (Value::str("a"), Value::Int(1)),
                (Value::str("b"), Value::Array(vec![Value::Nil])),
                (Value::str("c"), Value::Map(vec![])),
            ])
        );
        assert_eq!(encoded.packed[0], 0x83);
        assert_packed_matches(&encoded);
    }

    #[test]
    fn request_envelope_with_forwarded_arguments() {
        let params = [Arg::from("echo 'hi'"), Arg::from(false)];
        let encoded = encode_fmt(
            0,
            "[d,d,s:[!sb]]",
            &[0.into(), 42.into(), "nvim_exec".into(), Arg::Forward(&params)],
        )
        .unwrap();
        assert_eq!(
            encoded.value,
            Value::Array(vec![
                Value::Int(0),
                Value::Int(42),
                Value::str("nvim_exec"),
                Value::Array(vec![Value::str("echo 'hi'"), Value::Bool(false)]),
            ])
        );
        assert_packed_matches(&encoded);
    }

    #[test]
    fn batch_of_two_calls() {
        let mut batch = AtomicCallBatch::new();
        batch.push("s[d]", vec!["nvim_buf_line_count".into(), 1.into()]);
        batch.push("s[d]", vec!["nvim_buf_get_name".into(), 2.into()]);
        assert_eq!(batch.len(), 2);

        let fmt = batch.format();
        let encoded = encode_fmt(batch.len(), &fmt, &[Arg::Batch(batch.records())]).unwrap();
        assert_eq!(
            encoded.value,
            Value::Array(vec![
                Value::Array(vec![
                    Value::str("nvim_buf_line_count"),
                    Value::Array(vec![Value::Int(1)]),
                ]),
                Value::Array(vec![
                    Value::str("nvim_buf_get_name"),
                    Value::Array(vec![Value::Int(2)]),
                ]),
            ])
        );
        assert_packed_matches(&encoded);
    }

    #[test]
    fn batch_calls_have_independent_shapes() {
        let mut batch = AtomicCallBatch::new();
        batch.push_call("nvim_get_current_buf", "", &[]);
        batch.push_call(
            "nvim_buf_add_highlight",
            "d,d,s,d,d,d",
            &[0.into(), (-1).into(), "Identifier".into(), 3.into(), 0.into(), (-1).into()],
        );
        batch.push_call("nvim_command", "s", &["redraw".into()]);

        let encoded =
            encode_fmt(batch.len(), &batch.format(), &[Arg::Batch(batch.records())]).unwrap();
        let calls = encoded.value.as_array().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].index(1).and_then(Value::as_array).map(<[_]>::len), Some(0));
        assert_eq!(calls[1].index(1).and_then(Value::as_array).map(<[_]>::len), Some(6));
        assert_eq!(calls[2].index(0).and_then(Value::as_str), Some("nvim_command"));
        assert_packed_matches(&encoded);
    }

    #[test]
    fn empty_batch_encodes_empty_array() {
        let batch = AtomicCallBatch::new();
        assert!(batch.is_empty());
        let encoded = encode_fmt(0, &batch.format(), &[]).unwrap();
        assert_eq!(encoded.value, Value::Array(vec![]));
        assert_eq!(encoded.packed.as_ref(), [0x90]);
    }

    #[test]
    fn structural_errors() {
        assert_eq!(encode_fmt(0, "", &[]), Err(FormatError::Empty));
        assert_eq!(encode_fmt(0, " ,; ", &[]), Err(FormatError::Empty));
        assert_eq!(
            encode_fmt(0, "[d", &[1.into()]),
            Err(FormatError::Unbalanced { position: 2 })
        );
        assert_eq!(
            encode_fmt(0, "d]", &[1.into()]),
            Err(FormatError::Unbalanced { position: 1 })
        );
        assert_eq!(encode_fmt(0, "[}", &[]), Err(FormatError::Unbalanced { position: 1 }));
        assert_eq!(
            encode_fmt(0, "{sds}", &["a".into(), 1.into(), "b".into()]),
            Err(FormatError::OddDictionary { position: 4 })
        );
        assert_eq!(
            encode_fmt(0, "[x]", &[]),
            Err(FormatError::UnknownCode {
                code: 'x',
                position: 1
            })
        );
        assert_eq!(
            encode_fmt(0, "dd", &[1.into(), 2.into()]),
            Err(FormatError::MultipleTopLevel { count: 2 })
        );
    }

    #[test]
    fn argument_errors() {
        assert_eq!(
            encode_fmt(0, "[dd]", &[1.into()]),
            Err(FormatError::MissingArgument {
                code: 'd',
                position: 2
            })
        );
        assert!(matches!(
            encode_fmt(0, "[s]", &[1.into()]),
            Err(FormatError::ArgumentMismatch { code: 's', .. })
        ));
        assert!(matches!(
            encode_fmt(0, "[u]", &[(-1).into()]),
            Err(FormatError::ArgumentMismatch { code: 'u', .. })
        ));
        assert!(matches!(
            encode_fmt(0, "[!d]", &[1.into()]),
            Err(FormatError::ArgumentMismatch { code: '!', .. })
        ));
        assert_eq!(
            encode_fmt(0, "[*d]", &[1.into()]),
            Err(FormatError::ControlOutsideBatch { position: 1 })
        );

        let records = vec![vec![Arg::from(1)]];
        assert_eq!(
            encode_fmt(0, "[[@d],[*d]]", &[Arg::Batch(&records)]),
            Err(FormatError::BatchExhausted { position: 7 })
        );
    }

    #[test]
    fn forward_inside_batch_record_is_rejected() {
        let inner = [Arg::from(2)];
        let records = vec![vec![Arg::Forward(&inner)], vec![Arg::from(3)]];
        assert_eq!(
            encode_fmt(0, "[@[!d]*[d]]", &[Arg::Batch(&records)]),
            Err(FormatError::ForwardInBatch { position: 3 })
        );
    }

    #[test]
    fn huge_size_hint_is_capped() {
        assert_eq!(presize(0), BASE_CAPACITY);
        assert_eq!(presize(usize::MAX / 2), MAX_PRESIZE);
        let encoded = encode_fmt(usize::MAX, "n", &[]).unwrap();
        assert_eq!(encoded.value, Value::Nil);
    }

    #[test]
    fn nil_consumes_no_argument() {
        let encoded = encode_fmt(0, "[n,d,n]", &[9.into()]).unwrap();
        assert_eq!(
            encoded.value,
            Value::Array(vec![Value::Nil, Value::Int(9), Value::Nil])
        );
    }

    #[test]
    fn long_containers_use_wider_headers() {
        let fmt = format!("[{}]", "n".repeat(20));
        let encoded = encode_fmt(0, &fmt, &[]).unwrap();
        assert_eq!(&encoded.packed[..3], [0xDC, 0x00, 0x14]);
        assert_packed_matches(&encoded);
    }
}
