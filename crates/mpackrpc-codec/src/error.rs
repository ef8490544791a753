/// Errors that can occur while decoding, encoding or moving messages.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A lead byte that no entry of the type table claims.
    #[error("malformed type tag 0x{0:02x}")]
    MalformedTag(u8),

    /// The input ended in the middle of a value.
    #[error("unexpected end of input inside a value")]
    UnexpectedEof,

    /// A well-formed value of a kind this codec does not handle.
    #[error("unsupported value: {0}")]
    Unsupported(&'static str),

    /// A length field or buffered message exceeds the configured maximum.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Containers nested deeper than the configured maximum.
    #[error("nesting depth exceeds {0}")]
    DepthExceeded(usize),

    /// An extension payload that does not hold a 32-bit handle.
    #[error("extension payload does not fit a 32-bit handle")]
    ExtOutOfRange,

    /// A structurally valid value that breaks the message envelope rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Misuse of the format-string encoder.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// An I/O error occurred while reading or writing messages.
    #[error("message I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream between two messages.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Misuse of the format mini-language.
///
/// `position` is the byte offset of the offending character in the format
/// string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("format string describes no value")]
    Empty,

    #[error("unbalanced container at offset {position}")]
    Unbalanced { position: usize },

    #[error("dictionary closed at offset {position} has an odd number of elements")]
    OddDictionary { position: usize },

    #[error("unknown format code {code:?} at offset {position}")]
    UnknownCode { code: char, position: usize },

    #[error("format string has {count} top-level values, wrap them in an array")]
    MultipleTopLevel { count: usize },

    #[error("no argument left for {code:?} at offset {position}")]
    MissingArgument { code: char, position: usize },

    #[error("argument for {code:?} at offset {position} is not {expected}")]
    ArgumentMismatch {
        code: char,
        expected: &'static str,
        position: usize,
    },

    #[error("'*' at offset {position} outside batched mode")]
    ControlOutsideBatch { position: usize },

    #[error("'*' at offset {position} ran past the last batch record")]
    BatchExhausted { position: usize },

    #[error("'!' at offset {position} inside a batch record")]
    ForwardInBatch { position: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;
