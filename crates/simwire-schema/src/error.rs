//! Schema parsing and wire decoding errors.

use thiserror::Error;

/// Errors raised while parsing schema text into descriptors.
///
/// These occur once, during the handshake, and are fatal for the connection
/// attempt — a registry that failed to build cannot decode anything.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The tokenizer hit a character it cannot form a token from.
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar {
        /// The offending character.
        found: char,
        /// Byte offset into the schema text.
        offset: usize,
    },

    /// An unterminated string literal or block comment.
    #[error("unterminated {what} starting at offset {offset}")]
    Unterminated {
        /// What was left open ("string" or "comment").
        what: &'static str,
        /// Byte offset where it started.
        offset: usize,
    },

    /// The parser expected one token and found another.
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        /// What the grammar required.
        expected: String,
        /// What the tokenizer produced.
        found: String,
    },

    /// The schema text ended in the middle of a declaration.
    #[error("unexpected end of schema text while parsing {context}")]
    UnexpectedEof {
        /// The declaration being parsed.
        context: &'static str,
    },

    /// A field number or enum value did not fit its range.
    #[error("invalid number {value} for {context}")]
    InvalidNumber {
        /// The out-of-range value.
        value: i64,
        /// Where it appeared.
        context: &'static str,
    },
}

/// Errors raised while decoding a single message payload.
///
/// Decode errors are per-frame: the frame is dropped and logged, the
/// connection stays up.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The requested type is not present in the registry.
    #[error("unknown message type '{type_name}'")]
    UnknownType {
        /// The fully-qualified name that missed.
        type_name: String,
    },

    /// The payload ended before a value was complete.
    #[error("truncated payload while reading {context}")]
    Truncated {
        /// What was being read.
        context: &'static str,
    },

    /// A varint ran past its maximum width.
    #[error("varint exceeds 10 bytes")]
    VarintOverflow,

    /// A field was encoded with a wire type its schema type cannot accept.
    #[error("wire type {wire_type} is invalid for field '{field}'")]
    WireType {
        /// The wire type found on the tag.
        wire_type: u8,
        /// The field being decoded.
        field: String,
    },

    /// Deprecated group encoding, which this decoder does not support.
    #[error("unsupported group encoding (wire type {wire_type})")]
    UnsupportedGroup {
        /// The group wire type encountered (3 or 4).
        wire_type: u8,
    },

    /// Message nesting exceeded the recursion limit.
    #[error("message nesting exceeds {limit} levels")]
    RecursionLimit {
        /// The configured limit.
        limit: usize,
    },
}
