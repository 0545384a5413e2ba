//! Error types for BSATN encoding and decoding.

use std::fmt;

/// Result type for encoding operations.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Result type for decoding operations.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Errors that can occur while encoding a value against a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// The value's shape does not match the type.
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A sum value's tag is outside the type's variant range.
    TagOutOfRange { tag: u8, variants: usize },

    /// A product value has the wrong number of fields.
    ArityMismatch { expected: usize, actual: usize },

    /// A string, array, or map is too long for a `u32` length prefix.
    LengthOverflow { len: usize },

    /// A sum value's payload presence disagrees with the variant's type.
    ///
    /// Unit variants carry no payload; every other variant carries one.
    PayloadMismatch { tag: u8 },
}

/// Errors that can occur while decoding bytes against a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer ended before the value was complete.
    UnexpectedEof { requested: usize, available: usize },

    /// A sum tag is outside the type's variant range.
    TagOutOfRange { tag: u8, variants: usize },

    /// A boolean byte was neither 0 nor 1.
    InvalidBool { found: u8 },

    /// A string's bytes were not valid UTF-8.
    InvalidUtf8,

    /// Bytes were left over after decoding a complete top-level value.
    TrailingBytes { remaining: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Self::TagOutOfRange { tag, variants } => {
                write!(f, "sum tag {tag} out of range for {variants} variants")
            }
            Self::ArityMismatch { expected, actual } => {
                write!(f, "product arity mismatch: expected {expected} fields, got {actual}")
            }
            Self::LengthOverflow { len } => {
                write!(f, "length {len} exceeds u32 prefix range")
            }
            Self::PayloadMismatch { tag } => {
                write!(f, "payload presence does not match variant {tag}")
            }
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof {
                requested,
                available,
            } => {
                write!(f, "unexpected eof: requested {requested} bytes, {available} available")
            }
            Self::TagOutOfRange { tag, variants } => {
                write!(f, "sum tag {tag} out of range for {variants} variants")
            }
            Self::InvalidBool { found } => {
                write!(f, "invalid bool byte {found}")
            }
            Self::InvalidUtf8 => write!(f, "string bytes are not valid UTF-8"),
            Self::TrailingBytes { remaining } => {
                write!(f, "{remaining} trailing bytes after top-level value")
            }
        }
    }
}

impl std::error::Error for EncodeError {}
impl std::error::Error for DecodeError {}
