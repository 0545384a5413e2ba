//! Error types for wire encoding and decoding.

use std::fmt;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, DecodeError>;

/// Errors that can occur while decoding a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// BSATN-level error (truncation, invalid UTF-8, bad bool byte).
    Sats(sats::DecodeError),

    /// Unknown top-level message tag.
    UnknownMessageTag { tag: u8 },

    /// Unknown reducer status tag.
    UnknownStatusTag { tag: u8 },

    /// Unknown option tag (must be 0 or 1).
    UnknownOptionTag { tag: u8 },

    /// A count or length exceeds the configured limits.
    LimitsExceeded {
        kind: LimitKind,
        limit: usize,
        actual: usize,
    },

    /// Bytes were left over after a complete message.
    TrailingBytes { remaining: usize },
}

/// Errors that can occur while encoding a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// BSATN-level error (a length too long for its `u32` prefix).
    Sats(sats::EncodeError),
}

/// Specific limit that was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    MessageBytes,
    Queries,
    TablesPerUpdate,
    RowsPerTable,
    RowBytes,
    StringBytes,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sats(e) => write!(f, "bsatn error: {e}"),
            Self::UnknownMessageTag { tag } => write!(f, "unknown message tag {tag}"),
            Self::UnknownStatusTag { tag } => write!(f, "unknown status tag {tag}"),
            Self::UnknownOptionTag { tag } => write!(f, "unknown option tag {tag}"),
            Self::LimitsExceeded {
                kind,
                limit,
                actual,
            } => write!(f, "{kind} limit exceeded: {actual} > {limit}"),
            Self::TrailingBytes { remaining } => {
                write!(f, "{remaining} trailing bytes after message")
            }
        }
    }
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sats(e) => write!(f, "bsatn error: {e}"),
        }
    }
}

impl fmt::Display for LimitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MessageBytes => "message bytes",
            Self::Queries => "queries",
            Self::TablesPerUpdate => "tables per update",
            Self::RowsPerTable => "rows per table",
            Self::RowBytes => "row bytes",
            Self::StringBytes => "string bytes",
        };
        write!(f, "{name}")
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sats(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sats(e) => Some(e),
        }
    }
}

impl From<sats::DecodeError> for DecodeError {
    fn from(err: sats::DecodeError) -> Self {
        Self::Sats(err)
    }
}

impl From<sats::EncodeError> for EncodeError {
    fn from(err: sats::EncodeError) -> Self {
        Self::Sats(err)
    }
}
