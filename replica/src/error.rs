//! Error types for replica operations.

use std::fmt;

use wire::QueryId;

/// Errors detected while building a module schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Two tables share a name.
    DuplicateTable { name: Box<str> },

    /// Two reducers share a name.
    DuplicateReducer { name: Box<str> },

    /// A table's primary-key column index is out of range.
    PrimaryKeyOutOfRange { table: Box<str>, column: usize, columns: usize },
}

/// Errors detected while applying a database update to the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// The update names a table absent from the module schema.
    UnknownTable { name: Box<str> },

    /// A row payload failed to decode against the table's row type.
    RowDecode {
        table: Box<str>,
        source: sats::DecodeError,
    },
}

/// Errors from subscription lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The query id is not known to this connection.
    UnknownQuery { query_id: QueryId },

    /// Only an Active subscription can be unsubscribed.
    NotActive { query_id: QueryId },

    /// An unsubscribe for this subscription is already in flight.
    AlreadyUnsubscribing { query_id: QueryId },

    /// The all-tables subscription can never be unsubscribed.
    CannotUnsubscribeFromAll { query_id: QueryId },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateTable { name } => write!(f, "duplicate table {name}"),
            Self::DuplicateReducer { name } => write!(f, "duplicate reducer {name}"),
            Self::PrimaryKeyOutOfRange {
                table,
                column,
                columns,
            } => write!(
                f,
                "primary key column {column} out of range for table {table} with {columns} columns"
            ),
        }
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTable { name } => write!(f, "unknown table {name} in update"),
            Self::RowDecode { table, source } => {
                write!(f, "failed to decode a row for table {table}: {source}")
            }
        }
    }
}

impl fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownQuery { query_id } => {
                write!(f, "unknown query id {}", query_id.raw())
            }
            Self::NotActive { query_id } => {
                write!(f, "subscription {} is not active", query_id.raw())
            }
            Self::AlreadyUnsubscribing { query_id } => {
                write!(f, "subscription {} is already unsubscribing", query_id.raw())
            }
            Self::CannotUnsubscribeFromAll { query_id } => {
                write!(
                    f,
                    "subscription {} covers all tables and cannot be unsubscribed",
                    query_id.raw()
                )
            }
        }
    }
}

impl std::error::Error for SchemaError {}
impl std::error::Error for SubscriptionError {}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RowDecode { source, .. } => Some(source),
            Self::UnknownTable { .. } => None,
        }
    }
}
