//! Configurable limits for bounded decoding.

/// Wire-level limits for message decoding.
///
/// These limits are enforced during decoding to prevent resource exhaustion
/// and ensure bounded memory usage. Row payloads are opaque at this layer;
/// schema-directed row decoding limits belong to the replica layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Maximum total message size in bytes.
    pub max_message_bytes: usize,

    /// Maximum number of queries in a subscribe request.
    pub max_queries: usize,

    /// Maximum number of table updates in one database update.
    pub max_tables_per_update: usize,

    /// Maximum number of rows (deletes plus inserts) per table update.
    pub max_rows_per_table: usize,

    /// Maximum size of a single encoded row in bytes.
    pub max_row_bytes: usize,

    /// Maximum length of a string field (query text, error message) in bytes.
    pub max_string_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            // Subscription results can carry an initial table scan
            max_message_bytes: 16 * 1024 * 1024,

            max_queries: 256,
            max_tables_per_update: 1024,
            max_rows_per_table: 1024 * 1024,
            max_row_bytes: 1024 * 1024,
            max_string_bytes: 64 * 1024,
        }
    }
}

impl Limits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_message_bytes: 64 * 1024,
            max_queries: 8,
            max_tables_per_update: 8,
            max_rows_per_table: 64,
            max_row_bytes: 1024,
            max_string_bytes: 1024,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_message_bytes: usize::MAX,
            max_queries: usize::MAX,
            max_tables_per_update: usize::MAX,
            max_rows_per_table: usize::MAX,
            max_row_bytes: usize::MAX,
            max_string_bytes: usize::MAX,
        }
    }
}
