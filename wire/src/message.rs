//! Message definitions for the client/server envelope.

use bytes::Bytes;

use crate::ids::{ConnectionId, EnergyQuanta, Identity, QueryId, RequestId, Timestamp};

/// A message sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Register a set of queries; the server replies with
    /// [`ServerMessage::SubscribeApplied`] or [`ServerMessage::SubscribeError`].
    Subscribe {
        query_id: QueryId,
        queries: Vec<Box<str>>,
    },

    /// End an active subscription; the server replies with
    /// [`ServerMessage::UnsubscribeApplied`].
    Unsubscribe { query_id: QueryId },

    /// Invoke a reducer. Fire-and-forget: the outcome arrives later as a
    /// [`ServerMessage::TransactionUpdate`].
    CallReducer {
        request_id: RequestId,
        reducer: Box<str>,
        /// BSATN-encoded product of the reducer's arguments.
        args: Bytes,
    },
}

/// A message pushed from the server to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Sent once on connect: the caller's identity, a token that will
    /// authenticate as that identity in the future, and this connection's id.
    IdentityToken {
        identity: Identity,
        token: Box<str>,
        connection_id: ConnectionId,
    },

    /// A subscription reached Active; `update` contains every currently
    /// matching row as inserts.
    SubscribeApplied {
        query_id: QueryId,
        update: DatabaseUpdate,
    },

    /// A subscription was rejected (malformed query, unsupported SQL).
    SubscribeError {
        query_id: QueryId,
        message: Box<str>,
    },

    /// An unsubscribe completed; `update` deletes the rows that were
    /// exclusively matched by the ended subscription.
    UnsubscribeApplied {
        query_id: QueryId,
        update: DatabaseUpdate,
    },

    /// A transaction ran; carries the reducer outcome and, when committed,
    /// the diff restricted to this connection's subscribed rows.
    TransactionUpdate {
        status: UpdateStatus,
        timestamp: Timestamp,
        caller_identity: Identity,
        caller_connection_id: Option<ConnectionId>,
        reducer: ReducerCallInfo,
        energy: EnergyQuanta,
    },
}

/// Outcome of one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Committed; the diff touches this connection's subscribed rows.
    Committed(DatabaseUpdate),
    /// Failed with a diagnostic message; no diff accompanies it.
    Failed(Box<str>),
    /// Aborted for lack of energy; no diff accompanies it.
    OutOfEnergy,
}

/// Identifies the reducer run that caused a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducerCallInfo {
    pub reducer: Box<str>,
    /// BSATN-encoded product of the arguments the reducer ran with.
    pub args: Bytes,
    pub request_id: RequestId,
}

/// The set of row changes associated with one transaction or subscription
/// event, grouped per table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatabaseUpdate {
    pub tables: Vec<TableUpdate>,
}

/// Row deletions and insertions for one table.
///
/// Rows are opaque BSATN blobs at this layer; the replica decodes them
/// against the table's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableUpdate {
    pub table_name: Box<str>,
    pub deletes: Vec<Bytes>,
    pub inserts: Vec<Bytes>,
}

impl DatabaseUpdate {
    /// Returns `true` if no table has any row changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(TableUpdate::is_empty)
    }

    /// Total number of row changes across all tables.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.tables
            .iter()
            .map(|t| t.deletes.len() + t.inserts.len())
            .sum()
    }
}

impl TableUpdate {
    /// Creates an empty update for a table.
    #[must_use]
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.into(),
            deletes: Vec::new(),
            inserts: Vec::new(),
        }
    }

    /// Returns `true` if there are no row changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.inserts.is_empty()
    }
}

impl UpdateStatus {
    /// Returns `true` for [`UpdateStatus::Committed`].
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_update_reports_empty() {
        let update = DatabaseUpdate::default();
        assert!(update.is_empty());
        assert_eq!(update.num_rows(), 0);
    }

    #[test]
    fn update_with_rows_is_not_empty() {
        let mut table = TableUpdate::new("user");
        table.inserts.push(Bytes::from_static(&[1, 2]));
        let update = DatabaseUpdate {
            tables: vec![table],
        };
        assert!(!update.is_empty());
        assert_eq!(update.num_rows(), 1);
    }

    #[test]
    fn update_with_only_empty_tables_is_empty() {
        let update = DatabaseUpdate {
            tables: vec![TableUpdate::new("user"), TableUpdate::new("message")],
        };
        assert!(update.is_empty());
    }

    #[test]
    fn status_is_committed() {
        assert!(UpdateStatus::Committed(DatabaseUpdate::default()).is_committed());
        assert!(!UpdateStatus::Failed("boom".into()).is_committed());
        assert!(!UpdateStatus::OutOfEnergy.is_committed());
    }
}
