//! Event types describing why callbacks are firing.

use bytes::Bytes;
use wire::{ConnectionId, EnergyQuanta, Identity, ReducerCallInfo, RequestId, Timestamp, UpdateStatus};

/// Outcome of a reducer run, without the row diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The reducer committed.
    Committed,
    /// The reducer failed; the message is diagnostic-only.
    Failed(Box<str>),
    /// The reducer ran out of energy before committing.
    OutOfEnergy,
}

impl Status {
    /// Builds a status from the wire representation, dropping the diff.
    #[must_use]
    pub fn from_wire(status: &UpdateStatus) -> Self {
        match status {
            UpdateStatus::Committed(_) => Self::Committed,
            UpdateStatus::Failed(message) => Self::Failed(message.clone()),
            UpdateStatus::OutOfEnergy => Self::OutOfEnergy,
        }
    }

    /// Returns `true` for [`Status::Committed`].
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// The failure message, if this is a failed run.
    #[must_use]
    pub fn reducer_error(&self) -> Option<&str> {
        match self {
            Self::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Notification of one reducer run.
///
/// Constructed once per outcome message and never mutated by the runtime;
/// application code may retain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducerEvent {
    pub timestamp: Timestamp,
    pub status: Status,
    pub caller_identity: Identity,
    pub caller_connection_id: Option<ConnectionId>,
    pub energy_consumed: Option<EnergyQuanta>,
    pub reducer: Box<str>,
    /// BSATN-encoded product of the arguments the reducer ran with.
    pub args: Bytes,
    pub request_id: RequestId,
}

impl ReducerEvent {
    /// Builds a reducer event from the pieces of a transaction update.
    #[must_use]
    pub fn new(
        status: Status,
        timestamp: Timestamp,
        caller_identity: Identity,
        caller_connection_id: Option<ConnectionId>,
        energy: EnergyQuanta,
        call: &ReducerCallInfo,
    ) -> Self {
        Self {
            timestamp,
            status,
            caller_identity,
            caller_connection_id,
            energy_consumed: Some(energy),
            reducer: call.reducer.clone(),
            args: call.args.clone(),
            request_id: call.request_id,
        }
    }
}

/// Why a batch of row callbacks is firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A reducer ran. Row callbacks accompany it only when committed.
    Reducer(ReducerEvent),
    /// A subscription reached Active and its rows were merged in.
    SubscribeApplied,
    /// An unsubscribe completed and its exclusive rows were removed.
    UnsubscribeApplied,
    /// A subscription was rejected by the server.
    SubscribeError(Box<str>),
    /// The server sent a diff it did not attribute to a reducer.
    UnknownTransaction,
}

impl Event {
    /// Returns `true` if this event may legally accompany row callbacks.
    ///
    /// A row change must be backed by a successful commit, a subscription
    /// application/end, or an unattributed transaction.
    #[must_use]
    pub fn may_carry_rows(&self) -> bool {
        match self {
            Self::Reducer(event) => event.status.is_committed(),
            Self::SubscribeApplied | Self::UnsubscribeApplied | Self::UnknownTransaction => true,
            Self::SubscribeError(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_info() -> ReducerCallInfo {
        ReducerCallInfo {
            reducer: "send_message".into(),
            args: Bytes::from_static(&[1, 2]),
            request_id: RequestId::new(4),
        }
    }

    #[test]
    fn status_from_wire_drops_diff() {
        let status = Status::from_wire(&UpdateStatus::Committed(wire::DatabaseUpdate::default()));
        assert_eq!(status, Status::Committed);
        assert!(status.is_committed());

        let status = Status::from_wire(&UpdateStatus::Failed("nope".into()));
        assert_eq!(status.reducer_error(), Some("nope"));
        assert!(!status.is_committed());
    }

    #[test]
    fn reducer_event_copies_call_info() {
        let event = ReducerEvent::new(
            Status::Committed,
            Timestamp::from_micros(9),
            Identity::new([1; 32]),
            None,
            EnergyQuanta::new(5),
            &call_info(),
        );
        assert_eq!(&*event.reducer, "send_message");
        assert_eq!(event.request_id, RequestId::new(4));
        assert_eq!(event.energy_consumed, Some(EnergyQuanta::new(5)));
    }

    #[test]
    fn only_committed_reducer_events_carry_rows() {
        let mut event = ReducerEvent::new(
            Status::Committed,
            Timestamp::from_micros(0),
            Identity::new([0; 32]),
            None,
            EnergyQuanta::new(0),
            &call_info(),
        );
        assert!(Event::Reducer(event.clone()).may_carry_rows());

        event.status = Status::Failed("x".into());
        assert!(!Event::Reducer(event).may_carry_rows());
    }

    #[test]
    fn subscription_events_carry_rows() {
        assert!(Event::SubscribeApplied.may_carry_rows());
        assert!(Event::UnsubscribeApplied.may_carry_rows());
        assert!(Event::UnknownTransaction.may_carry_rows());
        assert!(!Event::SubscribeError("bad sql".into()).may_carry_rows());
    }
}
