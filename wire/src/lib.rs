//! Client/server message envelope for the tabsync protocol.
//!
//! This crate defines the framed messages that cross the persistent
//! connection: subscribe requests and results, reducer calls and outcomes,
//! identity assignment, and generic transaction updates. Row payloads travel
//! as opaque BSATN blobs; decoding them against a table schema is the
//! replica layer's job.
//!
//! # Design Principles
//!
//! - **Stable wire format** - Tags are positional and versioned by the
//!   connection subprotocol, never reassigned.
//! - **Bounded decoding** - All counts and lengths are validated against
//!   limits before iteration.
//! - **No domain knowledge** - This crate handles framing, not table
//!   semantics.

mod codec;
mod error;
mod ids;
mod limits;
mod message;

pub use codec::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
};
pub use error::{DecodeError, EncodeError, LimitKind, WireResult};
pub use ids::{ConnectionId, EnergyQuanta, Identity, QueryId, RequestId, Timestamp};
pub use limits::Limits;
pub use message::{
    ClientMessage, DatabaseUpdate, ReducerCallInfo, ServerMessage, TableUpdate, UpdateStatus,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        // Verify all expected items are exported
        let _ = Identity::new([0; 32]);
        let _ = ConnectionId::new([0; 16]);
        let _ = Timestamp::from_micros(0);
        let _ = EnergyQuanta::new(0);
        let _ = RequestId::new(1);
        let _ = QueryId::new(1);
        let _ = Limits::default();
        let _ = DatabaseUpdate::default();

        // Error types
        let _: WireResult<()> = Ok(());
    }

    #[test]
    fn limits_default_is_reasonable() {
        let limits = Limits::default();
        assert!(
            limits.max_message_bytes >= 64 * 1024,
            "should allow a useful message size"
        );
        assert!(limits.max_rows_per_table >= 1024, "should allow useful diffs");
    }

    #[test]
    fn empty_update_round_trips() {
        let msg = ServerMessage::SubscribeApplied {
            query_id: QueryId::new(1),
            update: DatabaseUpdate::default(),
        };
        let bytes = encode_server_message(&msg).unwrap();
        let decoded = decode_server_message(&bytes, &Limits::for_testing()).unwrap();
        assert_eq!(decoded, msg);
    }
}
