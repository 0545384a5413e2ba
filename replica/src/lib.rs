//! Client-side replica state: cache, diffs, and sync-state tracking.
//!
//! This crate turns decoded wire messages into consistent local table state
//! and pre-computed callback batches:
//! - Runtime module schema (tables, reducers) with validation
//! - The client cache: per-table row sets keyed by encoded row bytes
//! - Diff application with delete/insert coalescing into updates
//! - Ordered callback sets with deferred add/remove
//! - Subscription lifecycle and reducer call tracking
//!
//! # Design Principles
//!
//! - **Decide, don't transmit** - Trackers return the wire messages to send;
//!   I/O belongs to the connection layer.
//! - **Atomic diffs** - The cache reaches its post-diff state before any
//!   callback fires; callbacks observe only steady states.
//! - **Single writer** - Nothing here locks; the connection's processing
//!   loop is the only mutator.

mod cache;
mod callbacks;
mod error;
mod event;
mod reducer;
mod schema;
mod subscription;

pub use cache::{AppliedDiff, ClientCache, RowUpdate, TableCache, TableDiff};
pub use callbacks::{CallbackId, CallbackSet, ReducerCallback, RowCallback, UpdateCallback};
pub use error::{ApplyError, SchemaError, SubscriptionError};
pub use event::{Event, ReducerEvent, Status};
pub use reducer::ReducerTracker;
pub use schema::{ModuleSchema, ModuleSchemaBuilder, ReducerSchema, TableSchema};
pub use subscription::{
    EndReason, SubscriptionCallback, SubscriptionErrorCallback, SubscriptionManager,
    SubscriptionState,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        // Verify all expected items are exported
        let _ = ModuleSchema::builder();
        let _ = SubscriptionState::Pending;
        let _ = EndReason::Unsubscribed;
        let _ = Status::OutOfEnergy;
        let _ = ReducerTracker::default();

        // Error types
        let _: Result<(), SchemaError> = Ok(());
        let _: Result<(), ApplyError> = Ok(());
        let _: Result<(), SubscriptionError> = Ok(());
    }
}
