//! Connection controller and event dispatch for tabsync.
//!
//! This crate ties the stack together: it speaks the `wire` protocol over a
//! WebSocket, keeps a `replica` client cache in sync with the server's
//! committed state, and dispatches row and reducer callbacks in a fixed,
//! replayable order.
//!
//! A connection is configured with [`DbConnection::builder`], then driven by
//! one of three disciplines over the same processing primitive:
//! [`DbConnection::run_threaded`] for a dedicated thread,
//! [`DbConnection::run_async`] for an async task, or
//! [`DbConnection::frame_tick`] from a frame loop.
//!
//! ```no_run
//! use client::{DbConnection, ModuleSchema};
//!
//! # async fn demo(schema: ModuleSchema) -> Result<(), client::Error> {
//! let connection = DbConnection::builder(schema)
//!     .with_uri("http://localhost:3000")
//!     .with_module_name("chat")
//!     .on_connect(|_db, identity, _token| println!("connected as {identity}"))
//!     .build()
//!     .await?;
//!
//! connection
//!     .subscription_builder()
//!     .subscribe(["SELECT * FROM message"]);
//! connection.run_threaded();
//! # Ok(())
//! # }
//! ```

mod builder;
mod connection;
mod error;
mod subscription;
mod table;
mod ws;

pub use builder::ConnectionBuilder;
pub use connection::{DbConnection, DbHandle, EventContext};
pub use error::Error;
pub use subscription::{SubscriptionBuilder, SubscriptionHandle};
pub use table::TableHandle;
pub use ws::{TransportEvent, PROTOCOL};

// The types applications handle every day, re-exported from the lower
// layers.
pub use replica::{
    CallbackId, Event, ModuleSchema, ReducerEvent, ReducerSchema, Status, TableSchema,
};
pub use wire::{ConnectionId, Identity, Limits, QueryId, RequestId, Timestamp};
