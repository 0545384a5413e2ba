//! The client error type.
//!
//! Errors here are `Clone` so one failure can be both returned to the caller
//! and handed to lifecycle callbacks; non-clonable sources are wrapped in
//! `Arc`.

use std::sync::Arc;

use thiserror::Error;

/// Anything that can go wrong on a connection.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// The configured URI failed to parse.
    #[error("invalid server uri {uri}: {source}")]
    InvalidUri {
        uri: Box<str>,
        #[source]
        source: Arc<http::uri::InvalidUri>,
    },

    /// The configured URI carries a scheme we cannot map to a WebSocket.
    #[error("unsupported uri scheme {scheme}, expected http, https, ws or wss")]
    UnsupportedScheme { scheme: Box<str> },

    /// A required builder field was never set.
    #[error("connection builder field `{field}` is required")]
    MissingConfig { field: &'static str },

    /// The WebSocket handshake failed.
    #[error("websocket connection to {uri} failed: {source}")]
    Connect {
        uri: Box<str>,
        #[source]
        source: Arc<tokio_tungstenite::tungstenite::Error>,
    },

    /// The socket failed after the handshake.
    #[error("websocket transport failed: {source}")]
    Transport {
        #[source]
        source: Arc<tokio_tungstenite::tungstenite::Error>,
    },

    /// A server frame failed to decode; the connection is torn down.
    #[error("failed to decode a server message: {0}")]
    Decode(#[from] wire::DecodeError),

    /// A client message failed to encode.
    #[error("failed to encode a client message: {0}")]
    Encode(#[from] wire::EncodeError),

    /// Reducer arguments did not match the reducer's parameter schema.
    #[error("failed to encode reducer arguments: {0}")]
    SerializeArgs(#[from] sats::EncodeError),

    /// A database update could not be applied to the cache.
    #[error("failed to apply a database update: {0}")]
    Apply(#[from] replica::ApplyError),

    /// A subscription lifecycle operation was rejected.
    #[error(transparent)]
    Subscription(#[from] replica::SubscriptionError),

    /// The named table is not in the module schema.
    #[error("unknown table {name}")]
    UnknownTable { name: Box<str> },

    /// The named reducer is not in the module schema.
    #[error("unknown reducer {name}")]
    UnknownReducer { name: Box<str> },

    /// The connection has already shut down.
    #[error("connection is disconnected")]
    Disconnected,
}
