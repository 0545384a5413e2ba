//! Connection configuration.

use std::sync::Arc;

use futures_channel::mpsc;
use http::Uri;
use replica::ModuleSchema;
use wire::{ClientMessage, Identity, Limits};

use crate::connection::{DbConnection, DbHandle, OnConnect, OnDisconnect};
use crate::error::Error;
use crate::ws::{self, TransportEvent};

type OnConnectError = dyn FnOnce(&Error) + Send;

/// Builds a [`DbConnection`].
///
/// `uri` and `module_name` are required; everything else has a default.
/// Without a token the server mints an anonymous identity and token, which
/// `on_connect` surfaces for the host application to persist.
pub struct ConnectionBuilder {
    schema: ModuleSchema,
    uri: Option<String>,
    module_name: Option<Box<str>>,
    token: Option<Box<str>>,
    limits: Limits,
    on_connect: Option<Box<OnConnect>>,
    on_connect_error: Option<Box<OnConnectError>>,
    on_disconnect: Option<Box<OnDisconnect>>,
}

impl ConnectionBuilder {
    pub(crate) fn new(schema: ModuleSchema) -> Self {
        Self {
            schema,
            uri: None,
            module_name: None,
            token: None,
            limits: Limits::default(),
            on_connect: None,
            on_connect_error: None,
            on_disconnect: None,
        }
    }

    /// The server to connect to: `http(s)` or `ws(s)` scheme, host, port,
    /// and an optional path prefix.
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// The module (database) to subscribe to.
    #[must_use]
    pub fn with_module_name(mut self, name: impl Into<Box<str>>) -> Self {
        self.module_name = Some(name.into());
        self
    }

    /// A bearer token from a previous connection, to reclaim its identity.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<Box<str>>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Decode limits applied to every incoming message.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Called once the server assigns this connection its identity, with the
    /// minted (or reclaimed) token.
    #[must_use]
    pub fn on_connect(
        mut self,
        callback: impl FnOnce(&DbHandle, Identity, &str) + Send + 'static,
    ) -> Self {
        self.on_connect = Some(Box::new(callback));
        self
    }

    /// Called when the connection cannot be established.
    ///
    /// A failed connect never fires `on_disconnect`.
    #[must_use]
    pub fn on_connect_error(mut self, callback: impl FnOnce(&Error) + Send + 'static) -> Self {
        self.on_connect_error = Some(Box::new(callback));
        self
    }

    /// Called once when an established connection ends, with the terminal
    /// error if it ended abnormally.
    #[must_use]
    pub fn on_disconnect(
        mut self,
        callback: impl FnOnce(&DbHandle, Option<Error>) + Send + 'static,
    ) -> Self {
        self.on_disconnect = Some(Box::new(callback));
        self
    }

    /// Connects and returns the connection, ready to be driven.
    pub async fn build(mut self) -> Result<DbConnection, Error> {
        match Self::connect(
            self.uri.take(),
            self.module_name.as_deref(),
            self.token.as_deref(),
            self.limits,
        )
        .await
        {
            Ok(transport) => Ok(DbConnection::from_transport(
                self.schema,
                transport.incoming,
                transport.outgoing,
                self.on_connect,
                self.on_disconnect,
                Some(tokio::runtime::Handle::current()),
            )),
            Err(err) => {
                if let Some(callback) = self.on_connect_error.take() {
                    callback(&err);
                }
                Err(err)
            }
        }
    }

    async fn connect(
        uri: Option<String>,
        module_name: Option<&str>,
        token: Option<&str>,
        limits: Limits,
    ) -> Result<ws::Transport, Error> {
        let uri = uri.ok_or(Error::MissingConfig { field: "uri" })?;
        let module = module_name.ok_or(Error::MissingConfig { field: "module_name" })?;
        let uri: Uri = uri.parse().map_err(|source| Error::InvalidUri {
            uri: uri.into(),
            source: Arc::new(source),
        })?;
        ws::connect(&uri, module, token, limits).await
    }

    /// Builds the connection over caller-supplied transport channels instead
    /// of a WebSocket.
    ///
    /// The caller plays the server: it reads [`ClientMessage`]s from the
    /// receiving half it kept and feeds [`TransportEvent`]s into the sending
    /// half. Used for in-memory testing and custom transports.
    #[must_use]
    pub fn build_with_transport(
        self,
        incoming: mpsc::UnboundedReceiver<TransportEvent>,
        outgoing: mpsc::UnboundedSender<ClientMessage>,
    ) -> DbConnection {
        DbConnection::from_transport(
            self.schema,
            incoming,
            outgoing,
            self.on_connect,
            self.on_disconnect,
            tokio::runtime::Handle::try_current().ok(),
        )
    }
}
