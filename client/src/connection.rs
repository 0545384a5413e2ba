//! The connection controller and its processing loop.
//!
//! One connection owns one sequential loop. Every externally-initiated
//! effect (subscribe traffic, reducer calls, callback add/remove,
//! disconnect) arrives as a [`PendingMutation`] on an unbounded queue and is
//! applied between server messages, so callbacks never observe a half-applied
//! diff and registrations made during dispatch of one message first take
//! effect for the next.
//!
//! # Design Principles
//!
//! - **One writer** - Only the loop mutates the cache and the callback sets;
//!   handles enqueue mutations and take read snapshots.
//! - **Errors become callbacks** - Transport and protocol failures end the
//!   connection through `on_disconnect`; nothing in the loop panics.
//! - **Same stream, same callbacks** - The three driving disciplines share
//!   one message-processing primitive, so they produce identical callback
//!   sequences for identical message streams.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_channel::mpsc;
use futures_util::future::{self, Either};
use futures_util::task::noop_waker_ref;
use futures_util::{Stream, StreamExt};
use replica::{
    AppliedDiff, CallbackId, CallbackSet, ClientCache, Event, ModuleSchema, ReducerCallback,
    ReducerEvent, ReducerTracker, RowCallback, Status, SubscriptionManager, UpdateCallback,
};
use sats::{to_vec, AlgebraicType, AlgebraicValue, ProductValue};
use tracing::{debug, info, warn};
use wire::{ClientMessage, ConnectionId, Identity, ServerMessage, UpdateStatus};

use crate::error::Error;
use crate::subscription::SubscriptionBuilder;
use crate::table::TableHandle;
use crate::ws::TransportEvent;

/// Context handed to every callback: why it fired and a handle to act with.
///
/// The handle reads the post-diff cache; effects it initiates (reducer
/// calls, new registrations) queue up for after the current message.
#[derive(Clone)]
pub struct EventContext {
    pub event: Event,
    pub db: DbHandle,
}

pub(crate) type OnConnect = dyn FnOnce(&DbHandle, Identity, &str) + Send;
pub(crate) type OnDisconnect = dyn FnOnce(&DbHandle, Option<Error>) + Send;

/// State shared between the loop and handles.
pub(crate) struct SharedState {
    pub cache: ClientCache,
    pub subscriptions: SubscriptionManager<EventContext>,
    pub identity: Option<Identity>,
    pub connection_id: Option<ConnectionId>,
    pub connected: bool,
}

/// An externally-initiated effect, applied by the loop between messages.
pub(crate) enum PendingMutation {
    /// Subscribe or unsubscribe traffic already decided by the manager.
    SendMessage(ClientMessage),
    CallReducer {
        reducer: Box<str>,
        args: Bytes,
    },
    AddOnInsert {
        table: usize,
        id: CallbackId,
        callback: Box<RowCallback<EventContext>>,
    },
    RemoveOnInsert {
        table: usize,
        id: CallbackId,
    },
    AddOnDelete {
        table: usize,
        id: CallbackId,
        callback: Box<RowCallback<EventContext>>,
    },
    RemoveOnDelete {
        table: usize,
        id: CallbackId,
    },
    AddOnUpdate {
        table: usize,
        id: CallbackId,
        callback: Box<UpdateCallback<EventContext>>,
    },
    RemoveOnUpdate {
        table: usize,
        id: CallbackId,
    },
    AddOnReducer {
        reducer: Box<str>,
        id: CallbackId,
        callback: Box<ReducerCallback<EventContext>>,
    },
    RemoveOnReducer {
        reducer: Box<str>,
        id: CallbackId,
    },
    Disconnect,
}

/// A cloneable handle onto a connection.
///
/// Reads take a snapshot of shared state; writes are queued as pending
/// mutations for the processing loop.
#[derive(Clone)]
pub struct DbHandle {
    pub(crate) shared: Arc<Mutex<SharedState>>,
    pub(crate) pending: mpsc::UnboundedSender<PendingMutation>,
    pub(crate) schema: Arc<ModuleSchema>,
}

impl DbHandle {
    pub(crate) fn lock(&self) -> MutexGuard<'_, SharedState> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The module schema this connection speaks.
    #[must_use]
    pub fn schema(&self) -> &ModuleSchema {
        &self.schema
    }

    /// A handle onto one table's rows and callbacks.
    pub fn table(&self, name: &str) -> Result<TableHandle, Error> {
        let index = self
            .schema
            .tables()
            .iter()
            .position(|t| &*t.name == name)
            .ok_or_else(|| Error::UnknownTable { name: name.into() })?;
        Ok(TableHandle {
            db: self.clone(),
            index,
            name: name.into(),
        })
    }

    /// Requests a reducer run with the given arguments, fire-and-forget.
    ///
    /// The arguments are checked and encoded against the reducer's parameter
    /// schema before the call is queued.
    pub fn call_reducer(&self, name: &str, args: ProductValue) -> Result<(), Error> {
        let reducer = self
            .schema
            .reducer(name)
            .ok_or_else(|| Error::UnknownReducer { name: name.into() })?;
        let params = AlgebraicType::Product(reducer.params.clone());
        let encoded = to_vec(&AlgebraicValue::Product(args), &params)?;
        if !self.lock().connected {
            return Err(Error::Disconnected);
        }
        self.queue(PendingMutation::CallReducer {
            reducer: name.into(),
            args: Bytes::from(encoded),
        });
        Ok(())
    }

    /// Registers a callback for every outcome of the named reducer.
    pub fn on_reducer(
        &self,
        name: &str,
        callback: impl FnMut(&EventContext, &ReducerEvent) + Send + 'static,
    ) -> Result<CallbackId, Error> {
        if self.schema.reducer(name).is_none() {
            return Err(Error::UnknownReducer { name: name.into() });
        }
        let id = CallbackId::next();
        self.queue(PendingMutation::AddOnReducer {
            reducer: name.into(),
            id,
            callback: Box::new(callback),
        });
        Ok(id)
    }

    /// Removes a reducer callback registered with [`on_reducer`](Self::on_reducer).
    pub fn remove_on_reducer(&self, name: &str, id: CallbackId) {
        self.queue(PendingMutation::RemoveOnReducer {
            reducer: name.into(),
            id,
        });
    }

    /// Starts building a subscription.
    #[must_use]
    pub fn subscription_builder(&self) -> SubscriptionBuilder {
        SubscriptionBuilder::new(self.clone())
    }

    /// The identity the server minted for this connection, once known.
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity
    }

    /// This connection's id, once known.
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.lock().connection_id
    }

    /// Returns `true` while the connection has not shut down.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Requests a cooperative disconnect.
    ///
    /// The loop finishes the message it is processing, abandons in-flight
    /// reducer calls, and fires `on_disconnect` with no error.
    pub fn disconnect(&self) -> Result<(), Error> {
        if !self.lock().connected {
            return Err(Error::Disconnected);
        }
        self.queue(PendingMutation::Disconnect);
        Ok(())
    }

    pub(crate) fn queue(&self, mutation: PendingMutation) {
        if self.pending.unbounded_send(mutation).is_err() {
            warn!("connection dropped, mutation discarded");
        }
    }
}

/// Per-table and per-reducer callback sets, owned by the loop.
struct Dispatcher {
    schema: Arc<ModuleSchema>,
    on_insert: Vec<CallbackSet<RowCallback<EventContext>>>,
    on_delete: Vec<CallbackSet<RowCallback<EventContext>>>,
    on_update: Vec<CallbackSet<UpdateCallback<EventContext>>>,
    on_reducer: HashMap<Box<str>, CallbackSet<ReducerCallback<EventContext>>>,
}

impl Dispatcher {
    fn new(schema: Arc<ModuleSchema>) -> Self {
        let tables = schema.tables().len();
        Self {
            schema,
            on_insert: (0..tables).map(|_| CallbackSet::new()).collect(),
            on_delete: (0..tables).map(|_| CallbackSet::new()).collect(),
            on_update: (0..tables).map(|_| CallbackSet::new()).collect(),
            on_reducer: HashMap::new(),
        }
    }

    /// Row callbacks for one diff: per table, deletes then updates then
    /// inserts; tables in schema declaration order (the diff's order).
    fn dispatch_diff(&mut self, ctx: &EventContext, diff: &AppliedDiff) {
        for table in &diff.tables {
            let Some(index) = self
                .schema
                .tables()
                .iter()
                .position(|t| t.name == table.table_name)
            else {
                warn!(table = &*table.table_name, "diff for a table with no callbacks");
                continue;
            };
            for row in &table.deletes {
                self.on_delete[index].for_each(|cb| cb(ctx, row));
            }
            for update in &table.updates {
                self.on_update[index].for_each(|cb| cb(ctx, &update.old, &update.new));
            }
            for row in &table.inserts {
                self.on_insert[index].for_each(|cb| cb(ctx, row));
            }
        }
    }

    fn dispatch_reducer(&mut self, ctx: &EventContext, event: &ReducerEvent) {
        if let Some(set) = self.on_reducer.get_mut(&*event.reducer) {
            set.for_each(|cb| cb(ctx, event));
        }
    }
}

/// An active connection to one remote module.
///
/// Dropping the connection closes the socket; to keep it alive, drive it
/// with one of [`run_async`](Self::run_async),
/// [`run_threaded`](Self::run_threaded), or a [`frame_tick`](Self::frame_tick)
/// loop.
pub struct DbConnection {
    handle: DbHandle,
    incoming: mpsc::UnboundedReceiver<TransportEvent>,
    pending_rx: mpsc::UnboundedReceiver<PendingMutation>,
    outgoing: Option<mpsc::UnboundedSender<ClientMessage>>,
    dispatcher: Dispatcher,
    reducers: ReducerTracker,
    on_connect: Option<Box<OnConnect>>,
    on_disconnect: Option<Box<OnDisconnect>>,
    runtime: Option<tokio::runtime::Handle>,
    active: bool,
}

impl DbConnection {
    /// Starts configuring a connection for the given module schema.
    #[must_use]
    pub fn builder(schema: ModuleSchema) -> crate::ConnectionBuilder {
        crate::ConnectionBuilder::new(schema)
    }

    pub(crate) fn from_transport(
        schema: ModuleSchema,
        incoming: mpsc::UnboundedReceiver<TransportEvent>,
        outgoing: mpsc::UnboundedSender<ClientMessage>,
        on_connect: Option<Box<OnConnect>>,
        on_disconnect: Option<Box<OnDisconnect>>,
        runtime: Option<tokio::runtime::Handle>,
    ) -> Self {
        let schema = Arc::new(schema);
        let cache = ClientCache::new(&schema);
        let (pending_tx, pending_rx) = mpsc::unbounded();
        let shared = Arc::new(Mutex::new(SharedState {
            cache,
            subscriptions: SubscriptionManager::new(),
            identity: None,
            connection_id: None,
            connected: true,
        }));
        let handle = DbHandle {
            shared,
            pending: pending_tx,
            schema: Arc::clone(&schema),
        };
        Self {
            handle,
            incoming,
            pending_rx,
            outgoing: Some(outgoing),
            dispatcher: Dispatcher::new(schema),
            reducers: ReducerTracker::new(),
            on_connect,
            on_disconnect,
            runtime,
            active: true,
        }
    }

    /// A cloneable handle onto this connection.
    #[must_use]
    pub fn handle(&self) -> DbHandle {
        self.handle.clone()
    }

    /// See [`DbHandle::table`].
    pub fn table(&self, name: &str) -> Result<TableHandle, Error> {
        self.handle.table(name)
    }

    /// See [`DbHandle::call_reducer`].
    pub fn call_reducer(&self, name: &str, args: ProductValue) -> Result<(), Error> {
        self.handle.call_reducer(name, args)
    }

    /// See [`DbHandle::on_reducer`].
    pub fn on_reducer(
        &self,
        name: &str,
        callback: impl FnMut(&EventContext, &ReducerEvent) + Send + 'static,
    ) -> Result<CallbackId, Error> {
        self.handle.on_reducer(name, callback)
    }

    /// See [`DbHandle::subscription_builder`].
    #[must_use]
    pub fn subscription_builder(&self) -> SubscriptionBuilder {
        self.handle.subscription_builder()
    }

    /// See [`DbHandle::identity`].
    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.handle.identity()
    }

    /// See [`DbHandle::connection_id`].
    #[must_use]
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.handle.connection_id()
    }

    /// See [`DbHandle::disconnect`].
    pub fn disconnect(&self) -> Result<(), Error> {
        self.handle.disconnect()
    }

    /// Processes one pending mutation or one server message, whichever is
    /// ready first; mutations win when both are.
    ///
    /// Returns `false` once the connection has shut down.
    pub async fn advance_one_message(&mut self) -> bool {
        if !self.active {
            return false;
        }
        match future::select(self.pending_rx.next(), self.incoming.next()).await {
            Either::Left((Some(mutation), _)) => self.apply_mutation(mutation),
            Either::Right((Some(event), _)) => self.process_event(event),
            Either::Left((None, _)) | Either::Right((None, _)) => self.shutdown(None),
        }
    }

    /// Drives the connection until it shuts down.
    pub async fn run_async(&mut self) {
        while self.advance_one_message().await {}
    }

    /// Drives the connection on a dedicated thread until it shuts down.
    ///
    /// Uses the runtime captured at build time, or a private current-thread
    /// runtime when the connection was built outside one.
    pub fn run_threaded(mut self) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            if let Some(runtime) = self.runtime.take() {
                runtime.block_on(self.run_async());
            } else {
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime.block_on(self.run_async()),
                    Err(err) => tracing::error!(error = %err, "cannot build a runtime to drive the connection"),
                }
            }
        })
    }

    /// Processes everything already buffered without blocking, for callers
    /// that poll once per frame.
    ///
    /// Returns `false` once the connection has shut down.
    pub fn frame_tick(&mut self) -> bool {
        if !self.active {
            return false;
        }
        // Polled with a noop waker: nothing needs to wake us, the host
        // calls back next frame.
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            while let Poll::Ready(Some(mutation)) =
                Pin::new(&mut self.pending_rx).poll_next(&mut cx)
            {
                if !self.apply_mutation(mutation) {
                    return false;
                }
            }
            match Pin::new(&mut self.incoming).poll_next(&mut cx) {
                Poll::Ready(Some(event)) => {
                    if !self.process_event(event) {
                        return false;
                    }
                }
                Poll::Ready(None) => return self.shutdown(None),
                Poll::Pending => return true,
            }
        }
    }

    fn send(&mut self, msg: ClientMessage) {
        if let Some(outgoing) = &self.outgoing {
            if outgoing.unbounded_send(msg).is_err() {
                // The socket task already quit; its failure event is on the
                // incoming queue and will shut us down.
                warn!("transport gone, dropping outgoing message");
            }
        }
    }

    fn apply_mutation(&mut self, mutation: PendingMutation) -> bool {
        match mutation {
            PendingMutation::SendMessage(msg) => self.send(msg),
            PendingMutation::CallReducer { reducer, args } => {
                let request_id = self.reducers.begin_call(&reducer);
                debug!(reducer = &*reducer, request_id = request_id.raw(), "calling reducer");
                self.send(ClientMessage::CallReducer {
                    request_id,
                    reducer,
                    args,
                });
            }
            PendingMutation::AddOnInsert { table, id, callback } => {
                self.dispatcher.on_insert[table].add(id, callback);
                self.dispatcher.on_insert[table].apply_pending();
            }
            PendingMutation::RemoveOnInsert { table, id } => {
                self.dispatcher.on_insert[table].remove(id);
                self.dispatcher.on_insert[table].apply_pending();
            }
            PendingMutation::AddOnDelete { table, id, callback } => {
                self.dispatcher.on_delete[table].add(id, callback);
                self.dispatcher.on_delete[table].apply_pending();
            }
            PendingMutation::RemoveOnDelete { table, id } => {
                self.dispatcher.on_delete[table].remove(id);
                self.dispatcher.on_delete[table].apply_pending();
            }
            PendingMutation::AddOnUpdate { table, id, callback } => {
                self.dispatcher.on_update[table].add(id, callback);
                self.dispatcher.on_update[table].apply_pending();
            }
            PendingMutation::RemoveOnUpdate { table, id } => {
                self.dispatcher.on_update[table].remove(id);
                self.dispatcher.on_update[table].apply_pending();
            }
            PendingMutation::AddOnReducer { reducer, id, callback } => {
                let set = self.dispatcher.on_reducer.entry(reducer).or_default();
                set.add(id, callback);
                set.apply_pending();
            }
            PendingMutation::RemoveOnReducer { reducer, id } => {
                if let Some(set) = self.dispatcher.on_reducer.get_mut(&reducer) {
                    set.remove(id);
                    set.apply_pending();
                }
            }
            PendingMutation::Disconnect => return self.shutdown(None),
        }
        true
    }

    fn process_event(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::Message(msg) => self.process_message(msg),
            TransportEvent::Failed(err) => self.shutdown(Some(err)),
            TransportEvent::Closed => self.shutdown(None),
        }
    }

    fn context(&self, event: Event) -> EventContext {
        EventContext {
            event,
            db: self.handle.clone(),
        }
    }

    /// Applies a database update under the shared lock and returns the
    /// decoded diff; the lock is released before any callback fires.
    fn apply_update(&mut self, update: &wire::DatabaseUpdate) -> Result<AppliedDiff, Error> {
        let diff = self.handle.lock().cache.apply_diff(update)?;
        Ok(diff)
    }

    fn process_message(&mut self, msg: ServerMessage) -> bool {
        match msg {
            ServerMessage::IdentityToken {
                identity,
                token,
                connection_id,
            } => {
                info!(%identity, "identity assigned");
                {
                    let mut shared = self.handle.lock();
                    shared.identity = Some(identity);
                    shared.connection_id = Some(connection_id);
                }
                if let Some(callback) = self.on_connect.take() {
                    callback(&self.handle, identity, &token);
                }
                true
            }

            ServerMessage::SubscribeApplied { query_id, update } => {
                let diff = match self.apply_update(&update) {
                    Ok(diff) => diff,
                    Err(err) => return self.shutdown(Some(err)),
                };
                let on_applied = match self.handle.lock().subscriptions.applied(query_id) {
                    Ok(callback) => callback,
                    Err(err) => {
                        warn!(error = %err, "subscribe applied for an unknown query");
                        None
                    }
                };
                let ctx = self.context(Event::SubscribeApplied);
                self.dispatcher.dispatch_diff(&ctx, &diff);
                if let Some(callback) = on_applied {
                    callback(&ctx);
                }
                true
            }

            ServerMessage::SubscribeError { query_id, message } => {
                warn!(query_id = query_id.raw(), %message, "subscription rejected");
                let on_error = match self.handle.lock().subscriptions.error(query_id, &message) {
                    Ok(callback) => callback,
                    Err(err) => {
                        warn!(error = %err, "subscribe error for an unknown query");
                        None
                    }
                };
                if let Some(callback) = on_error {
                    let ctx = self.context(Event::SubscribeError(message.clone()));
                    callback(&ctx, &message);
                }
                true
            }

            ServerMessage::UnsubscribeApplied { query_id, update } => {
                let diff = match self.apply_update(&update) {
                    Ok(diff) => diff,
                    Err(err) => return self.shutdown(Some(err)),
                };
                let on_end = match self.handle.lock().subscriptions.unsubscribe_applied(query_id) {
                    Ok(callback) => callback,
                    Err(err) => {
                        warn!(error = %err, "unsubscribe applied for an unknown query");
                        None
                    }
                };
                let ctx = self.context(Event::UnsubscribeApplied);
                self.dispatcher.dispatch_diff(&ctx, &diff);
                if let Some(callback) = on_end {
                    callback(&ctx);
                }
                true
            }

            ServerMessage::TransactionUpdate {
                status,
                timestamp,
                caller_identity,
                caller_connection_id,
                reducer: call,
                energy,
            } => {
                let caller_is_local = self.handle.lock().identity == Some(caller_identity);
                let settled = self.reducers.settle(&call.reducer, caller_is_local);
                if let Some(request_id) = settled {
                    debug!(
                        reducer = &*call.reducer,
                        request_id = request_id.raw(),
                        "reducer call settled"
                    );
                }

                let known_reducer = self.handle.schema.reducer(&call.reducer).is_some();
                let reducer_event = ReducerEvent::new(
                    Status::from_wire(&status),
                    timestamp,
                    caller_identity,
                    caller_connection_id,
                    energy,
                    &call,
                );

                match status {
                    UpdateStatus::Committed(update) => {
                        let diff = match self.apply_update(&update) {
                            Ok(diff) => diff,
                            Err(err) => return self.shutdown(Some(err)),
                        };
                        let event = if known_reducer {
                            Event::Reducer(reducer_event.clone())
                        } else {
                            debug!(reducer = &*call.reducer, "transaction from an unknown reducer");
                            Event::UnknownTransaction
                        };
                        let ctx = self.context(event);
                        self.dispatcher.dispatch_diff(&ctx, &diff);
                        if known_reducer {
                            self.dispatcher.dispatch_reducer(&ctx, &reducer_event);
                        }
                    }
                    UpdateStatus::Failed(_) | UpdateStatus::OutOfEnergy => {
                        // Failure outcomes are only reported to their caller.
                        if caller_is_local && known_reducer {
                            let ctx = self.context(Event::Reducer(reducer_event.clone()));
                            self.dispatcher.dispatch_reducer(&ctx, &reducer_event);
                        }
                    }
                }
                true
            }
        }
    }

    /// Tears the connection down. Idempotent; always returns `false`.
    fn shutdown(&mut self, err: Option<Error>) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        // Dropping the sender makes the socket task close the socket.
        self.outgoing = None;
        {
            let mut shared = self.handle.lock();
            shared.connected = false;
            shared.subscriptions.on_disconnect();
        }
        let abandoned = self.reducers.abandon_all();
        if abandoned > 0 {
            warn!(abandoned, "abandoning in-flight reducer calls");
        }
        match &err {
            Some(error) => warn!(%error, "connection lost"),
            None => info!("disconnected"),
        }
        if let Some(callback) = self.on_disconnect.take() {
            callback(&self.handle, err);
        }
        false
    }
}
