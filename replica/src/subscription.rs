//! Subscription lifecycle tracking.
//!
//! The manager decides transitions and hands back the wire messages to send
//! and the callbacks to invoke; it performs no I/O and never calls into
//! application code itself. Query ids are minted here, starting at 1.

use std::collections::HashMap;

use wire::{ClientMessage, QueryId};

use crate::error::SubscriptionError;

/// Where a subscription is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    /// Subscribe sent, matching rows not yet merged.
    Pending,
    /// Rows merged; the server keeps them current.
    Active,
    /// The subscription no longer affects the cache.
    Ended(EndReason),
}

impl SubscriptionState {
    /// Returns `true` for [`SubscriptionState::Active`].
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` for [`SubscriptionState::Ended`].
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        matches!(self, Self::Ended(_))
    }
}

/// Why a subscription ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The client unsubscribed and the server confirmed.
    Unsubscribed,
    /// The server rejected or aborted the subscription.
    Error(Box<str>),
}

/// Callback invoked once when a subscription is applied or ends.
pub type SubscriptionCallback<Ctx> = dyn FnOnce(&Ctx) + Send;

/// Callback invoked once when a subscription fails, with the server's message.
pub type SubscriptionErrorCallback<Ctx> = dyn FnOnce(&Ctx, &str) + Send;

struct Subscription<Ctx> {
    state: SubscriptionState,
    all_tables: bool,
    unsubscribe_sent: bool,
    on_applied: Option<Box<SubscriptionCallback<Ctx>>>,
    on_error: Option<Box<SubscriptionErrorCallback<Ctx>>>,
    on_ended: Option<Box<SubscriptionCallback<Ctx>>>,
}

/// Tracks every subscription on one connection.
pub struct SubscriptionManager<Ctx> {
    next_query_id: u32,
    subscriptions: HashMap<QueryId, Subscription<Ctx>>,
}

impl<Ctx> Default for SubscriptionManager<Ctx> {
    fn default() -> Self {
        Self {
            next_query_id: 1,
            subscriptions: HashMap::new(),
        }
    }
}

impl<Ctx> SubscriptionManager<Ctx> {
    /// Creates an empty manager. Query ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a query-set subscription as Pending.
    ///
    /// Returns the minted query id and the Subscribe message to send.
    pub fn register(
        &mut self,
        queries: Vec<Box<str>>,
        on_applied: Option<Box<SubscriptionCallback<Ctx>>>,
        on_error: Option<Box<SubscriptionErrorCallback<Ctx>>>,
    ) -> (QueryId, ClientMessage) {
        self.register_inner(queries, false, on_applied, on_error)
    }

    /// Registers a subscription covering every table in the module.
    ///
    /// Such a subscription can never be unsubscribed.
    pub fn register_all_tables(
        &mut self,
        on_applied: Option<Box<SubscriptionCallback<Ctx>>>,
        on_error: Option<Box<SubscriptionErrorCallback<Ctx>>>,
    ) -> (QueryId, ClientMessage) {
        self.register_inner(vec!["SELECT * FROM *".into()], true, on_applied, on_error)
    }

    fn register_inner(
        &mut self,
        queries: Vec<Box<str>>,
        all_tables: bool,
        on_applied: Option<Box<SubscriptionCallback<Ctx>>>,
        on_error: Option<Box<SubscriptionErrorCallback<Ctx>>>,
    ) -> (QueryId, ClientMessage) {
        let query_id = QueryId::new(self.next_query_id);
        self.next_query_id += 1;
        self.subscriptions.insert(
            query_id,
            Subscription {
                state: SubscriptionState::Pending,
                all_tables,
                unsubscribe_sent: false,
                on_applied,
                on_error,
                on_ended: None,
            },
        );
        (query_id, ClientMessage::Subscribe { query_id, queries })
    }

    /// Marks a Pending subscription Active.
    ///
    /// Returns the applied-callback for the dispatcher to run after the
    /// subscription's rows have been merged.
    pub fn applied(
        &mut self,
        query_id: QueryId,
    ) -> Result<Option<Box<SubscriptionCallback<Ctx>>>, SubscriptionError> {
        let sub = self
            .subscriptions
            .get_mut(&query_id)
            .ok_or(SubscriptionError::UnknownQuery { query_id })?;
        sub.state = SubscriptionState::Active;
        Ok(sub.on_applied.take())
    }

    /// Ends a subscription on a server-reported error.
    ///
    /// Returns the error callback to run. A subscription that already ended
    /// absorbs the message silently; the server may race an error against a
    /// client unsubscribe.
    pub fn error(
        &mut self,
        query_id: QueryId,
        message: &str,
    ) -> Result<Option<Box<SubscriptionErrorCallback<Ctx>>>, SubscriptionError> {
        let sub = self
            .subscriptions
            .get_mut(&query_id)
            .ok_or(SubscriptionError::UnknownQuery { query_id })?;
        if sub.state.is_ended() {
            return Ok(None);
        }
        sub.state = SubscriptionState::Ended(EndReason::Error(message.into()));
        Ok(sub.on_error.take())
    }

    /// Starts unsubscribing an Active subscription.
    ///
    /// Returns the Unsubscribe message to send. `on_end` runs once the
    /// server confirms and the subscription's exclusive rows are gone.
    pub fn begin_unsubscribe(
        &mut self,
        query_id: QueryId,
        on_end: Option<Box<SubscriptionCallback<Ctx>>>,
    ) -> Result<ClientMessage, SubscriptionError> {
        let sub = self
            .subscriptions
            .get_mut(&query_id)
            .ok_or(SubscriptionError::UnknownQuery { query_id })?;
        if sub.all_tables {
            return Err(SubscriptionError::CannotUnsubscribeFromAll { query_id });
        }
        if !sub.state.is_active() {
            return Err(SubscriptionError::NotActive { query_id });
        }
        if sub.unsubscribe_sent {
            return Err(SubscriptionError::AlreadyUnsubscribing { query_id });
        }
        sub.unsubscribe_sent = true;
        sub.on_ended = on_end;
        Ok(ClientMessage::Unsubscribe { query_id })
    }

    /// Ends a subscription after the server confirms an unsubscribe.
    ///
    /// Returns the end callback for the dispatcher to run after the
    /// subscription's exclusive rows have been removed.
    pub fn unsubscribe_applied(
        &mut self,
        query_id: QueryId,
    ) -> Result<Option<Box<SubscriptionCallback<Ctx>>>, SubscriptionError> {
        let sub = self
            .subscriptions
            .get_mut(&query_id)
            .ok_or(SubscriptionError::UnknownQuery { query_id })?;
        sub.state = SubscriptionState::Ended(EndReason::Unsubscribed);
        Ok(sub.on_ended.take())
    }

    /// Ends every live subscription without invoking any callbacks.
    ///
    /// Called when the connection drops; pending callbacks are discarded.
    pub fn on_disconnect(&mut self) {
        for sub in self.subscriptions.values_mut() {
            if !sub.state.is_ended() {
                sub.state = SubscriptionState::Ended(EndReason::Error("disconnected".into()));
            }
            sub.on_applied = None;
            sub.on_error = None;
            sub.on_ended = None;
        }
    }

    /// The current state of a subscription, if known.
    #[must_use]
    pub fn state(&self, query_id: QueryId) -> Option<&SubscriptionState> {
        self.subscriptions.get(&query_id).map(|sub| &sub.state)
    }

    /// Number of subscriptions ever registered on this connection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if nothing was ever registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

impl<Ctx> std::fmt::Debug for SubscriptionManager<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("next_query_id", &self.next_query_id)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
