//! The subscription surface: builder and handle.

use wire::QueryId;

use crate::connection::{DbHandle, EventContext, PendingMutation};
use crate::error::Error;

/// Configures and starts one subscription.
pub struct SubscriptionBuilder {
    db: DbHandle,
    on_applied: Option<Box<replica::SubscriptionCallback<EventContext>>>,
    on_error: Option<Box<replica::SubscriptionErrorCallback<EventContext>>>,
}

impl SubscriptionBuilder {
    pub(crate) fn new(db: DbHandle) -> Self {
        Self {
            db,
            on_applied: None,
            on_error: None,
        }
    }

    /// Called once the subscription's rows have been merged into the cache.
    #[must_use]
    pub fn on_applied(mut self, callback: impl FnOnce(&EventContext) + Send + 'static) -> Self {
        self.on_applied = Some(Box::new(callback));
        self
    }

    /// Called if the server rejects or aborts the subscription.
    #[must_use]
    pub fn on_error(
        mut self,
        callback: impl FnOnce(&EventContext, &str) + Send + 'static,
    ) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Subscribes to a set of queries.
    pub fn subscribe<I, S>(self, queries: I) -> SubscriptionHandle
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        let queries: Vec<Box<str>> = queries.into_iter().map(Into::into).collect();
        let (query_id, message) = self
            .db
            .lock()
            .subscriptions
            .register(queries, self.on_applied, self.on_error);
        self.db.queue(PendingMutation::SendMessage(message));
        SubscriptionHandle {
            db: self.db,
            query_id,
        }
    }

    /// Subscribes to every table in the module.
    ///
    /// The resulting subscription can never be unsubscribed.
    pub fn subscribe_to_all_tables(self) -> SubscriptionHandle {
        let (query_id, message) = self
            .db
            .lock()
            .subscriptions
            .register_all_tables(self.on_applied, self.on_error);
        self.db.queue(PendingMutation::SendMessage(message));
        SubscriptionHandle {
            db: self.db,
            query_id,
        }
    }
}

/// A handle onto one started subscription.
#[derive(Clone)]
pub struct SubscriptionHandle {
    db: DbHandle,
    query_id: QueryId,
}

impl SubscriptionHandle {
    /// The query id this subscription was registered under.
    #[must_use]
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Returns `true` while the subscription is applied and kept current.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.db
            .lock()
            .subscriptions
            .state(self.query_id)
            .is_some_and(replica::SubscriptionState::is_active)
    }

    /// Returns `true` once the subscription has ended for any reason.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.db
            .lock()
            .subscriptions
            .state(self.query_id)
            .is_some_and(replica::SubscriptionState::is_ended)
    }

    /// Asks the server to end this subscription.
    pub fn unsubscribe(self) -> Result<(), Error> {
        self.unsubscribe_inner(None)
    }

    /// Asks the server to end this subscription; `on_end` runs once its
    /// exclusive rows have been removed from the cache.
    pub fn unsubscribe_then(
        self,
        on_end: impl FnOnce(&EventContext) + Send + 'static,
    ) -> Result<(), Error> {
        self.unsubscribe_inner(Some(Box::new(on_end)))
    }

    fn unsubscribe_inner(
        self,
        on_end: Option<Box<replica::SubscriptionCallback<EventContext>>>,
    ) -> Result<(), Error> {
        let message = self
            .db
            .lock()
            .subscriptions
            .begin_unsubscribe(self.query_id, on_end)?;
        self.db.queue(PendingMutation::SendMessage(message));
        Ok(())
    }
}
