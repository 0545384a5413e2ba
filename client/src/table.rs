//! Read access and row callbacks for one table.

use replica::CallbackId;
use sats::{AlgebraicValue, ProductValue};

use crate::connection::{DbHandle, EventContext, PendingMutation};

/// A handle onto one table of the client cache.
///
/// Reads are snapshots of the post-diff cache; callback registrations queue
/// up and take effect before the next message is processed.
#[derive(Clone)]
pub struct TableHandle {
    pub(crate) db: DbHandle,
    pub(crate) index: usize,
    pub(crate) name: Box<str>,
}

impl TableHandle {
    /// The table's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows currently cached.
    #[must_use]
    pub fn count(&self) -> usize {
        self.db
            .lock()
            .cache
            .table(&self.name)
            .map_or(0, replica::TableCache::count)
    }

    /// A snapshot of the cached rows, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = ProductValue> {
        let rows: Vec<ProductValue> = self
            .db
            .lock()
            .cache
            .table(&self.name)
            .map(|table| table.iter().cloned().collect())
            .unwrap_or_default();
        rows.into_iter()
    }

    /// Looks up the row with the given primary-key value.
    ///
    /// Always `None` for tables without a primary key.
    #[must_use]
    pub fn find_by_pk(&self, key: &AlgebraicValue) -> Option<ProductValue> {
        self.db
            .lock()
            .cache
            .table(&self.name)
            .and_then(|table| table.get_by_pk(key).cloned())
    }

    /// Registers a callback fired for every inserted row.
    pub fn on_insert(
        &self,
        callback: impl FnMut(&EventContext, &ProductValue) + Send + 'static,
    ) -> CallbackId {
        let id = CallbackId::next();
        self.db.queue(PendingMutation::AddOnInsert {
            table: self.index,
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes an insert callback.
    pub fn remove_on_insert(&self, id: CallbackId) {
        self.db.queue(PendingMutation::RemoveOnInsert {
            table: self.index,
            id,
        });
    }

    /// Registers a callback fired for every deleted row.
    pub fn on_delete(
        &self,
        callback: impl FnMut(&EventContext, &ProductValue) + Send + 'static,
    ) -> CallbackId {
        let id = CallbackId::next();
        self.db.queue(PendingMutation::AddOnDelete {
            table: self.index,
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes a delete callback.
    pub fn remove_on_delete(&self, id: CallbackId) {
        self.db.queue(PendingMutation::RemoveOnDelete {
            table: self.index,
            id,
        });
    }

    /// Registers a callback fired when a primary-keyed row changes value.
    ///
    /// Never fires for tables without a primary key.
    pub fn on_update(
        &self,
        callback: impl FnMut(&EventContext, &ProductValue, &ProductValue) + Send + 'static,
    ) -> CallbackId {
        let id = CallbackId::next();
        self.db.queue(PendingMutation::AddOnUpdate {
            table: self.index,
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes an update callback.
    pub fn remove_on_update(&self, id: CallbackId) {
        self.db.queue(PendingMutation::RemoveOnUpdate {
            table: self.index,
            id,
        });
    }
}
