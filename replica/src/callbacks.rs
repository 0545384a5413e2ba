//! Ordered callback sets with deferred add/remove.
//!
//! A set holds an ordered list of `(id, handler)` pairs plus a buffer of
//! pending changes. Adds and removes go into the buffer and are swapped in
//! by [`CallbackSet::apply_pending`], which the dispatcher calls between
//! diffs, so a handler registered or removed while diff N is dispatching
//! first takes effect for diff N+1.

use std::sync::atomic::{AtomicU64, Ordering};

use sats::ProductValue;

use crate::event::ReducerEvent;

/// A handle identifying one registered callback.
///
/// Ids come from a process-wide counter so a handle minted outside the
/// processing loop can travel to the set through a mutation queue without
/// colliding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Mints a fresh id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Row insert/delete callback: receives the context and the row.
pub type RowCallback<Ctx> = dyn FnMut(&Ctx, &ProductValue) + Send;

/// Row update callback: receives the context, the old row, and the new row.
pub type UpdateCallback<Ctx> = dyn FnMut(&Ctx, &ProductValue, &ProductValue) + Send;

/// Reducer outcome callback: receives the context and the event.
pub type ReducerCallback<Ctx> = dyn FnMut(&Ctx, &ReducerEvent) + Send;

enum PendingChange<F: ?Sized> {
    Add(CallbackId, Box<F>),
    Remove(CallbackId),
}

/// An ordered set of callbacks with deferred membership changes.
pub struct CallbackSet<F: ?Sized> {
    active: Vec<(CallbackId, Box<F>)>,
    pending: Vec<PendingChange<F>>,
}

impl<F: ?Sized> Default for CallbackSet<F> {
    fn default() -> Self {
        Self {
            active: Vec::new(),
            pending: Vec::new(),
        }
    }
}

impl<F: ?Sized> CallbackSet<F> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a callback for addition under the given id.
    ///
    /// The callback does not fire until [`apply_pending`](Self::apply_pending)
    /// runs.
    pub fn add(&mut self, id: CallbackId, callback: Box<F>) {
        self.pending.push(PendingChange::Add(id, callback));
    }

    /// Buffers a callback for removal.
    ///
    /// The callback keeps firing for the diff currently being dispatched.
    pub fn remove(&mut self, id: CallbackId) {
        self.pending.push(PendingChange::Remove(id));
    }

    /// Applies buffered adds and removes, in the order they were requested.
    pub fn apply_pending(&mut self) {
        for change in self.pending.drain(..) {
            match change {
                PendingChange::Add(id, callback) => self.active.push((id, callback)),
                PendingChange::Remove(id) => self.active.retain(|(have, _)| *have != id),
            }
        }
    }

    /// Number of active callbacks (pending changes not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Returns `true` if no callbacks are active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Invokes `run` once per active callback, in registration order.
    pub fn for_each(&mut self, mut run: impl FnMut(&mut F)) {
        for (_, callback) in &mut self.active {
            run(callback);
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for CallbackSet<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSet")
            .field("active", &self.active.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type TestCallback = dyn FnMut(&(), &u32) + Send;

    fn counter_callback(counter: &Arc<AtomicUsize>) -> Box<TestCallback> {
        let counter = Arc::clone(counter);
        Box::new(move |(), _| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn added_callback_waits_for_apply_pending() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut set: CallbackSet<TestCallback> = CallbackSet::new();
        set.add(CallbackId::next(), counter_callback(&counter));

        set.for_each(|cb| cb(&(), &0));
        assert_eq!(counter.load(Ordering::SeqCst), 0, "not yet applied");

        set.apply_pending();
        set.for_each(|cb| cb(&(), &0));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_callback_fires_until_apply_pending() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut set: CallbackSet<TestCallback> = CallbackSet::new();
        let id = CallbackId::next();
        set.add(id, counter_callback(&counter));
        set.apply_pending();

        set.remove(id);
        set.for_each(|cb| cb(&(), &0));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "still active this diff");

        set.apply_pending();
        set.for_each(|cb| cb(&(), &0));
        assert_eq!(counter.load(Ordering::SeqCst), 1, "gone after swap");
        assert!(set.is_empty());
    }

    #[test]
    fn callbacks_fire_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut set: CallbackSet<TestCallback> = CallbackSet::new();
        for label in 0..3u32 {
            let order = Arc::clone(&order);
            set.add(
                CallbackId::next(),
                Box::new(move |(), _| order.lock().unwrap().push(label)),
            );
        }
        set.apply_pending();
        set.for_each(|cb| cb(&(), &0));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn minted_ids_are_unique() {
        let a = CallbackId::next();
        let b = CallbackId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn add_then_remove_before_apply_never_fires() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut set: CallbackSet<TestCallback> = CallbackSet::new();
        let id = CallbackId::next();
        set.add(id, counter_callback(&counter));
        set.remove(id);
        set.apply_pending();
        set.for_each(|cb| cb(&(), &0));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
