//! In-flight reducer call tracking.
//!
//! Reducer calls are fire-and-forget; the server does not echo request ids
//! in transaction updates. An outcome is matched to a local call by reducer
//! name when the caller identity is our own, oldest call first. Request ids
//! start at 1.

use std::collections::{HashMap, VecDeque};

use wire::RequestId;

/// Tracks which reducer calls this connection has in flight.
#[derive(Debug)]
pub struct ReducerTracker {
    next_request_id: u32,
    in_flight: HashMap<Box<str>, VecDeque<RequestId>>,
}

impl Default for ReducerTracker {
    fn default() -> Self {
        Self {
            next_request_id: 1,
            in_flight: HashMap::new(),
        }
    }
}

impl ReducerTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a request id and records the call as in flight.
    pub fn begin_call(&mut self, reducer: &str) -> RequestId {
        let request_id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        self.in_flight
            .entry(reducer.into())
            .or_default()
            .push_back(request_id);
        request_id
    }

    /// Matches a reducer outcome to a local call.
    ///
    /// When `caller_is_local`, pops and returns the oldest in-flight request
    /// for that reducer; `None` means the outcome was someone else's call or
    /// one we never recorded.
    pub fn settle(&mut self, reducer: &str, caller_is_local: bool) -> Option<RequestId> {
        if !caller_is_local {
            return None;
        }
        let queue = self.in_flight.get_mut(reducer)?;
        let request_id = queue.pop_front();
        if queue.is_empty() {
            self.in_flight.remove(reducer);
        }
        request_id
    }

    /// Drops every in-flight call and returns how many were abandoned.
    ///
    /// Called on disconnect; outcomes for these calls will never arrive.
    pub fn abandon_all(&mut self) -> usize {
        let abandoned = self.in_flight.values().map(VecDeque::len).sum();
        self.in_flight.clear();
        abandoned
    }

    /// Number of calls awaiting an outcome.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.values().map(VecDeque::len).sum()
    }
}
