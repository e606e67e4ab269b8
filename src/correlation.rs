use crate::protocol::Token;
use crate::{Callable, Result, Value};
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Sender side of a call awaiting its single response or error.
pub(crate) type Continuation = oneshot::Sender<Result<Value>>;

/// An entry of the correlation table.
pub(crate) enum Entry {
    /// Outbound call awaiting exactly one response or error. Removed when settled.
    Pending(Continuation),

    /// Local callable exported to the remote peer. Invoked any number of
    /// times and removed only by `clear()`.
    Export(Callable),
}

/// What the router should do with an inbound `response`.
pub(crate) enum Delivery {
    /// Settle the one-shot continuation; the entry is already removed.
    Settle(Continuation),

    /// Call the exported function with the response data; the entry stays.
    Invoke(Callable),
}

/// Maps tokens to pending continuations or exported callables.
///
/// When a response arrives, its `requestId` selects the entry that receives
/// it. Exported callables share the same table so a request naming an export
/// token can be routed back to the function.
pub(crate) struct CorrelationTable {
    // ---
    entries: HashMap<Token, Entry>,
}

impl CorrelationTable {
    // ---

    /// Create an empty table
    pub fn new() -> Self {
        // ---
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a pending call
    ///
    /// Returns a receiver that is settled when the response or error arrives,
    /// or closed if the entry is cleared first.
    pub fn register(&mut self, token: Token) -> oneshot::Receiver<Result<Value>> {
        // ---
        let (tx, rx) = oneshot::channel();
        self.entries.insert(token, Entry::Pending(tx));
        rx
    }

    /// Register an exported callable under `token`
    pub fn export(&mut self, token: Token, callable: Callable) {
        // ---
        self.entries.insert(token, Entry::Export(callable));
    }

    /// Find the exported callable named by an inbound request
    pub fn exported(&self, token: &Token) -> Option<Callable> {
        // ---
        match self.entries.get(token) {
            Some(Entry::Export(callable)) => Some(callable.clone()),
            _ => None,
        }
    }

    /// Route an inbound response
    ///
    /// Pending entries are removed (one-shot); exports are left in place.
    pub fn route_response(&mut self, token: &Token) -> Option<Delivery> {
        // ---
        if let Some(callable) = self.exported(token) {
            return Some(Delivery::Invoke(callable));
        }
        self.take_pending(token).map(Delivery::Settle)
    }

    /// Take the continuation of a pending call, removing it
    ///
    /// Exports are never taken.
    pub fn take_pending(&mut self, token: &Token) -> Option<Continuation> {
        // ---
        if !matches!(self.entries.get(token), Some(Entry::Pending(_))) {
            return None;
        }
        match self.entries.remove(token) {
            Some(Entry::Pending(tx)) => Some(tx),
            _ => None,
        }
    }

    /// Remove an entry of either kind without settling it
    ///
    /// Used for timeout and failed-send cleanup.
    pub fn remove(&mut self, token: &Token) -> bool {
        // ---
        self.entries.remove(token).is_some()
    }

    /// Drop every entry; returns how many were removed
    ///
    /// Pending receivers observe a closed channel.
    pub fn clear(&mut self) -> usize {
        // ---
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of calls awaiting settlement
    pub fn pending_len(&self) -> usize {
        // ---
        self.entries
            .values()
            .filter(|e| matches!(e, Entry::Pending(_)))
            .count()
    }

    /// Number of exported callables
    pub fn export_len(&self) -> usize {
        // ---
        self.entries.len() - self.pending_len()
    }
}
