//! In-memory duplex implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Duplex` trait. It is intended primarily for testing, local execution,
//! and as a reference for duplex semantics.
//!
//! ## Reference Semantics
//!
//! - A message sent by one endpoint is delivered to every *other* endpoint
//!   connected to the same hub, never back to the sender.
//! - Only the most recently registered inbox of an endpoint receives.
//! - Messages sent before an endpoint registers an inbox are not buffered
//!   for it.
//! - Delivery is in send order and nothing is dropped while the inbox lives.
//!
//! ## Non-Goals
//!
//! This duplex does not attempt to emulate network failure modes, latency,
//! or persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;

use crate::macros::{log_debug, log_info};
use crate::sync::{read_ignore_poison, write_ignore_poison};
use crate::{Duplex, Error, Inbox, Result};

/// Shared message bus for in-memory duplexes.
///
/// Simulates a broadcast server within a single process. All `MemoryDuplex`
/// endpoints connected to one hub receive each other's messages.
///
/// # Usage
///
/// For tests that need isolation between parallel cases, construct one hub
/// per test:
///
/// ```
/// # use duplex_rpc::{Duplex, MemoryHub};
/// let hub = MemoryHub::new();
/// let server = hub.connect();
/// let client = hub.connect();
/// # let _ = (server, client);
/// ```
#[derive(Default)]
pub struct MemoryHub {
    // ---
    endpoints: RwLock<HashMap<u64, Option<mpsc::UnboundedSender<String>>>>,
    next_id: AtomicU64,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::default())
    }

    /// Connect a new endpoint to the hub.
    pub fn connect(self: &Arc<Self>) -> MemoryDuplex {
        // ---
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        write_ignore_poison(&self.endpoints).insert(id, None);

        log_debug!("memory endpoint {id}: connected");

        MemoryDuplex {
            id,
            hub: self.clone(),
        }
    }

    /// Drop every inbox registration while keeping endpoints connected.
    pub fn clear(&self) {
        // ---
        for slot in write_ignore_poison(&self.endpoints).values_mut() {
            *slot = None;
        }
    }

    /// Number of connected endpoints.
    pub fn endpoint_count(&self) -> usize {
        read_ignore_poison(&self.endpoints).len()
    }

    fn publish(&self, from: u64, payload: String) -> Result<()> {
        // ---
        let endpoints = read_ignore_poison(&self.endpoints);

        if !endpoints.contains_key(&from) {
            return Err(Error::Duplex(format!("memory endpoint {from} is closed")));
        }

        for (id, slot) in endpoints.iter() {
            if *id == from {
                continue;
            }
            if let Some(tx) = slot {
                // A closed channel indicates a dropped Inbox.
                if let Err(_err) = tx.send(payload.clone()) {
                    log_info!("memory endpoint {id}: inbox dropped");
                }
            }
        }

        Ok(())
    }

    fn register(&self, id: u64) -> Result<Inbox> {
        // ---
        let (tx, rx) = mpsc::unbounded_channel();

        let mut endpoints = write_ignore_poison(&self.endpoints);
        match endpoints.get_mut(&id) {
            Some(slot) => *slot = Some(tx),
            None => return Err(Error::Duplex(format!("memory endpoint {id} is closed"))),
        }

        log_debug!("memory endpoint {id}: inbox registered");
        Ok(Inbox { messages: rx })
    }

    fn disconnect(&self, id: u64) {
        // ---
        if write_ignore_poison(&self.endpoints).remove(&id).is_some() {
            log_debug!("memory endpoint {id}: disconnected");
        }
    }
}

/// One endpoint of a [`MemoryHub`].
///
/// Dropping or closing the endpoint disconnects it from the hub.
pub struct MemoryDuplex {
    // ---
    id: u64,
    hub: Arc<MemoryHub>,
}

impl MemoryDuplex {
    /// The hub this endpoint is connected to.
    pub fn hub(&self) -> Arc<MemoryHub> {
        self.hub.clone()
    }
}

#[async_trait::async_trait]
impl Duplex for MemoryDuplex {
    // ---
    fn send(&self, payload: String) -> Result<()> {
        self.hub.publish(self.id, payload)
    }

    fn on_message(&self) -> Result<Inbox> {
        self.hub.register(self.id)
    }

    async fn close(&self) -> Result<()> {
        self.hub.disconnect(self.id);
        Ok(())
    }
}

impl Drop for MemoryDuplex {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}

/// Create two endpoints connected only to each other.
pub fn pair() -> (MemoryDuplex, MemoryDuplex) {
    // ---
    let hub = MemoryHub::new();
    (hub.connect(), hub.connect())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_ways_but_not_to_self() {
        // ---
        let (left, right) = pair();
        let mut left_inbox = left.on_message().unwrap();
        let mut right_inbox = right.on_message().unwrap();

        left.send("ping".into()).unwrap();
        right.send("pong".into()).unwrap();

        assert_eq!(right_inbox.messages.recv().await.as_deref(), Some("ping"));
        assert_eq!(left_inbox.messages.recv().await.as_deref(), Some("pong"));
        assert!(left_inbox.messages.try_recv().is_err());
        assert!(right_inbox.messages.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_latest_inbox_wins() {
        // ---
        let (left, right) = pair();
        let mut first = right.on_message().unwrap();
        let mut second = right.on_message().unwrap();

        left.send("hello".into()).unwrap();

        assert_eq!(second.messages.recv().await.as_deref(), Some("hello"));
        // The replaced sender was dropped, so the first inbox is closed.
        assert_eq!(first.messages.recv().await, None);
    }

    #[tokio::test]
    async fn test_broadcast_to_all_others() {
        // ---
        let hub = MemoryHub::new();
        let a = hub.connect();
        let b = hub.connect();
        let c = hub.connect();
        let mut b_inbox = b.on_message().unwrap();
        let mut c_inbox = c.on_message().unwrap();

        a.send("all".into()).unwrap();

        assert_eq!(b_inbox.messages.recv().await.as_deref(), Some("all"));
        assert_eq!(c_inbox.messages.recv().await.as_deref(), Some("all"));
        assert_eq!(hub.endpoint_count(), 3);
    }

    #[tokio::test]
    async fn test_closed_endpoint_rejects_send() {
        // ---
        let (left, right) = pair();
        left.close().await.unwrap();

        assert!(matches!(left.send("x".into()), Err(Error::Duplex(_))));
        assert!(left.on_message().is_err());
        assert_eq!(right.hub().endpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_clear_drops_registrations() {
        // ---
        let (left, right) = pair();
        let mut inbox = right.on_message().unwrap();

        right.hub().clear();
        left.send("lost".into()).unwrap();

        assert_eq!(inbox.messages.recv().await, None);
    }
}
