// src/domain/duplex.rs

//! Duplex domain abstractions.
//!
//! A duplex is the only thing the RPC layer needs from the outside world: a
//! way to send one text message to the other side and a way to receive the
//! messages the other side sends. It intentionally avoids any reference to
//! concrete protocols, sockets, or framing.
//!
//! Ordering, delivery, and reconnection are the duplex's business. Higher-level
//! semantics such as request correlation are handled by the peer.
//!
//! Concrete implementations of this interface live under `src/duplex/`.
use crate::Result;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Receiving side of a duplex, returned from [`Duplex::on_message`].
///
/// The registration stays active until the handle is dropped, the duplex
/// registers a newer inbox, or the duplex is closed.
///
/// # Example
///
/// ```no_run
/// # use duplex_rpc::{Duplex, memory};
/// # async fn example() -> duplex_rpc::Result<()> {
/// let (left, right) = memory::pair();
///
/// let mut inbox = right.on_message()?;
/// left.send("hello".to_string())?;
///
/// while let Some(payload) = inbox.messages.recv().await {
///     println!("Received: {payload}");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Inbox {
    // ---
    /// Whole messages in delivery order.
    pub messages: mpsc::UnboundedReceiver<String>,
}

/// Full-duplex message channel.
///
/// Implementations must ensure that:
/// - `send()` only enqueues; it never waits on the remote side.
/// - Each delivered payload is one whole message as passed to `send()`.
/// - Only the most recently registered inbox receives messages. Registering
///   more than one is allowed but earlier registrations stop receiving.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Consumers should treat `close` as a normal
/// `async fn`.
#[async_trait::async_trait]
pub trait Duplex: Send + Sync {
    // ---
    /// Enqueue one message for delivery to the other side.
    fn send(&self, payload: String) -> Result<()>;

    /// Register the message sink, replacing any earlier one.
    fn on_message(&self) -> Result<Inbox>;

    /// Close the channel and release any associated resources.
    ///
    /// Default implementation does nothing.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared duplex pointer.
///
/// This is an `Arc<dyn Duplex>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - Multiple clones share the same underlying channel
pub type DuplexPtr = Arc<dyn Duplex>;
