//! Bidirectional RPC over any full-duplex message channel
//!
//! Two peers, each exposing a set of asynchronous named functions, call each
//! other's functions with structured arguments. Functions can be passed as
//! arguments or returned as results: the receiving side gets a proxy that
//! calls back across the channel, which makes callbacks and long-lived
//! subscriptions work in both directions.
//!
//! The channel itself is abstract. Anything that can send a text message and
//! deliver the other side's messages implements [`Duplex`]; an in-memory hub
//! and a length-prefixed byte-stream adapter are provided.
//!
//! ```no_run
//! use duplex_rpc::{memory, Callable, Error, Peer, Value};
//!
//! # async fn example() -> duplex_rpc::Result<()> {
//! let (server_side, client_side) = memory::pair();
//!
//! // Calls `on_tick` with a counter until the returned `unsubscribe` is called.
//! let _server = Peer::builder(server_side)
//!     .handler("ticks", Callable::typed(|(on_tick,): (Callable,)| async move {
//!         let task = tokio::spawn(async move {
//!             for n in 0.. {
//!                 let _ = on_tick.call((n,)).await;
//!             }
//!         });
//!         let unsubscribe = Callable::new(move |_| {
//!             task.abort();
//!             async { Ok::<_, Error>(()) }
//!         });
//!         Ok::<_, Error>(Value::object([("unsubscribe", unsubscribe)]))
//!     }))
//!     .build()?;
//!
//! let client = Peer::consumer(client_side)?;
//! let on_tick = Callable::new(|args| async move {
//!     println!("tick {:?}", args.first());
//!     Ok::<_, Error>(())
//! });
//! let subscription = client.call("ticks", (on_tick,)).await?;
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod macros;

mod codec;
mod correlation;
mod domain;
mod duplex;
mod peer;
mod protocol;
mod sync;
mod value;

mod peer_config;

mod error;

// Re-export main types
pub use peer::{Peer, PeerBuilder, Stub};

pub use peer_config::{PeerConfig, UnknownFunction};

pub use error::{Error, Result};

pub use protocol::{CounterIdGenerator, IdGenerator, IdGeneratorPtr, Message, Serialized, Token};

pub use value::{BoxFuture, CallFuture, Callable, FromArgs, FromValue, IntoArgs, Json, Value};

// --- duplex re-exports
pub use domain::{
    //
    Duplex,
    DuplexPtr,
    Inbox,
};

pub use duplex::{memory, MemoryDuplex, MemoryHub, StreamDuplex, MAX_FRAME_SIZE};
