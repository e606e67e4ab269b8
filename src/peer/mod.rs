//! Peer facade.
//!
//! A [`Peer`] is what each side of a duplex holds. It serves the functions it
//! was built with, calls the functions of the other side, and routes callbacks
//! passed in either direction.

mod builder;
mod router;
mod stub;

pub use builder::PeerBuilder;
pub use stub::Stub;

use crate::codec::{self, Exporter, Importer};
use crate::correlation::CorrelationTable;
use crate::macros::{log_debug, log_info};
use crate::protocol::{IdGenerator, IdGeneratorPtr, Message, Serialized, Token};
use crate::sync::{lock_ignore_poison, read_ignore_poison, write_ignore_poison};
use crate::{
    // ---
    CallFuture,
    Callable,
    Duplex,
    DuplexPtr,
    Error,
    FromValue,
    IntoArgs,
    PeerConfig,
    Result,
    Value,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::task::JoinHandle;

/// One side of a bidirectional RPC connection.
///
/// Cloning is cheap; clones share the same correlation table and handlers.
/// Dropping the last clone stops the receive loop. Proxies handed out for
/// remote callbacks keep working only while the peer is alive.
///
/// # Example
///
/// ```no_run
/// use duplex_rpc::{memory, Callable, Error, Peer};
///
/// # async fn example() -> duplex_rpc::Result<()> {
/// let (server_side, client_side) = memory::pair();
///
/// let _server = Peer::builder(server_side)
///     .handler("add", Callable::typed(|(a, b): (i64, i64)| async move {
///         Ok::<_, Error>(a + b)
///     }))
///     .build()?;
///
/// let client = Peer::consumer(client_side)?;
/// let sum = client.call("add", (1, 2)).await?;
/// assert_eq!(sum.as_i64(), Some(3));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Peer {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    duplex: DuplexPtr,
    ids: IdGeneratorPtr,
    config: PeerConfig,

    // Pending calls and exported callbacks
    table: Mutex<CorrelationTable>,

    // Named functions served to the remote side
    handlers: RwLock<HashMap<String, Callable>>,

    rx_task: Mutex<Option<JoinHandle<()>>>,
}

impl Peer {
    /// Start building a peer over `duplex`.
    pub fn builder<D: Duplex + 'static>(duplex: D) -> PeerBuilder {
        // ---
        PeerBuilder::new(Arc::new(duplex))
    }

    /// Create a peer serving `handlers` with default settings.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new<D, K, I>(duplex: D, handlers: I) -> Result<Self>
    where
        D: Duplex + 'static,
        K: Into<String>,
        I: IntoIterator<Item = (K, Callable)>,
    {
        // ---
        Self::builder(duplex).handlers(handlers).build()
    }

    /// Create a peer that only calls and serves nothing.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn consumer<D: Duplex + 'static>(duplex: D) -> Result<Self> {
        // ---
        Self::builder(duplex).build()
    }

    // Subscribe to the duplex and start the receive loop.
    fn start(
        duplex: DuplexPtr,
        ids: IdGeneratorPtr,
        config: PeerConfig,
        handlers: HashMap<String, Callable>,
    ) -> Result<Self> {
        // ---
        let inbox = duplex.on_message()?;

        let inner = Arc::new(Inner {
            duplex,
            ids,
            config,
            table: Mutex::new(CorrelationTable::new()),
            handlers: RwLock::new(handlers),
            rx_task: Mutex::new(None),
        });

        let task = tokio::spawn(router::receive_loop(Arc::downgrade(&inner), inbox));
        *lock_ignore_poison(&inner.rx_task) = Some(task);

        Ok(Self { inner })
    }

    /// Call a function of the remote peer by name.
    ///
    /// The request is sent before this returns. The future resolves to the
    /// remote result, or fails with [`Error::Remote`] carrying the remote
    /// cause when the callee failed.
    pub fn call(&self, name: &str, args: impl IntoArgs) -> CallFuture {
        // ---
        self.inner.invoke(name, args.into_args())
    }

    /// Typed call stub for one remote function.
    pub fn stub<A, R>(&self, name: &str) -> Stub<A, R>
    where
        A: IntoArgs,
        R: FromValue + Send + 'static,
    {
        // ---
        Stub::new(self.clone(), name)
    }

    /// Serve `callable` under `name`, replacing any earlier handler.
    pub fn register(&self, name: impl Into<String>, callable: Callable) {
        // ---
        let name = name.into();
        log_debug!("registering handler {name}");
        write_ignore_poison(&self.inner.handlers).insert(name, callable);
    }

    /// True if a handler is served under `name`.
    pub fn has_handler(&self, name: &str) -> bool {
        read_ignore_poison(&self.inner.handlers).contains_key(name)
    }

    /// Discard every pending call and exported callback.
    ///
    /// Callers awaiting a discarded call observe [`Error::Cancelled`].
    /// Responses that arrive later for those ids are ignored, and remote
    /// calls to discarded callbacks are treated as unknown functions.
    pub fn clean(&self) {
        // ---
        let dropped = lock_ignore_poison(&self.inner.table).clear();
        log_info!("cleaned {dropped} correlation entries");
    }

    /// Clean, stop receiving, and close the duplex.
    pub async fn shutdown(&self) -> Result<()> {
        // ---
        self.clean();

        let task = lock_ignore_poison(&self.inner.rx_task).take();
        if let Some(task) = task {
            task.abort();
        }

        self.inner.duplex.close().await
    }

    /// Number of outbound calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        lock_ignore_poison(&self.inner.table).pending_len()
    }

    /// Number of local callables currently exported to the remote side.
    pub fn exported_functions(&self) -> usize {
        lock_ignore_poison(&self.inner.table).export_len()
    }
}

impl Inner {
    // ---

    /// Send a request and return the future of its settlement.
    pub(crate) fn invoke(self: &Arc<Self>, function_id: &str, args: Vec<Value>) -> CallFuture {
        // ---
        let (request_id, rx, args) = {
            let mut table = lock_ignore_poison(&self.table);

            // Request id first, then any callables inside the arguments.
            let request_id = self.ids.generate();
            let rx = table.register(request_id.clone());

            let mut exporter = TableExporter {
                table: &mut table,
                ids: self.ids.as_ref(),
            };
            let args: Vec<Serialized> = args
                .iter()
                .map(|arg| codec::serialize(arg, &mut exporter))
                .collect();

            (request_id, rx, args)
        };

        log_debug!("calling {function_id} as request {request_id}");

        let message = Message::Request {
            function_id: function_id.to_string(),
            request_id: request_id.clone(),
            args,
        };

        if let Err(e) = self.send(&message) {
            lock_ignore_poison(&self.table).remove(&request_id);
            return Box::pin(async move { Err::<Value, _>(e) });
        }

        let peer = Arc::downgrade(self);
        let timeout = self.config.call_timeout;

        Box::pin(async move {
            let settled = match timeout {
                None => rx.await,
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(settled) => settled,
                    Err(_) => {
                        if let Some(inner) = peer.upgrade() {
                            lock_ignore_poison(&inner.table).remove(&request_id);
                        }
                        return Err(Error::Timeout);
                    }
                },
            };

            // A closed channel means the entry was cleared before settling.
            settled.unwrap_or_else(|_| Err(Error::Cancelled))
        })
    }

    /// Serialize a value, exporting any callables it contains.
    pub(crate) fn serialize(&self, value: &Value) -> Serialized {
        // ---
        let mut table = lock_ignore_poison(&self.table);
        let mut exporter = TableExporter {
            table: &mut table,
            ids: self.ids.as_ref(),
        };
        codec::serialize(value, &mut exporter)
    }

    /// Deserialize a value, turning function tokens into proxies to this peer.
    pub(crate) fn deserialize(self: &Arc<Self>, serialized: Serialized) -> Value {
        // ---
        let importer = ProxyImporter {
            peer: Arc::downgrade(self),
        };
        codec::deserialize(serialized, &importer)
    }

    /// Resolve a function id: exported callbacks first, then named handlers.
    pub(crate) fn lookup(&self, function_id: &str) -> Option<Callable> {
        // ---
        let exported = lock_ignore_poison(&self.table).exported(&Token::from(function_id));
        exported.or_else(|| read_ignore_poison(&self.handlers).get(function_id).cloned())
    }

    pub(crate) fn send(&self, message: &Message) -> Result<()> {
        // ---
        let payload = message.encode()?;
        self.duplex.send(payload)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = lock_ignore_poison(&self.rx_task).take() {
            task.abort();
        }
    }
}

struct TableExporter<'a> {
    table: &'a mut CorrelationTable,
    ids: &'a dyn IdGenerator,
}

impl Exporter for TableExporter<'_> {
    fn export(&mut self, callable: &Callable) -> Token {
        // ---
        let token = self.ids.generate();
        self.table.export(token.clone(), callable.clone());
        token
    }
}

struct ProxyImporter {
    peer: Weak<Inner>,
}

impl Importer for ProxyImporter {
    fn import(&self, token: Token) -> Callable {
        // ---
        let peer = self.peer.clone();
        Callable::from_fn(move |args| match peer.upgrade() {
            Some(inner) => inner.invoke(token.as_str(), args),
            None => Box::pin(async { Err::<Value, _>(Error::Closed) }),
        })
    }
}
