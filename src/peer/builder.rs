//! Peer builder.
//!
//! Provides a fluent builder API for configuring peers with handlers, an
//! injected id generator, and behavior settings.

use super::Peer;
use crate::peer_config::UnknownFunction;
use crate::protocol::{CounterIdGenerator, IdGeneratorPtr};
use crate::{Callable, DuplexPtr, PeerConfig, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`Peer`] instances.
///
/// # Examples
///
/// ## Serving functions with a call timeout
/// ```no_run
/// use duplex_rpc::{memory, Callable, Error, Peer};
/// use std::time::Duration;
///
/// # async fn example() -> duplex_rpc::Result<()> {
/// let (duplex, _other) = memory::pair();
///
/// let peer = Peer::builder(duplex)
///     .handler("echo", Callable::new(|args| async move {
///         Ok::<_, Error>(args.into_iter().next().unwrap_or_default())
///     }))
///     .call_timeout(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct PeerBuilder {
    // ---
    duplex: DuplexPtr,
    handlers: HashMap<String, Callable>,

    // Defaults to a fresh counter starting at "0"
    ids: Option<IdGeneratorPtr>,

    config: PeerConfig,
}

impl PeerBuilder {
    /// Create a builder over a shared duplex.
    pub fn new(duplex: DuplexPtr) -> Self {
        // ---
        Self {
            duplex,
            handlers: HashMap::new(),
            ids: None,
            config: PeerConfig::default(),
        }
    }

    /// Serve `callable` under `name`.
    pub fn handler(mut self, name: impl Into<String>, callable: Callable) -> Self {
        self.handlers.insert(name.into(), callable);
        self
    }

    /// Serve every `(name, callable)` pair.
    pub fn handlers<K, I>(mut self, handlers: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Callable)>,
    {
        self.handlers
            .extend(handlers.into_iter().map(|(name, f)| (name.into(), f)));
        self
    }

    /// Use a specific token generator instead of a fresh counter.
    ///
    /// Request ids and exported-callback tokens both come from it.
    pub fn id_generator(mut self, ids: IdGeneratorPtr) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PeerConfig) -> Self {
        self.config = config;
        self
    }

    /// Fail calls that get no reply within `timeout`.
    ///
    /// Default: wait indefinitely.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = Some(timeout);
        self
    }

    /// Choose what happens to requests for unknown functions.
    ///
    /// Default: [`UnknownFunction::Ignore`].
    pub fn unknown_function(mut self, policy: UnknownFunction) -> Self {
        self.config.unknown_function = policy;
        self
    }

    /// Subscribe to the duplex and start the peer (consumes self).
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<Peer> {
        // ---
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(CounterIdGenerator::new()));

        Peer::start(self.duplex, ids, self.config, self.handlers)
    }
}
