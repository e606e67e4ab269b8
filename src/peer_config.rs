//! Peer configuration.
//!
//! Holds no duplex-specific settings; duplex implementations carry their own.

use std::time::Duration;

/// What a peer does with a request naming a function it does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFunction {
    /// Drop the request without replying.
    #[default]
    Ignore,

    /// Reply with an `error` message reading `unknown function: <id>`.
    Reject,
}

/// Behavior settings for a [`Peer`](crate::Peer).
///
/// # Example
///
/// ```
/// use duplex_rpc::{PeerConfig, UnknownFunction};
/// use std::time::Duration;
///
/// let config = PeerConfig::default()
///     .with_call_timeout(Duration::from_secs(10))
///     .with_unknown_function(UnknownFunction::Reject);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PeerConfig {
    // ---
    /// How long an outbound call waits for its response or error.
    ///
    /// `None` waits indefinitely; connection-loss detection is then left to
    /// the duplex. On expiry the pending entry is removed and the call fails
    /// with [`Error::Timeout`](crate::Error::Timeout).
    ///
    /// Default: `None`
    pub call_timeout: Option<Duration>,

    /// Policy for requests to unknown function ids.
    ///
    /// Default: [`UnknownFunction::Ignore`]
    pub unknown_function: UnknownFunction,
}

impl PeerConfig {
    /// Set a per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Set the unknown-function policy.
    pub fn with_unknown_function(mut self, policy: UnknownFunction) -> Self {
        self.unknown_function = policy;
        self
    }
}
