use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Opaque identifier shared by request correlation and exported callbacks.
///
/// Request ids and function-export tokens are drawn from the same generator,
/// so a token never names both an in-flight call and an exported callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    // ---

    /// Borrow the token as a string slice
    pub fn as_str(&self) -> &str {
        // ---
        &self.0
    }
}

impl fmt::Display for Token {
    // ---

    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.write_str(&self.0)
    }
}

impl From<String> for Token {
    // ---

    fn from(s: String) -> Self {
        // ---
        Self(s)
    }
}

impl From<&str> for Token {
    // ---

    fn from(s: &str) -> Self {
        // ---
        Self(s.to_string())
    }
}

/// Source of unique tokens for one peer.
///
/// Uniqueness is only required per peer instance while a call is in flight.
/// Implementations must be safe to call from several tasks at once; the
/// relative order of concurrent `generate()` calls is unspecified.
pub trait IdGenerator: Send + Sync {
    /// Produce a token never returned before by this generator.
    fn generate(&self) -> Token;
}

/// Shared generator pointer, injected into a peer at construction.
pub type IdGeneratorPtr = Arc<dyn IdGenerator>;

/// Monotonic counter starting at 0, rendered as a decimal string.
#[derive(Debug, Default)]
pub struct CounterIdGenerator {
    next: AtomicU64,
}

impl CounterIdGenerator {
    /// Create a generator whose first token is `"0"`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for CounterIdGenerator {
    fn generate(&self) -> Token {
        // ---
        Token(self.next.fetch_add(1, Ordering::Relaxed).to_string())
    }
}
