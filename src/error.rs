use thiserror::Error;

/// Errors that can occur during RPC operations
#[derive(Error, Debug)]
pub enum Error {
    /// The remote callee failed; carries the remote cause verbatim
    #[error("{0}")]
    Remote(String),

    /// A local handler or callback failed; carries the cause verbatim
    #[error("{0}")]
    Handler(String),

    /// No handler or exported callback is registered under this id
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// The pending call was discarded by `clean()` or peer shutdown
    #[error("call abandoned: peer was cleaned")]
    Cancelled,

    /// Call timed out waiting for a response
    #[error("request timed out")]
    Timeout,

    /// The peer owning a remote proxy no longer exists
    #[error("peer is closed")]
    Closed,

    /// The underlying duplex refused the message
    #[error("duplex error: {0}")]
    Duplex(String),

    /// An inbound frame exceeds the configured maximum
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A value did not have the shape the caller asked for
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure on a byte-stream duplex
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for RPC operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_remote_display_is_verbatim() {
        // ---
        let err = Error::Remote("should reject".into());
        assert_eq!(err.to_string(), "should reject");
    }

    #[test]
    fn test_unknown_function_display() {
        // ---
        let err = Error::UnknownFunction("add".into());
        assert_eq!(err.to_string(), "unknown function: add");
    }
}
