// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Once;
use std::time::Duration;

use duplex_rpc::{Callable, Error, Value};
use tokio::sync::mpsc;

static INIT: Once = Once::new();

/// Install a test-friendly tracing subscriber once per test binary.
///
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=duplex_rpc=debug`.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(2);

/// Callback that forwards its argument list to a channel and returns `ack`.
pub fn recorder(ack: impl Into<Value> + Clone + Send + Sync + 'static) -> (Callable, mpsc::UnboundedReceiver<Vec<Value>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callable = Callable::new(move |args: Vec<Value>| {
        let _ = tx.send(args);
        let ack = ack.clone();
        async move { Ok::<_, Error>(ack.into()) }
    });
    (callable, rx)
}
