mod common;

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use duplex_rpc::{Callable, Error, Peer, Result, StreamDuplex, Value};

use common::{init_logging, recorder, WAIT};

/// Accept one connection and serve `add` and `cb` on it.
async fn spawn_server() -> Result<(std::net::SocketAddr, tokio::sync::oneshot::Receiver<Peer>)> {
    // ---
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

    tokio::spawn(async move {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let server = Peer::builder(StreamDuplex::from_tcp(stream))
            .handler(
                "add",
                Callable::typed(|(a, b): (i64, i64)| async move { Ok::<_, Error>(a + b) }),
            )
            .handler(
                "cb",
                Callable::typed(|(x, f): (i64, Callable)| async move {
                    f.call((x * x,)).await?;
                    Ok::<_, Error>(())
                }),
            )
            .build();

        if let Ok(server) = server {
            let _ = ready_tx.send(server);
        }
    });

    Ok((addr, ready_rx))
}

#[tokio::test]
async fn test_calls_over_tcp() -> Result<()> {
    // ---
    init_logging();

    let (addr, ready) = spawn_server().await?;
    let client = Peer::consumer(StreamDuplex::from_tcp(TcpStream::connect(addr).await?))?;

    // The server must be listening on its inbox before the first frame lands.
    let _server = timeout(WAIT, ready).await.expect("server not ready").expect("server failed");

    let sum = timeout(WAIT, client.call("add", (40, 2))).await.expect("no reply")?;
    assert_eq!(sum.as_i64(), Some(42));

    let (f, mut seen) = recorder(());
    timeout(WAIT, client.call("cb", (9, f))).await.expect("no reply")?;
    assert_eq!(seen.recv().await, Some(vec![Value::from(81)]));

    client.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_remote_close_leaves_calls_unanswered() -> Result<()> {
    // ---
    init_logging();

    let (addr, ready) = spawn_server().await?;
    let client = Peer::builder(StreamDuplex::from_tcp(TcpStream::connect(addr).await?))
        .call_timeout(Duration::from_millis(100))
        .build()?;

    let server = timeout(WAIT, ready).await.expect("server not ready").expect("server failed");
    server.shutdown().await?;

    // Give the client's reader time to see the end of stream.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Writing to a half-closed socket may still succeed locally; either way
    // the call never settles with a value.
    let outcome = client.call("add", (1, 1)).await;
    assert!(matches!(outcome, Err(Error::Timeout) | Err(Error::Duplex(_))));
    assert_eq!(client.pending_calls(), 0);
    Ok(())
}
