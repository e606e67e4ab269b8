//! Callback and subscription demo over an in-memory duplex.
//!
//! A server exposes plain functions, a function that calls back into the
//! client, and a subscription that pushes notifications until the client
//! unsubscribes.
//!
//! Run with: cargo run --example notifications
//!
//! Set `RUST_LOG=duplex_rpc=debug` to watch the messages being routed.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use duplex_rpc::{memory, Callable, Error, Json, Peer, Result, Value};

#[derive(Debug, Serialize, Deserialize)]
struct Notification {
    seq: u64,
    text: String,
}

fn server_handlers() -> Vec<(&'static str, Callable)> {
    // ---
    vec![
        (
            "add",
            Callable::typed(|(a, b): (i64, i64)| async move { Ok::<_, Error>(a + b) }),
        ),
        (
            "sub",
            Callable::typed(|(a, b): (i64, i64)| async move { Ok::<_, Error>(a - b) }),
        ),
        (
            "callbackExample",
            Callable::typed(|(x, f): (i64, Callable)| async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                f.call((x * x,)).await?;
                Ok::<_, Error>(())
            }),
        ),
        (
            "subscribeToNotifications",
            Callable::typed(|(notify,): (Callable,)| async move {
                let task = tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(Duration::from_millis(100));
                    for seq in 0.. {
                        ticker.tick().await;
                        let note = Notification {
                            seq,
                            text: format!("notification #{seq}"),
                        };
                        let Ok(note) = Value::from_serde(&note) else {
                            break;
                        };
                        if notify.call((note,)).await.is_err() {
                            break;
                        }
                    }
                });

                let unsubscribe = Callable::new(move |_| {
                    task.abort();
                    async { Ok::<_, Error>(()) }
                });
                Ok::<_, Error>(Value::object([("unsubscribe", unsubscribe)]))
            }),
        ),
        (
            "throws",
            Callable::new(|_| async { Err::<Value, _>("this function always fails") }),
        ),
    ]
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (server_side, client_side) = memory::pair();
    let server = Peer::new(server_side, server_handlers())?;
    let client = Peer::consumer(client_side)?;

    // --- plain calls
    let add = client.stub::<(i64, i64), i64>("add");
    println!("1 + 2 = {}", add.call((1, 2)).await?);
    println!("1 - 2 = {}", client.call("sub", (1, 2)).await?.as_i64().unwrap_or_default());

    // --- callback
    let print_square = Callable::typed(|(square,): (i64,)| async move {
        println!("callback received {square}");
        Ok::<_, Error>(())
    });
    client.call("callbackExample", (7, print_square)).await?;

    // --- subscription
    let on_notification = Callable::typed(|(Json(note),): (Json<Notification>,)| async move {
        println!("#{}: {}", note.seq, note.text);
        Ok::<_, Error>(())
    });
    let subscription = client
        .call("subscribeToNotifications", (on_notification,))
        .await?;

    tokio::time::sleep(Duration::from_millis(550)).await;

    if let Some(unsubscribe) = subscription.get("unsubscribe").and_then(Value::as_function) {
        unsubscribe.call(()).await?;
        println!("unsubscribed");
    }

    // --- remote failure
    match client.call("throws", ()).await {
        Ok(value) => println!("unexpected success: {value:?}"),
        Err(e) => println!("remote error: {e}"),
    }

    client.shutdown().await?;
    server.shutdown().await?;
    Ok(())
}
