//! Inbound message routing.
//!
//! One receive loop per peer drains the duplex inbox in delivery order.
//! Requests start handler tasks that may finish in any order; responses and
//! errors settle pending calls inline.

use super::Inner;
use crate::correlation::Delivery;
use crate::macros::{log_debug, log_error, log_warn};
use crate::peer_config::UnknownFunction;
use crate::protocol::{Message, Serialized, Token};
use crate::sync::lock_ignore_poison;
use crate::{CallFuture, Callable, Error, Inbox, Value};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// Drain the inbox until it closes or the peer is dropped.
pub(super) async fn receive_loop(peer: Weak<Inner>, mut inbox: Inbox) {
    // ---
    log_debug!("receive loop started");

    while let Some(payload) = inbox.messages.recv().await {
        let Some(inner) = peer.upgrade() else {
            break;
        };
        dispatch(&inner, &payload);
    }

    log_debug!("receive loop stopped");
}

/// Decode one payload and route it.
pub(super) fn dispatch(inner: &Arc<Inner>, payload: &str) {
    // ---
    let message = match Message::decode(payload) {
        Ok(message) => message,
        Err(e) => {
            log_warn!("dropping malformed message: {e}");
            return;
        }
    };

    match message {
        Message::Request {
            function_id,
            request_id,
            args,
        } => handle_request(inner, function_id, request_id, args),
        Message::Response { request_id, data } => handle_response(inner, request_id, data),
        Message::Error { request_id, error } => handle_error(inner, request_id, error),
    }
}

fn handle_request(inner: &Arc<Inner>, function_id: String, request_id: Token, args: Vec<Serialized>) {
    // ---
    let Some(target) = inner.lookup(&function_id) else {
        match inner.config.unknown_function {
            UnknownFunction::Ignore => {
                log_debug!("no function {function_id}; request {request_id} dropped");
            }
            UnknownFunction::Reject => {
                let reply = Message::Error {
                    request_id,
                    error: Error::UnknownFunction(function_id).to_string(),
                };
                send_reply(inner, &reply);
            }
        }
        return;
    };

    let args: Vec<Value> = args.into_iter().map(|arg| inner.deserialize(arg)).collect();

    // Start the call here so handlers begin in delivery order.
    let call = match start_call(&target, args) {
        Ok(call) => call,
        Err(cause) => {
            log_warn!("handler {function_id} panicked for request {request_id}: {cause}");
            let reply = Message::Error {
                request_id,
                error: Error::Handler(format!("handler {function_id} panicked: {cause}")).to_string(),
            };
            send_reply(inner, &reply);
            return;
        }
    };
    let peer = Arc::downgrade(inner);

    tokio::spawn(async move {
        // A panicking handler fails its own task only; report it as an error.
        let outcome = match tokio::spawn(call).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(Error::Handler(format!(
                "handler {function_id} panicked: {}",
                panic_message(e.into_panic().as_ref())
            ))),
            Err(e) => Err(Error::Handler(format!("handler {function_id} did not finish: {e}"))),
        };

        let Some(inner) = peer.upgrade() else {
            log_debug!("peer dropped before request {request_id} completed");
            return;
        };

        let reply = match outcome {
            Ok(value) => Message::Response {
                request_id,
                data: inner.serialize(&value),
            },
            Err(e) => {
                log_debug!("{function_id} failed for request {request_id}: {e}");
                Message::Error {
                    request_id,
                    error: e.to_string(),
                }
            }
        };

        send_reply(&inner, &reply);
    });
}

fn handle_response(inner: &Arc<Inner>, request_id: Token, data: Serialized) {
    // ---
    let delivery = lock_ignore_poison(&inner.table).route_response(&request_id);

    match delivery {
        Some(Delivery::Settle(tx)) => {
            let value = inner.deserialize(data);
            if tx.send(Ok(value)).is_err() {
                log_debug!("caller of request {request_id} is gone");
            }
        }
        Some(Delivery::Invoke(callable)) => {
            // A response naming an exported callback calls it directly.
            let value = inner.deserialize(data);
            let call = match start_call(&callable, vec![value]) {
                Ok(call) => call,
                Err(cause) => {
                    log_warn!("callback {request_id} panicked: {cause}");
                    return;
                }
            };
            tokio::spawn(async move {
                if let Err(_e) = call.await {
                    log_debug!("callback {request_id} failed: {_e}");
                }
            });
        }
        None => {
            log_debug!("no pending call for response {request_id}; dropped");
        }
    }
}

fn handle_error(inner: &Arc<Inner>, request_id: Token, error: String) {
    // ---
    let pending = lock_ignore_poison(&inner.table).take_pending(&request_id);

    match pending {
        Some(tx) => {
            if tx.send(Err(Error::Remote(error))).is_err() {
                log_debug!("caller of request {request_id} is gone");
            }
        }
        None => {
            log_debug!("no pending call for error {request_id}; dropped: {error}");
        }
    }
}

/// Run the synchronous part of a callable, turning a panic into its message.
fn start_call(target: &Callable, args: Vec<Value>) -> Result<CallFuture, String> {
    // ---
    panic::catch_unwind(AssertUnwindSafe(|| target.call(args)))
        .map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    // ---
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn send_reply(inner: &Inner, reply: &Message) {
    // ---
    if let Err(e) = inner.send(reply) {
        log_error!("failed to send reply: {e}");
    }
}
