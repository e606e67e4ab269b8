use super::Peer;
use crate::value::BoxFuture;
use crate::{FromValue, IntoArgs, Result};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Typed call stub for one remote function.
///
/// A set of stubs forms an explicit client interface for the remote side:
///
/// ```no_run
/// use duplex_rpc::{Peer, Stub};
///
/// struct MathClient {
///     add: Stub<(i64, i64), i64>,
///     sub: Stub<(i64, i64), i64>,
/// }
///
/// impl MathClient {
///     fn new(peer: &Peer) -> Self {
///         Self { add: peer.stub("add"), sub: peer.stub("sub") }
///     }
/// }
///
/// # async fn example(peer: Peer) -> duplex_rpc::Result<()> {
/// let math = MathClient::new(&peer);
/// let five = math.add.call((2, 3)).await?;
/// # Ok(())
/// # }
/// ```
pub struct Stub<A, R> {
    peer: Peer,
    name: Arc<str>,
    _signature: PhantomData<fn(A) -> R>,
}

impl<A, R> Stub<A, R>
where
    A: IntoArgs,
    R: FromValue + Send + 'static,
{
    pub(super) fn new(peer: Peer, name: &str) -> Self {
        Self {
            peer,
            name: Arc::from(name),
            _signature: PhantomData,
        }
    }

    /// Remote function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call the remote function and convert its result.
    ///
    /// The request is sent before this returns.
    pub fn call(&self, args: A) -> BoxFuture<'static, Result<R>> {
        // ---
        let call = self.peer.call(&self.name, args);
        Box::pin(async move { R::from_value(call.await?) })
    }
}

impl<A, R> Clone for Stub<A, R> {
    fn clone(&self) -> Self {
        Self {
            peer: self.peer.clone(),
            name: self.name.clone(),
            _signature: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for Stub<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub").field("name", &self.name).finish()
    }
}
