//! Single-slot response delivery.
//!
//! Every call gets a `tokio::sync::oneshot` pair. The [`Responder`] half is
//! stored inside the registry entry, so only code that has removed the
//! entry can deliver, and `deliver` consumes it. A second delivery for the
//! same request cannot be written.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::CoreError;

/// Raw JSON result of a call, or the error that resolved it.
pub type Reply = Result<serde_json::Value, CoreError>;

pub(crate) struct Responder {
    id: u64,
    tx: oneshot::Sender<Reply>,
}

impl Responder {
    pub(crate) fn deliver(self, reply: Reply) {
        if self.tx.send(reply).is_err() {
            trace!(rpc.id = self.id, "caller dropped response future");
        }
    }
}

pub(crate) fn channel(id: u64) -> (Responder, ResponseFuture) {
    let (tx, rx) = oneshot::channel();
    (Responder { id, tx }, ResponseFuture { id: Some(id), rx })
}

/// Promise of the raw result of one call.
///
/// Await it (or call [`receive`](Self::receive)) to get the reply. Method
/// wrappers decode the returned JSON into their own result types.
#[derive(Debug)]
pub struct ResponseFuture {
    id: Option<u64>,
    rx: oneshot::Receiver<Reply>,
}

impl ResponseFuture {
    /// A future that already holds `err`. Used for calls that fail before
    /// they are registered.
    pub fn failed(err: CoreError) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        Self { id: None, rx }
    }

    /// Request ID, or `None` if the call failed before an ID was assigned.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub async fn receive(self) -> Reply {
        self.await
    }

    /// Blocking variant for callers outside an async context. Panics if
    /// called from within a Tokio runtime worker.
    pub fn blocking_receive(self) -> Reply {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(CoreError::ClientShutdown))
    }
}

impl Future for ResponseFuture {
    type Output = Reply;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped responder means the client went away without answering.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(CoreError::ClientShutdown)))
    }
}
