//! Seam to the persistent-connection transport.
//!
//! The socket, its framing and the reconnect loop live outside this crate.
//! A connector opens the connection described by
//! [`Client::stream_handshake`](super::Client::stream_handshake), hands the
//! client a [`StreamSender`] through [`Client::attach`](super::Client::attach)
//! and feeds every inbound frame to
//! [`Client::handle_message`](super::Client::handle_message).

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::CoreError;

use super::client::Shared;

/// Number of outbound payloads the stream queue holds before senders wait.
pub(crate) const SEND_BUFFER_SIZE: usize = 50;

/// Outbound half of a persistent connection.
#[async_trait]
pub trait StreamSender: Send + Sync {
    /// Write one complete JSON-RPC payload. An error means the connection is
    /// gone; the client detaches the sender and keeps pending requests for
    /// the next [`attach`](super::Client::attach).
    async fn send(&self, payload: &[u8]) -> Result<(), CoreError>;
}

/// Sink for server-pushed notifications.
pub trait NotificationHandler: Send + Sync {
    fn on_notification(&self, method: &str, params: &[serde_json::Value]);
}

pub(crate) struct StreamJob {
    pub(crate) id: u64,
    /// Connection generation current when the job was queued.
    pub(crate) generation: u64,
    pub(crate) payload: Vec<u8>,
}

pub(crate) async fn run_stream_worker(
    shared: Arc<Shared>,
    mut queue: mpsc::Receiver<StreamJob>,
) {
    loop {
        let job = tokio::select! {
            biased;
            () = shared.shutdown_signal().cancelled() => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        // Answered already (late shutdown drain, or a reply raced the queue).
        if !shared.registry.contains(job.id) {
            trace!(rpc.id = job.id, "skipping send for resolved request");
            continue;
        }

        let (sender, generation) = shared.current_sender();
        if job.generation != generation {
            trace!(
                rpc.id = job.id,
                queued = job.generation,
                generation,
                "request already resent on a newer connection"
            );
            continue;
        }
        let Some(sender) = sender else {
            debug!(rpc.id = job.id, "stream disconnected; request kept for resend");
            continue;
        };

        if let Err(err) = sender.send(&job.payload).await {
            warn!(rpc.id = job.id, error = %err, "stream send failed");
            shared.connection_lost(generation);
        }
    }
    debug!("stream send worker stopped");
}
