use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{CoreError, RpcError};

use super::stream::{NotificationHandler, StreamSender};

/// In-memory persistent connection. Records every payload written to it and
/// optionally fails every write, as a dead socket would.
#[derive(Default)]
pub struct MockStream {
    sent: Mutex<Vec<Vec<u8>>>,
    fail: AtomicBool,
}

impl MockStream {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: AtomicBool::new(true),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().expect("mock lock").clone()
    }

    /// Wait until at least `count` payloads have been written.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<Vec<u8>> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let sent = self.sent();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("stream worker must write queued payloads")
    }
}

#[async_trait]
impl StreamSender for MockStream {
    async fn send(&self, payload: &[u8]) -> Result<(), CoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RpcError::Stream("connection reset".to_owned()).into());
        }
        self.sent.lock().expect("mock lock").push(payload.to_vec());
        Ok(())
    }
}

/// [`MockStream`] whose writes park until the test releases them, so a send
/// can be held in flight across a reconnect.
pub struct GatedStream {
    gate: Semaphore,
    entered: AtomicUsize,
    inner: MockStream,
}

impl Default for GatedStream {
    fn default() -> Self {
        Self {
            gate: Semaphore::new(0),
            entered: AtomicUsize::new(0),
            inner: MockStream::default(),
        }
    }
}

impl GatedStream {
    /// Let `writes` parked sends through.
    pub fn release(&self, writes: usize) {
        self.gate.add_permits(writes);
    }

    /// Fail sends once they are released.
    pub fn set_failing(&self, fail: bool) {
        self.inner.set_failing(fail);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.sent()
    }

    /// Wait until `count` sends have reached the gate.
    pub async fn wait_for_entered(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.entered.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("stream worker must reach the gate");
    }
}

#[async_trait]
impl StreamSender for GatedStream {
    async fn send(&self, payload: &[u8]) -> Result<(), CoreError> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        self.gate.acquire().await.expect("gate open").forget();
        self.inner.send(payload).await
    }
}

/// Notification handler that keeps everything it is given.
#[derive(Default)]
pub struct RecordingNotifications {
    received: Mutex<Vec<(String, Vec<serde_json::Value>)>>,
}

impl RecordingNotifications {
    pub fn received(&self) -> Vec<(String, Vec<serde_json::Value>)> {
        self.received.lock().expect("mock lock").clone()
    }
}

impl NotificationHandler for RecordingNotifications {
    fn on_notification(&self, method: &str, params: &[serde_json::Value]) {
        self.received
            .lock()
            .expect("mock lock")
            .push((method.to_owned(), params.to_vec()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_payloads_until_failing() {
        let stream = MockStream::default();
        stream.send(b"one").await.expect("healthy stream");
        stream.set_failing(true);
        assert!(stream.send(b"two").await.is_err());
        assert_eq!(stream.sent(), vec![b"one".to_vec()]);
    }

    #[tokio::test]
    async fn gated_stream_holds_writes_until_released() {
        let stream = std::sync::Arc::new(GatedStream::default());
        let writer = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.send(b"held").await })
        };
        stream.wait_for_entered(1).await;
        assert!(stream.sent().is_empty());

        stream.release(1);
        writer.await.expect("join").expect("healthy stream");
        assert_eq!(stream.sent(), vec![b"held".to_vec()]);
    }
}
