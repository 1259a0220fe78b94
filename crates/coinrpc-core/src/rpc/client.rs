use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::{ConnConfig, StreamHandshake};
use crate::error::CoreError;

use super::command::Command;
use super::context::CallContext;
use super::decoder::{self, DropReason, Inbound};
use super::future::{self, Reply, ResponseFuture};
use super::http_adapter::{self, HttpPoster, PostJob, SEND_POST_BUFFER_SIZE};
use super::protocol::marshal_request;
use super::registry::{PendingRequest, Registry};
use super::stream::{self, NotificationHandler, StreamJob, StreamSender, SEND_BUFFER_SIZE};

// ==============================================================================
// Shared state
// ==============================================================================

#[derive(Default)]
struct ConnState {
    ever_attached: bool,
    disconnected: bool,
    sender: Option<Arc<dyn StreamSender>>,
    /// Bumped by every attach. Stream jobs carry the generation they were
    /// queued under; older jobs were already resent by the attach.
    generation: u64,
}

/// State reachable from both the client handle and its background workers.
pub(crate) struct Shared {
    config: ConnConfig,
    next_id: AtomicU64,
    pub(crate) registry: Registry,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    conn: Mutex<ConnState>,
    notifications: Option<Arc<dyn NotificationHandler>>,
    dropped: AtomicU64,
}

impl Shared {
    fn conn(&self) -> MutexGuard<'_, ConnState> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn shutdown_signal(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Remove request `id` and deliver `reply` to it. Returns `false` if the
    /// request was no longer pending.
    pub(crate) fn complete(&self, id: u64, reply: Reply) -> bool {
        match self.registry.remove(id) {
            Some(request) => {
                debug!(rpc.id = id, rpc.method = %request.method, ok = reply.is_ok(), "rpc reply");
                request.responder.deliver(reply);
                true
            }
            None => false,
        }
    }

    /// The attached sender, if any, and the connection generation.
    pub(crate) fn current_sender(&self) -> (Option<Arc<dyn StreamSender>>, u64) {
        let conn = self.conn();
        (conn.sender.clone(), conn.generation)
    }

    /// Connection `generation` went away. Pending requests stay registered
    /// for resend unless auto-reconnect is disabled, in which case they fail
    /// with `ClientDisconnected` and the client shuts down. A stale
    /// generation is ignored, so a late failure on an old sender cannot
    /// detach its replacement.
    pub(crate) fn connection_lost(&self, generation: u64) {
        {
            let mut conn = self.conn();
            if conn.generation != generation {
                return;
            }
            if conn.sender.take().is_none() && conn.disconnected {
                return;
            }
            conn.disconnected = true;
        }

        if self.config.disable_auto_reconnect {
            info!("rpc connection lost and auto-reconnect disabled; shutting down");
            self.close(|| CoreError::ClientDisconnected);
        } else {
            info!(
                pending = self.registry.len(),
                "rpc connection lost; pending requests kept for resend"
            );
        }
    }

    fn shutdown(&self) {
        self.close(|| CoreError::ClientShutdown);
    }

    /// First caller drains the registry, answering every pending request
    /// with `reason()`, and stops the workers. Later callers do nothing.
    fn close(&self, reason: fn() -> CoreError) {
        if !self.registry.close() {
            return;
        }
        // No add can succeed once closed, so this drain is final.
        let drained = self.registry.drain_all();
        info!(pending = drained.len(), "rpc client shutting down");
        for request in drained {
            debug!(rpc.id = request.id, rpc.method = %request.method, "cancelling pending request");
            request.responder.deliver(Err(reason()));
        }

        self.conn().sender = None;
        self.shutdown.cancel();
        self.tasks.close();
    }

    fn handle_message(&self, msg: &[u8]) {
        match decoder::decode(msg) {
            Err(reason) => self.record_drop(&reason),
            Ok(Inbound::Notification { method, params }) => match &self.notifications {
                Some(handler) => handler.on_notification(&method, &params),
                None => debug!(rpc.method = %method, "notification without handler"),
            },
            Ok(Inbound::Response { id, reply }) => {
                if !self.complete(id, reply) {
                    self.record_drop(&DropReason::UnknownId(id));
                }
            }
        }
    }

    fn record_drop(&self, reason: &DropReason) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        debug!(%reason, "dropping inbound message");
    }
}

// ==============================================================================
// Client
// ==============================================================================

enum Transport {
    HttpPost {
        poster: Arc<HttpPoster>,
        queue: mpsc::Sender<PostJob>,
    },
    Stream {
        queue: mpsc::Sender<StreamJob>,
    },
}

struct Inner {
    shared: Arc<Shared>,
    transport: Transport,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Workers hold `Shared`, not `Inner`; stop them with the last handle.
        self.shared.shutdown();
    }
}

/// JSON-RPC client for a Bitcoin-family node.
///
/// Every call is available in two forms: [`send_command`](Self::send_command)
/// returns a [`ResponseFuture`] right away, and [`call`](Self::call) waits
/// for the reply. Replies are matched to calls strictly by ID, so concurrent
/// calls may complete in any order.
///
/// In HTTP POST mode each call is an independent POST issued by background
/// workers. In persistent mode calls are written to an externally managed
/// connection (see [`attach`](Self::attach)) and replies arrive through
/// [`handle_message`](Self::handle_message).
///
/// Cloning is cheap and clones share the same connection. The client shuts
/// down when [`shutdown`](Self::shutdown) is called or the last clone is
/// dropped.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Create a client and start its background workers. Must be called
    /// from within a Tokio runtime.
    pub fn new(config: ConnConfig) -> Result<Self, CoreError> {
        Self::build(config, None)
    }

    /// Like [`new`](Self::new), delivering server notifications to
    /// `handler`. Notifications only exist in persistent mode.
    pub fn with_notification_handler(
        config: ConnConfig,
        handler: Arc<dyn NotificationHandler>,
    ) -> Result<Self, CoreError> {
        Self::build(config, Some(handler))
    }

    fn build(
        config: ConnConfig,
        notifications: Option<Arc<dyn NotificationHandler>>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let poster = if config.http_post_mode {
            Some(Arc::new(HttpPoster::new(&config)?))
        } else {
            None
        };
        let http_workers = config.http_workers;

        let shared = Arc::new(Shared {
            config,
            next_id: AtomicU64::new(0),
            registry: Registry::new(),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            conn: Mutex::new(ConnState::default()),
            notifications,
            dropped: AtomicU64::new(0),
        });

        let transport = match poster {
            Some(poster) => {
                let (tx, rx) = mpsc::channel(SEND_POST_BUFFER_SIZE);
                let rx = Arc::new(tokio::sync::Mutex::new(rx));
                for _ in 0..http_workers {
                    shared.tasks.spawn(http_adapter::run_post_worker(
                        Arc::clone(&shared),
                        Arc::clone(&poster),
                        Arc::clone(&rx),
                    ));
                }
                Transport::HttpPost { poster, queue: tx }
            }
            None => {
                let (tx, rx) = mpsc::channel(SEND_BUFFER_SIZE);
                shared
                    .tasks
                    .spawn(stream::run_stream_worker(Arc::clone(&shared), rx));
                Transport::Stream { queue: tx }
            }
        };

        debug!(
            host = %shared.config.host,
            http_post_mode = shared.config.http_post_mode,
            "rpc client started"
        );

        Ok(Self {
            inner: Arc::new(Inner { shared, transport }),
        })
    }

    fn shared(&self) -> &Shared {
        &self.inner.shared
    }

    pub fn config(&self) -> &ConnConfig {
        &self.shared().config
    }

    /// Next request ID. Unique for the lifetime of this client; the first ID
    /// is 1.
    pub fn next_id(&self) -> u64 {
        self.shared().next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Issue `command` and return a future for its reply.
    ///
    /// Marshal failures and calls made after shutdown return an
    /// already-failed future without registering anything. The only wait is
    /// for space on the bounded send queue.
    pub async fn send_command<C>(&self, ctx: &CallContext, command: &C) -> ResponseFuture
    where
        C: Command + ?Sized,
    {
        let method = command.method();
        if method.is_empty() {
            return ResponseFuture::failed(CoreError::InvalidCommand(
                "method name must not be empty".to_owned(),
            ));
        }
        let params = match command.params() {
            Ok(params) => params,
            Err(err) => return ResponseFuture::failed(err),
        };
        if self.shared().registry.is_closed() {
            return ResponseFuture::failed(CoreError::ClientShutdown);
        }

        let id = self.next_id();
        let payload = match marshal_request(id, method, &params) {
            Ok(payload) => payload,
            Err(err) => return ResponseFuture::failed(err),
        };
        debug!(
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "rpc call"
        );

        match &self.inner.transport {
            Transport::HttpPost { poster, queue } => {
                self.send_post(poster, queue, ctx, id, method.to_owned(), payload)
                    .await
            }
            Transport::Stream { queue } => {
                self.send_stream(queue, ctx, id, method.to_owned(), payload)
                    .await
            }
        }
    }

    /// Issue `command` and wait for its raw result.
    pub async fn call<C>(&self, ctx: &CallContext, command: &C) -> Reply
    where
        C: Command + ?Sized,
    {
        self.send_command(ctx, command).await.receive().await
    }

    async fn send_post(
        &self,
        poster: &HttpPoster,
        queue: &mpsc::Sender<PostJob>,
        ctx: &CallContext,
        id: u64,
        method: String,
        payload: Vec<u8>,
    ) -> ResponseFuture {
        let request = match poster.build_request(payload.clone()) {
            Ok(request) => request,
            Err(err) => return ResponseFuture::failed(err),
        };

        // Reserve queue space before registering, so a caller that gives up
        // while the queue is full leaves nothing in the registry.
        let Ok(permit) = queue.reserve().await else {
            return ResponseFuture::failed(CoreError::ClientShutdown);
        };

        let (responder, response) = future::channel(id);
        let pending = PendingRequest {
            id,
            method: method.clone(),
            payload,
            responder,
        };
        // A shutdown that began after the check in `send_command` has
        // already answered the request.
        if self.shared().registry.add(pending).is_ok() {
            permit.send(PostJob {
                id,
                method,
                request,
                ctx: ctx.clone(),
            });
        }
        response
    }

    async fn send_stream(
        &self,
        queue: &mpsc::Sender<StreamJob>,
        ctx: &CallContext,
        id: u64,
        method: String,
        payload: Vec<u8>,
    ) -> ResponseFuture {
        if !self.shared().conn().ever_attached {
            return ResponseFuture::failed(CoreError::ClientNotConnected);
        }
        if let Some(err) = ctx.err() {
            return ResponseFuture::failed(err);
        }

        let Ok(permit) = queue.reserve().await else {
            return ResponseFuture::failed(CoreError::ClientShutdown);
        };

        let (responder, response) = future::channel(id);
        let pending = PendingRequest {
            id,
            method,
            payload: payload.clone(),
            responder,
        };
        // Register under the connection lock so an attach either resends
        // this request or sees it queued under its own generation.
        let generation = {
            let conn = self.shared().conn();
            match self.shared().registry.add(pending) {
                Ok(()) => Some(conn.generation),
                Err(_) => None,
            }
        };
        if let Some(generation) = generation {
            permit.send(StreamJob {
                id,
                generation,
                payload,
            });
        }
        response
    }

    /// Feed one complete inbound payload from the persistent connection.
    /// Malformed, unsolicited and late messages are dropped and counted in
    /// [`dropped_messages`](Self::dropped_messages).
    pub fn handle_message(&self, msg: &[u8]) {
        self.shared().handle_message(msg);
    }

    /// Attach the outbound half of a freshly opened persistent connection.
    ///
    /// Requests still pending from a previous connection are resent in the
    /// order they were issued.
    pub async fn attach(&self, sender: Arc<dyn StreamSender>) -> Result<(), CoreError> {
        if matches!(self.inner.transport, Transport::HttpPost { .. }) {
            return Err(CoreError::NotAWebsocketClient);
        }
        let shared = self.shared();
        if shared.registry.is_closed() {
            return Err(CoreError::ClientShutdown);
        }
        let (generation, resend) = {
            let mut conn = shared.conn();
            if conn.sender.is_some() {
                return Err(CoreError::AlreadyConnected);
            }
            conn.sender = Some(Arc::clone(&sender));
            conn.ever_attached = true;
            conn.disconnected = false;
            conn.generation += 1;
            (conn.generation, shared.registry.pending_requests())
        };

        if !resend.is_empty() {
            info!(pending = resend.len(), generation, "resending pending requests");
        }
        for (id, method, payload) in resend {
            // Answered while an earlier resend was in flight.
            if !shared.registry.contains(id) {
                continue;
            }
            debug!(rpc.id = id, rpc.method = %method, "resending request");
            if let Err(err) = sender.send(&payload).await {
                warn!(rpc.id = id, rpc.method = %method, error = %err, "resend failed");
                shared.connection_lost(generation);
                return Err(err);
            }
        }
        info!(host = %shared.config.host, "rpc stream attached");
        Ok(())
    }

    /// Drop the persistent connection. Without auto-reconnect this also
    /// shuts the client down. No-op in HTTP POST mode.
    pub fn disconnect(&self) {
        if matches!(self.inner.transport, Transport::HttpPost { .. }) {
            return;
        }
        let generation = {
            let conn = self.shared().conn();
            if conn.sender.is_none() {
                return;
            }
            conn.generation
        };
        self.shared().connection_lost(generation);
    }

    pub fn is_disconnected(&self) -> bool {
        self.shared().conn().disconnected
    }

    /// Connection parameters for the external stream connector.
    pub fn stream_handshake(&self) -> Result<StreamHandshake, CoreError> {
        if matches!(self.inner.transport, Transport::HttpPost { .. }) {
            return Err(CoreError::NotAWebsocketClient);
        }
        self.shared().config.stream_handshake()
    }

    /// Answer every pending request with `ClientShutdown` and stop the
    /// background workers. Only the first call has any effect.
    pub fn shutdown(&self) {
        self.shared().shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared().registry.is_closed()
    }

    /// Resolves once every background worker has exited. Only completes
    /// after [`shutdown`](Self::shutdown).
    pub async fn wait_for_shutdown(&self) {
        self.shared().tasks.wait().await;
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared().registry.len()
    }

    /// Number of inbound messages dropped as malformed or unsolicited.
    pub fn dropped_messages(&self) -> u64 {
        self.shared().dropped.load(Ordering::Relaxed)
    }
}
