//! HTTP POST transport.
//!
//! Each call becomes one POST to `http(s)://<host>` with basic auth. Calls
//! are queued on a bounded channel and serviced by background workers,
//! optionally rate limited.

mod connection;

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, StatusCode};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, trace};

use crate::config::ConnConfig;
use crate::error::{CoreError, RpcError};

use super::client::Shared;
use super::context::CallContext;
use super::future::Reply;
use super::protocol::JsonRpcResponse;

/// Number of POST jobs the queue holds before `send_command` waits.
pub(crate) const SEND_POST_BUFFER_SIZE: usize = 100;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub(crate) struct PostJob {
    pub(crate) id: u64,
    pub(crate) method: String,
    pub(crate) request: reqwest::Request,
    pub(crate) ctx: CallContext,
}

pub(crate) type PostQueue = Arc<Mutex<mpsc::Receiver<PostJob>>>;

/// Issues POST calls. Shared read-only by every worker.
pub(crate) struct HttpPoster {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
    limiter: Option<DirectRateLimiter>,
}

impl HttpPoster {
    pub(crate) fn new(config: &ConnConfig) -> Result<Self, CoreError> {
        let client = connection::build_http_client(config)?;
        let limiter = match config.requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::Config("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            url: config.http_url(),
            auth: config.resolve_auth()?,
            limiter,
        })
    }

    pub(crate) fn build_request(&self, payload: Vec<u8>) -> Result<reqwest::Request, CoreError> {
        let mut builder = self
            .client
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONNECTION, "close")
            .body(payload);
        if let Some((ref user, ref pass)) = self.auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder.build().map_err(|e| RpcError::Transport(e).into())
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn execute(&self, id: u64, method: &str, request: reqwest::Request) -> Reply {
        self.wait_for_rate_limit().await;
        debug!(rpc.id = id, rpc.method = method, "rpc post");

        let response = self
            .client
            .execute(request)
            .await
            .map_err(RpcError::Transport)?;
        let status = response.status();

        let body = response.text().await.map_err(RpcError::Transport)?;
        debug!(rpc.id = id, rpc.method = method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = id, rpc.method = method, body = %body, "rpc response body");

        parse_post_reply(status, body)
    }
}

/// Decode a POST reply body.
///
/// Bodies that are not a JSON-RPC envelope become `UnexpectedReply` with
/// the status and raw body, except a bare 401, which is how Bitcoin Core
/// rejects bad credentials.
fn parse_post_reply(status: StatusCode, body: String) -> Reply {
    match serde_json::from_str::<JsonRpcResponse>(&body) {
        Ok(decoded) => decoded.into_result(),
        Err(_) if status == StatusCode::UNAUTHORIZED => Err(CoreError::AuthenticationFailure),
        Err(_) => Err(RpcError::UnexpectedReply {
            status: status.as_u16(),
            body,
        }
        .into()),
    }
}

pub(crate) async fn run_post_worker(
    shared: Arc<Shared>,
    poster: Arc<HttpPoster>,
    queue: PostQueue,
) {
    loop {
        let job = tokio::select! {
            biased;
            () = shared.shutdown_signal().cancelled() => break,
            job = async { queue.lock().await.recv().await } => match job {
                Some(job) => job,
                None => break,
            },
        };
        handle_post(&shared, &poster, job).await;
    }

    // Answer anything still queued so no caller is left waiting.
    let mut queue = queue.lock().await;
    while let Ok(job) = queue.try_recv() {
        shared.complete(job.id, Err(CoreError::ClientShutdown));
    }
    debug!("http post worker stopped");
}

async fn handle_post(shared: &Shared, poster: &HttpPoster, job: PostJob) {
    let PostJob {
        id,
        method,
        request,
        ctx,
    } = job;

    if let Some(err) = ctx.err() {
        shared.complete(id, Err(err));
        return;
    }

    let reply = tokio::select! {
        reply = poster.execute(id, &method, request) => reply,
        err = ctx.done() => {
            debug!(rpc.id = id, rpc.method = %method, error = %err, "rpc post abandoned");
            Err(err)
        }
        // Shutdown has already answered every pending request.
        () = shared.shutdown_signal().cancelled() => return,
    };

    if !shared.complete(id, reply) {
        trace!(rpc.id = id, rpc.method = %method, "reply for request no longer pending");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_result_is_success() {
        let reply = parse_post_reply(
            StatusCode::OK,
            r#"{"result":812345,"error":null,"id":1}"#.to_owned(),
        );
        assert_eq!(reply.expect("ok"), serde_json::json!(812345));
    }

    #[test]
    fn server_error_envelope_surfaces_structured_error() {
        // Bitcoin Core answers RPC errors with HTTP 500 and a valid envelope.
        let reply = parse_post_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"result":null,"error":{"code":-8,"message":"Block height out of range"},"id":1}"#
                .to_owned(),
        );
        assert!(matches!(
            reply,
            Err(CoreError::Rpc(RpcError::ServerError { code: -8, .. }))
        ));
    }

    #[test]
    fn unparseable_body_keeps_status_and_body() {
        let reply = parse_post_reply(
            StatusCode::BAD_GATEWAY,
            "<html>bad gateway</html>".to_owned(),
        );
        match reply {
            Err(CoreError::Rpc(RpcError::UnexpectedReply { status, body })) => {
                assert_eq!(status, 502);
                assert_eq!(body, "<html>bad gateway</html>");
            }
            other => panic!("expected UnexpectedReply, got {other:?}"),
        }
    }

    #[test]
    fn empty_401_is_authentication_failure() {
        let reply = parse_post_reply(StatusCode::UNAUTHORIZED, String::new());
        assert!(matches!(reply, Err(CoreError::AuthenticationFailure)));
    }

    #[test]
    fn build_request_sets_headers_and_auth() {
        let config = ConnConfig::http_post("127.0.0.1:8332").with_credentials("alice", "secret");
        let poster = HttpPoster::new(&config).expect("poster must build");
        let request = poster
            .build_request(br#"{"id":1}"#.to_vec())
            .expect("request must build");

        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().as_str(), "http://127.0.0.1:8332/");
        let headers = request.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::CONNECTION], "close");
        assert_eq!(headers[header::AUTHORIZATION], "Basic YWxpY2U6c2VjcmV0");
    }

    #[test]
    fn zero_rate_limit_fails_poster_construction() {
        let mut config = ConnConfig::http_post("127.0.0.1:8332");
        config.requests_per_second = Some(0);
        assert!(matches!(
            HttpPoster::new(&config),
            Err(CoreError::Config(_))
        ));

        config.requests_per_second = Some(5);
        let poster = HttpPoster::new(&config).expect("poster must build");
        assert!(poster.limiter.is_some());
    }
}
