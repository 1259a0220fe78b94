use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// Caller-supplied deadline and cancellation for one call.
///
/// The HTTP POST path races the outbound request against both and answers
/// the call with `Cancelled` or `DeadlineExceeded`. The streaming path only
/// checks them before the request is queued.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
}

impl CallContext {
    /// No deadline, never cancelled.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Keeps the earlier of the existing and the new deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error this context already resolves to, if any.
    pub fn err(&self) -> Option<CoreError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(CoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(CoreError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Completes when the context is cancelled or its deadline passes. Never
    /// completes for a background context.
    pub(crate) async fn done(&self) -> CoreError {
        let cancelled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            () = cancelled => CoreError::Cancelled,
            () = expired => CoreError::DeadlineExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_is_never_done() {
        assert!(CallContext::background().err().is_none());
    }

    #[test]
    fn cancelled_token_reports_cancelled() {
        let token = CancellationToken::new();
        let ctx = CallContext::background().with_cancellation(token.clone());
        assert!(ctx.err().is_none());
        token.cancel();
        assert!(matches!(ctx.err(), Some(CoreError::Cancelled)));
    }

    #[tokio::test]
    async fn past_deadline_reports_exceeded() {
        let ctx = CallContext::background().with_deadline(Instant::now());
        assert!(matches!(ctx.err(), Some(CoreError::DeadlineExceeded)));
        assert!(matches!(ctx.done().await, CoreError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = CallContext::background()
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn done_fires_on_cancel() {
        let token = CancellationToken::new();
        let ctx = CallContext::background().with_cancellation(token.clone());
        token.cancel();
        assert!(matches!(ctx.done().await, CoreError::Cancelled));
    }
}
