//! Cancellation and deadlines for a single resolution call.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::AuthError;

/// Caller-supplied context for a resolution call.
///
/// Every blocking step of a resolution is raced against the context's
/// cancellation token and deadline. The losing step is dropped, which
/// cancels any in-flight I/O it owns.
///
/// # Example
///
/// ```rust,ignore
/// use std::time::Duration;
/// use gcpsm_auth_core::ResolveContext;
///
/// let ctx = ResolveContext::new().with_timeout(Duration::from_secs(30));
/// let shutdown = ctx.cancellation().clone();
/// // shutdown.cancel() aborts any resolution running under `ctx`.
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl ResolveContext {
    /// Create a context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// The cancellation token observed by this context.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Check if the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run `fut` until it completes, the context is cancelled, or the
    /// deadline passes, whichever happens first.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<AuthError>,
    {
        if self.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let deadline = async {
            match self.deadline() {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(AuthError::Cancelled),
            _ = deadline => Err(AuthError::DeadlineExceeded),
            result = fut => result.map_err(Into::into),
        }
    }
}
