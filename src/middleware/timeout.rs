//! Per-call deadline interceptor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::pipeline::{Context, Handler, Interceptor, Request, Response};

/// Bounds everything inside it to `timeout`.
///
/// The context deadline is narrowed (never extended) so the backend sees it
/// too, and the inner call is abandoned with [`Error::DeadlineExceeded`]
/// once it passes.
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    timeout: Duration,
}

impl Timeout {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Interceptor for Timeout {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(TimeoutHandler {
            timeout: self.timeout,
            next,
        })
    }
}

struct TimeoutHandler {
    timeout: Duration,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for TimeoutHandler {
    async fn handle(&self, ctx: Context, req: Request) -> Result<Response> {
        let requested = Instant::now() + self.timeout;
        let ctx = ctx.with_deadline(requested);
        let deadline = ctx.deadline().unwrap_or(requested);

        tokio::time::timeout_at(deadline, self.next.handle(ctx, req))
            .await
            .map_err(|_| Error::DeadlineExceeded)?
    }
}
