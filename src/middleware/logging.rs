//! Request logging interceptor.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::{Context, Handler, Interceptor, Request, Response};

/// Logs every call with its outcome and duration.
///
/// The inner handler runs inside a `request` span carrying a generated
/// request id, so events logged further down the chain are correlated.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLog;

impl Interceptor for RequestLog {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(RequestLogHandler { next })
    }
}

struct RequestLogHandler {
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for RequestLogHandler {
    async fn handle(&self, ctx: Context, req: Request) -> Result<Response> {
        let span = info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            service = %req.service,
            method = %req.method,
        );
        let start = Instant::now();

        let result = self.next.handle(ctx, req).instrument(span.clone()).await;

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        span.in_scope(|| match &result {
            Ok(_) => info!(duration_ms = duration_ms, "Request completed"),
            Err(e) => error!(duration_ms = duration_ms, error = %e, "Request failed"),
        });

        result
    }
}
