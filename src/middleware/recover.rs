//! Panic recovery interceptor.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::error;

use crate::error::{Error, Result};
use crate::pipeline::{Context, Handler, Interceptor, Request, Response};

/// Turns a panic anywhere inside the wrapped handler into [`Error::Panic`].
///
/// Place it outermost so it also covers the other interceptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recover;

impl Interceptor for Recover {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(RecoverHandler { next })
    }
}

struct RecoverHandler {
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for RecoverHandler {
    async fn handle(&self, ctx: Context, req: Request) -> Result<Response> {
        let service = req.service.clone();
        let method = req.method.clone();

        let call = async { self.next.handle(ctx, req).await };
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                error!(
                    service = %service,
                    method = %method,
                    panic = %panic_message(panic.as_ref()),
                    "Panic recovered"
                );
                Err(Error::Panic)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{chain, handler_fn};

    #[tokio::test]
    async fn test_panic_becomes_error() {
        let panicking = handler_fn(|_ctx, req: Request| async move {
            if req.method == "Boom" {
                panic!("handler exploded");
            }
            Ok::<_, Error>(Response::default())
        });
        let handler = chain(panicking, &[Arc::new(Recover)]);

        let err = handler
            .handle(Context::new(), Request::new("svc", "Boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Panic));
        assert_eq!(err.status_code(), 500);

        assert!(handler.handle(Context::new(), Request::new("svc", "Fine")).await.is_ok());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
