//! Handler and interceptor abstractions and chain composition.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::{Context, Request, Response};
use crate::error::Result;

/// Processes a request, yielding a response or failing.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: Context, req: Request) -> Result<Response>;
}

/// Wraps a handler to produce a new handler.
pub trait Interceptor: Send + Sync {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

/// Adapts an async closure to [`Handler`].
pub struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Context, Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response>> + Send,
{
    async fn handle(&self, ctx: Context, req: Request) -> Result<Response> {
        (self.0)(ctx, req).await
    }
}

/// Build a handler from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Context, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}

/// Adapts a closure to [`Interceptor`].
pub struct InterceptorFn<F>(F);

impl<F> Interceptor for InterceptorFn<F>
where
    F: Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync,
{
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        (self.0)(next)
    }
}

/// Build an interceptor from a closure.
pub fn interceptor_fn<F>(f: F) -> Arc<dyn Interceptor>
where
    F: Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync + 'static,
{
    Arc::new(InterceptorFn(f))
}

/// Compose `interceptors` around `terminal`.
///
/// The first interceptor is the outermost: it runs first on the way in and
/// last on the way out.
pub fn chain(terminal: Arc<dyn Handler>, interceptors: &[Arc<dyn Interceptor>]) -> Arc<dyn Handler> {
    interceptors
        .iter()
        .rev()
        .fold(terminal, |next, interceptor| interceptor.wrap(next))
}
