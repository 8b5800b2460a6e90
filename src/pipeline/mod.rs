//! Composable request-interceptor pipeline.
//!
//! A [`Handler`] processes a request; an [`Interceptor`] wraps a handler to
//! produce another one. [`chain`] folds a list of interceptors around a
//! terminal handler, outermost first.

mod context;
mod handler;
mod request;

pub use context::Context;
pub use handler::{chain, handler_fn, interceptor_fn, Handler, HandlerFn, Interceptor, InterceptorFn};
pub use request::{Metadata, Request, Response};
