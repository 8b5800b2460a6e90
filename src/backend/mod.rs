//! Backends that terminate the interceptor chain.

mod dispatch;
mod registry;
mod router;

use async_trait::async_trait;

use crate::error::Result;
use crate::pipeline::{Context, Request, Response};

pub use dispatch::Dispatch;
pub use registry::BackendRegistry;
pub use router::FnBackend;

/// A service implementation that requests are ultimately sent to.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Handle a call. Implementations should honour the context deadline.
    async fn call(&self, ctx: Context, req: Request) -> Result<Response>;

    /// Release any resources held by the backend.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
