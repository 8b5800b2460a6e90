//! Terminal handler that forwards requests to a registered backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::BackendRegistry;
use crate::error::{Error, Result};
use crate::pipeline::{Context, Handler, Request, Response};

/// Resolves the backend serving a request's service and calls it.
///
/// When the context carries a deadline the backend call is bounded by it.
pub struct Dispatch {
    registry: Arc<BackendRegistry>,
    routes: HashMap<String, String>,
}

impl Dispatch {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self {
            registry,
            routes: HashMap::new(),
        }
    }

    /// Serve `service` from the backend registered as `backend`.
    pub fn route(mut self, service: impl Into<String>, backend: impl Into<String>) -> Self {
        self.routes.insert(service.into(), backend.into());
        self
    }
}

#[async_trait]
impl Handler for Dispatch {
    async fn handle(&self, ctx: Context, req: Request) -> Result<Response> {
        let name = self
            .routes
            .get(&req.service)
            .ok_or_else(|| Error::ServiceNotFound(req.service.clone()))?;
        let backend = self
            .registry
            .get(name)
            .ok_or_else(|| Error::BackendNotFound(name.clone()))?;

        trace!(backend = %name, service = %req.service, method = %req.method, "Dispatching request");

        match ctx.deadline() {
            Some(deadline) => tokio::time::timeout_at(deadline, backend.call(ctx, req))
                .await
                .map_err(|_| Error::DeadlineExceeded)?,
            None => backend.call(ctx, req).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FnBackend;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn registry() -> Arc<BackendRegistry> {
        let registry = Arc::new(BackendRegistry::new());
        let users = FnBackend::new()
            .with("UserService", "GetUser", |_ctx, _input| async {
                Ok::<_, Error>(json!({ "name": "Alice" }))
            })
            .with("UserService", "Slow", |_ctx, _input| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, Error>(Value::Null)
            });
        registry.register("users", Arc::new(users));
        registry
    }

    #[tokio::test]
    async fn test_dispatches_to_routed_backend() {
        let dispatch = Dispatch::new(registry()).route("UserService", "users");

        let resp = dispatch
            .handle(Context::new(), Request::new("UserService", "GetUser"))
            .await
            .unwrap();
        assert_eq!(resp.output, json!({ "name": "Alice" }));
    }

    #[tokio::test]
    async fn test_unrouted_service_and_missing_backend() {
        let dispatch = Dispatch::new(registry()).route("OrderService", "orders");

        let err = dispatch
            .handle(Context::new(), Request::new("UserService", "GetUser"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceNotFound(_)));

        let err = dispatch
            .handle(Context::new(), Request::new("OrderService", "List"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendNotFound(ref b) if b == "orders"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_backend_call() {
        let dispatch = Dispatch::new(registry()).route("UserService", "users");

        let ctx = Context::new().with_timeout(Duration::from_secs(1));
        let err = dispatch
            .handle(ctx, Request::new("UserService", "Slow"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));

        let ctx = Context::new().with_timeout(Duration::from_secs(10));
        assert!(dispatch.handle(ctx, Request::new("UserService", "Slow")).await.is_ok());
    }
}
