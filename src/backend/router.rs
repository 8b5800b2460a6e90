//! Backend that routes calls to registered async functions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use super::Backend;
use crate::error::{Error, Result};
use crate::pipeline::{Context, Request, Response};

type MethodFn = Arc<dyn Fn(Context, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Routes `(service, method)` to a function of the call input.
#[derive(Default)]
pub struct FnBackend {
    services: HashMap<String, HashMap<String, MethodFn>>,
}

impl FnBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the function handling `service`/`method`.
    pub fn register<F, Fut>(&mut self, service: &str, method: &str, f: F)
    where
        F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let f: MethodFn = Arc::new(move |ctx, input| f(ctx, input).boxed());
        self.services
            .entry(service.to_string())
            .or_default()
            .insert(method.to_string(), f);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F, Fut>(mut self, service: &str, method: &str, f: F) -> Self
    where
        F: Fn(Context, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(service, method, f);
        self
    }
}

#[async_trait]
impl Backend for FnBackend {
    async fn call(&self, ctx: Context, req: Request) -> Result<Response> {
        let methods = self
            .services
            .get(&req.service)
            .ok_or_else(|| Error::ServiceNotFound(req.service.clone()))?;
        let f = methods
            .get(&req.method)
            .ok_or_else(|| Error::MethodNotFound(req.method.clone()))?;

        let output = f(ctx, req.input).await?;
        Ok(Response::new(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn users() -> FnBackend {
        FnBackend::new().with("UserService", "GetUser", |_ctx, input: Value| async move {
            Ok::<_, Error>(json!({ "id": input["id"], "name": "John Doe" }))
        })
    }

    #[tokio::test]
    async fn test_routes_to_registered_function() {
        let req = Request::new("UserService", "GetUser").with_input(json!({ "id": "42" }));
        let resp = users().call(Context::new(), req).await.unwrap();

        assert_eq!(resp.output, json!({ "id": "42", "name": "John Doe" }));
    }

    #[tokio::test]
    async fn test_unknown_service_and_method() {
        let backend = users();

        let err = backend
            .call(Context::new(), Request::new("OrderService", "GetUser"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceNotFound(ref s) if s == "OrderService"));

        let err = backend
            .call(Context::new(), Request::new("UserService", "DeleteUser"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MethodNotFound(ref m) if m == "DeleteUser"));
    }

    #[tokio::test]
    async fn test_function_errors_pass_through() {
        let backend = FnBackend::new().with("svc", "Fail", |_ctx, _input| async {
            Err::<Value, _>(Error::Backend("no rows".into()))
        });

        let err = backend
            .call(Context::new(), Request::new("svc", "Fail"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "backend error: no rows");
        assert!(backend.close().await.is_ok());
    }
}
