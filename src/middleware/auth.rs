//! Token authentication interceptor.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use crate::pipeline::{Context, Handler, Interceptor, Request, Response};

const DEFAULT_HEADER: &str = "Authorization";
const DEFAULT_SCHEME: &str = "Bearer";

/// Checks a token and returns the principal it identifies.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, ctx: &Context, token: &str) -> Result<String>;
}

/// Accepts any token from a fixed set; the token itself is the principal.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    keys: HashSet<String>,
}

impl ApiKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Validator for ApiKeys {
    async fn validate(&self, _ctx: &Context, token: &str) -> Result<String> {
        if self.keys.contains(token) {
            Ok(token.to_string())
        } else {
            Err(Error::InvalidToken)
        }
    }
}

/// Requires a valid token in a request header.
///
/// The header value must be `"<scheme> <token>"`; with an empty scheme the
/// whole value is the token. On success the principal is attached to the
/// context passed down the chain.
#[derive(Clone)]
pub struct Auth {
    validator: Arc<dyn Validator>,
    header: String,
    scheme: String,
}

impl Auth {
    pub fn new(validator: impl Validator + 'static) -> Self {
        Self {
            validator: Arc::new(validator),
            header: DEFAULT_HEADER.to_string(),
            scheme: DEFAULT_SCHEME.to_string(),
        }
    }

    /// Read the token from `header` instead of `Authorization`.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Expect `scheme` instead of `Bearer`; empty disables the prefix check.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }
}

impl Interceptor for Auth {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(AuthHandler {
            auth: self.clone(),
            next,
        })
    }
}

struct AuthHandler {
    auth: Auth,
    next: Arc<dyn Handler>,
}

impl AuthHandler {
    fn token<'a>(&self, req: &'a Request) -> Result<&'a str> {
        let value = req.metadata.get(&self.auth.header).ok_or(Error::MissingToken)?;

        if self.auth.scheme.is_empty() {
            return Ok(value);
        }
        value
            .strip_prefix(self.auth.scheme.as_str())
            .and_then(|rest| rest.strip_prefix(' '))
            .ok_or(Error::InvalidToken)
    }
}

#[async_trait]
impl Handler for AuthHandler {
    async fn handle(&self, ctx: Context, req: Request) -> Result<Response> {
        let token = self.token(&req)?;

        let principal = match self.auth.validator.validate(&ctx, token).await {
            Ok(principal) => principal,
            Err(e) => {
                debug!(service = %req.service, method = %req.method, error = %e, "Token rejected");
                return Err(Error::Unauthorized);
            }
        };

        self.next.handle(ctx.with_principal(principal), req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{chain, handler_fn};
    use serde_json::json;

    fn protected(auth: Auth) -> Arc<dyn Handler> {
        let whoami = handler_fn(|ctx: Context, _req| async move {
            Ok::<_, Error>(Response::new(json!({ "principal": ctx.principal() })))
        });
        chain(whoami, &[Arc::new(auth)])
    }

    #[tokio::test]
    async fn test_valid_token_sets_principal() {
        let handler = protected(Auth::new(ApiKeys::new(["secret"])));
        let req = Request::new("svc", "Get").with_header("authorization", "Bearer secret");

        let resp = handler.handle(Context::new(), req).await.unwrap();
        assert_eq!(resp.output, json!({ "principal": "secret" }));
    }

    #[tokio::test]
    async fn test_missing_header() {
        let handler = protected(Auth::new(ApiKeys::new(["secret"])));

        let err = handler
            .handle(Context::new(), Request::new("svc", "Get"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingToken));
    }

    #[tokio::test]
    async fn test_wrong_scheme() {
        let handler = protected(Auth::new(ApiKeys::new(["secret"])));
        let req = Request::new("svc", "Get").with_header("Authorization", "Basic secret");

        let err = handler.handle(Context::new(), req).await.unwrap_err();
        assert!(matches!(err, Error::InvalidToken));
    }

    #[tokio::test]
    async fn test_unknown_token_is_unauthorized() {
        let handler = protected(Auth::new(ApiKeys::new(["secret"])));
        let req = Request::new("svc", "Get").with_header("Authorization", "Bearer guess");

        let err = handler.handle(Context::new(), req).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
        assert_eq!(err.status_code(), 401);
    }

    #[tokio::test]
    async fn test_custom_header_without_scheme() {
        let auth = Auth::new(ApiKeys::new(["k1", "k2"]))
            .with_header("X-Api-Key")
            .with_scheme("");
        let handler = protected(auth);
        let req = Request::new("svc", "Get").with_header("x-api-key", "k2");

        let resp = handler.handle(Context::new(), req).await.unwrap();
        assert_eq!(resp.output, json!({ "principal": "k2" }));
    }
}
