//! Per-call context carried through the chain.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Call-scoped values forwarded from the caller to the backend.
///
/// Cancellation is expressed by dropping the future returned by
/// [`Handler::handle`](super::Handler::handle); every stage awaits the next
/// one inline, so dropping the outer future drops the backend call as well.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    principal: Option<Arc<str>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Narrow the deadline to at most `timeout` from now.
    ///
    /// An earlier deadline already on the context is kept.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Narrow the deadline to at most `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Attach the authenticated caller.
    pub fn with_principal(mut self, principal: impl Into<Arc<str>>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_never_extends_deadline() {
        let ctx = Context::new().with_timeout(Duration::from_secs(1));
        let first = ctx.deadline().unwrap();

        let ctx = ctx.with_timeout(Duration::from_secs(10));
        assert_eq!(ctx.deadline(), Some(first));

        let ctx = ctx.with_timeout(Duration::from_millis(100));
        assert!(ctx.deadline().unwrap() < first);
        assert_eq!(ctx.remaining(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_principal() {
        let ctx = Context::new();
        assert!(ctx.principal().is_none());
        assert!(ctx.remaining().is_none());

        let ctx = ctx.with_principal("alice");
        assert_eq!(ctx.principal(), Some("alice"));
    }
}
