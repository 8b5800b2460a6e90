//! Sharded per-key token-bucket rate limiter.

use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::bucket::Quota;
use super::eviction::EvictionTask;
use super::key::KeyExtractor;
use super::shard::Shard;
use crate::error::{Error, Result};
use crate::pipeline::{Context, Handler, Interceptor, Request, Response};

/// Default number of shards for the bucket map.
pub const DEFAULT_SHARDS: usize = 32;
/// Default period between eviction scans.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
/// Default idle time after which a bucket is evicted.
pub const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(300);

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A token was debited
    Admitted,
    /// Fewer than one token was available; nothing was debited
    Rejected,
    /// The key extractor yielded no key
    Bypassed,
}

/// State shared by the limiter, its interceptor handlers and the eviction
/// task. Immutable apart from shard and bucket contents.
pub(crate) struct LimiterCore {
    shards: Box<[Shard]>,
    hasher: RandomState,
    quota: Quota,
    key_extractor: KeyExtractor,
}

impl LimiterCore {
    fn shard(&self, key: &str) -> &Shard {
        let index = self.hasher.hash_one(key) % self.shards.len() as u64;
        &self.shards[index as usize]
    }

    fn allow(&self, key: &str) -> bool {
        let bucket = self.shard(key).bucket(key, self.quota);
        // Bound to a local so the guard drops before `bucket`.
        let admitted = bucket.lock().try_acquire(self.quota, Instant::now());
        admitted
    }

    fn check(&self, req: &Request) -> Decision {
        let Some(key) = self.key_extractor.extract(req) else {
            trace!(service = %req.service, method = %req.method, "No rate limit key, bypassing");
            return Decision::Bypassed;
        };

        if self.allow(&key) {
            trace!(key = %key, "Request admitted");
            Decision::Admitted
        } else {
            debug!(key = %key, service = %req.service, method = %req.method, "Rate limit exceeded");
            Decision::Rejected
        }
    }

    pub(crate) fn evict_idle(&self, max_idle: Duration) -> usize {
        let Some(cutoff) = Instant::now().checked_sub(max_idle) else {
            return 0;
        };
        self.shards.iter().map(|shard| shard.evict_idle(cutoff)).sum()
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }
}

/// Builder for [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimiterBuilder {
    rate: f64,
    burst: u32,
    key_extractor: KeyExtractor,
    cleanup_interval: Duration,
    max_idle_time: Duration,
    shards: usize,
}

impl RateLimiterBuilder {
    /// Set the key extraction policy. Defaults to [`by_ip`](super::by_ip).
    pub fn key_extractor(mut self, key_extractor: impl Into<KeyExtractor>) -> Self {
        self.key_extractor = key_extractor.into();
        self
    }

    /// Set how often idle buckets are scanned for.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set how long a bucket may go unused before it is evicted.
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.max_idle_time = idle;
        self
    }

    /// Set the number of shards the keyspace is split across.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Validate the parameters and start the limiter.
    ///
    /// Must be called within a Tokio runtime: the eviction task is spawned
    /// here.
    pub fn build(self) -> Result<RateLimiter> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(Error::Config(format!(
                "rate must be a positive number of requests per second, got {}",
                self.rate
            )));
        }
        if self.burst == 0 {
            return Err(Error::Config("burst must be at least 1".to_string()));
        }
        if self.shards == 0 {
            return Err(Error::Config("shard count must be at least 1".to_string()));
        }
        if self.cleanup_interval.is_zero() {
            return Err(Error::Config("cleanup interval must be non-zero".to_string()));
        }
        let runtime = Handle::try_current()
            .map_err(|_| Error::Config("rate limiter must be built inside a Tokio runtime".to_string()))?;

        let core = Arc::new(LimiterCore {
            shards: (0..self.shards).map(|_| Shard::default()).collect(),
            hasher: RandomState::new(),
            quota: Quota::new(self.rate, self.burst),
            key_extractor: self.key_extractor,
        });

        let eviction = EvictionTask::spawn(&runtime, core.clone(), self.cleanup_interval, self.max_idle_time);

        info!(
            rate = self.rate,
            burst = self.burst,
            shards = self.shards,
            cleanup_interval_ms = self.cleanup_interval.as_millis() as u64,
            max_idle_ms = self.max_idle_time.as_millis() as u64,
            "Rate limiter started"
        );

        Ok(RateLimiter {
            core,
            eviction: Mutex::new(Some(eviction)),
        })
    }
}

/// Token-bucket rate limiter keyed by a per-request string.
///
/// Buckets live in a fixed array of shards chosen by hashing the key. Each
/// shard has its own map lock and each bucket its own mutex, so admissions
/// for different keys never contend once their buckets exist. A background
/// task evicts buckets left idle past the configured time.
///
/// Use it in a chain through its [`Interceptor`] implementation and call
/// [`stop`](Self::stop) on shutdown.
pub struct RateLimiter {
    core: Arc<LimiterCore>,
    eviction: Mutex<Option<EvictionTask>>,
}

impl RateLimiter {
    /// Start building a limiter sustaining `rate` requests per second with
    /// bursts of up to `burst`.
    pub fn builder(rate: f64, burst: u32) -> RateLimiterBuilder {
        RateLimiterBuilder {
            rate,
            burst,
            key_extractor: KeyExtractor::default(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            shards: DEFAULT_SHARDS,
        }
    }

    /// Create a limiter with default eviction settings.
    pub fn new(rate: f64, burst: u32, key_extractor: impl Into<KeyExtractor>) -> Result<Self> {
        Self::builder(rate, burst).key_extractor(key_extractor).build()
    }

    /// Try to take one token for `key`.
    pub fn allow(&self, key: &str) -> bool {
        self.core.allow(key)
    }

    /// Run the admission check for a request.
    pub fn check(&self, req: &Request) -> Decision {
        self.core.check(req)
    }

    /// Tokens held by `key`'s bucket as of its last check.
    pub fn tokens(&self, key: &str) -> Option<f64> {
        self.core
            .shard(key)
            .get(key)
            .map(|bucket| bucket.lock().tokens())
    }

    /// Number of live buckets across all shards.
    pub fn bucket_count(&self) -> usize {
        self.core.bucket_count()
    }

    /// Whether the eviction task is still running.
    pub fn is_running(&self) -> bool {
        self.eviction.lock().is_some()
    }

    /// Stop the eviction task and wait for it to exit.
    ///
    /// Later calls return immediately. Admission checks keep working after
    /// stop; buckets are simply no longer evicted.
    pub async fn stop(&self) {
        let task = self.eviction.lock().take();
        if let Some(task) = task {
            task.shutdown().await;
            info!("Rate limiter stopped");
        }
    }
}

impl Interceptor for RateLimiter {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(RateLimitHandler {
            core: self.core.clone(),
            next,
        })
    }
}

struct RateLimitHandler {
    core: Arc<LimiterCore>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for RateLimitHandler {
    async fn handle(&self, ctx: Context, req: Request) -> Result<Response> {
        if self.core.check(&req) == Decision::Rejected {
            return Err(Error::RateLimited);
        }
        self.next.handle(ctx, req).await
    }
}
