//! Per-key token-bucket admission control.

mod bucket;
mod eviction;
mod key;
mod limiter;
mod shard;

pub use bucket::{Quota, TokenBucket};
pub use key::{by_ip, by_method, by_service, KeyExtractor, KeyPolicy};
pub use limiter::{
    Decision, RateLimiter, RateLimiterBuilder, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_IDLE_TIME,
    DEFAULT_SHARDS,
};
