//! Turnstile - per-key admission control for request pipelines
//!
//! This crate implements a sharded token-bucket rate limiter that plugs into
//! a composable interceptor chain fronting a backend call. Buckets are
//! created lazily per key and evicted by a background task once idle, so
//! memory stays bounded under key churn.

pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod pipeline;
pub mod ratelimit;

pub use error::{Error, Result};
