//! Per-caller token bucket rate limiting.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::config::schema::RateLimitConfig;
use crate::http::response::ApiError;
use crate::identity::Caller;

/// A simple token bucket.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Buckets keyed by caller subject.
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    enabled: bool,
    rps: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            enabled: config.enabled,
            rps: config.requests_per_second as f64,
            burst: config.burst_size.max(1) as f64,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Take one token for `subject`. Always succeeds when disabled.
    pub fn check(&self, subject: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let mut bucket = self
            .buckets
            .entry(subject.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst));
        bucket.try_acquire(self.burst, self.rps)
    }

    /// Number of callers seen so far.
    pub fn tracked(&self) -> usize {
        self.buckets.len()
    }
}

/// Rejects with 429 once the caller's bucket is empty.
///
/// Must run after the identity middleware.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(subject) = request.extensions().get::<Caller>().map(|c| c.subject.clone()) else {
        return next.run(request).await;
    };

    if limiter.check(&subject) {
        next.run(request).await
    } else {
        tracing::warn!(caller = %subject, "Rate limit exceeded");
        ApiError::RateLimited.into_response()
    }
}
