//! Per-client rate limiting for the API and proxy routes
//!
//! Redirect links and file delivery are exempt by default: a browser polling a
//! wait page must never be throttled into a broken download.

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Instant,
};
use tokio::sync::Mutex;

/// Buckets untouched this long are dropped when the map is pruned
const IDLE_BUCKET_SECS: f64 = 300.0;

/// Prune once the map holds this many clients
const PRUNE_THRESHOLD: usize = 10_000;

/// Token bucket for one client
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

/// Per-IP token buckets
pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, Bucket>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a limiter from configuration
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn is_exempt(&self, path: &str, ip: IpAddr) -> bool {
        self.config.exempt_ips.contains(&ip)
            || self
                .config
                .exempt_paths
                .iter()
                .any(|prefix| path == prefix || path.starts_with(prefix.as_str()))
    }

    /// Take one token for `ip`
    ///
    /// Returns `Err(seconds)` to wait when the bucket is empty.
    pub async fn check(&self, path: &str, ip: IpAddr) -> Result<(), u64> {
        if self.is_exempt(path, ip) {
            return Ok(());
        }

        let rate = f64::from(self.config.requests_per_second.max(1));
        let capacity = f64::from(self.config.burst_size.max(1));
        let now = Instant::now();

        let mut buckets = self.buckets.lock().await;
        if buckets.len() >= PRUNE_THRESHOLD {
            buckets.retain(|_, b| now.duration_since(b.last_seen).as_secs_f64() < IDLE_BUCKET_SECS);
        }

        let bucket = buckets.entry(ip).or_insert(Bucket {
            tokens: capacity,
            last_seen: now,
        });
        let elapsed = now.duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * rate).min(capacity);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(((1.0 - bucket.tokens) / rate).ceil().max(1.0) as u64)
        }
    }
}

/// Middleware answering 429 once a client's bucket is empty
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    match limiter.check(request.uri().path(), addr.ip()).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::debug!(client = %addr.ip(), path = %request.uri().path(), "Rate limited");
            let body = ApiError::with_details(
                "rate_limited",
                "Too many requests",
                json!({ "retry_after_seconds": retry_after }),
            );
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}
