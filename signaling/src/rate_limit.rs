use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

/// Fixed-window request counter keyed by `scope:client`. Buckets expire with
/// their window; expired entries are pruned lazily on insert.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    limit: u32,
    window: Duration,
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    expires_at: Instant,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            limit,
            window,
        }
    }

    /// True when the caller has exhausted its window for this scope.
    pub fn is_limited(&self, scope: &str, client: &str) -> bool {
        let now = Instant::now();
        let key = format!("{scope}:{client}");
        let mut buckets = self.buckets.lock().expect("rate limiter poisoned");

        if buckets.len() > 4096 {
            buckets.retain(|_, bucket| bucket.expires_at > now);
        }

        match buckets.get_mut(&key) {
            Some(bucket) if bucket.expires_at > now => {
                if bucket.count >= self.limit {
                    return true;
                }
                bucket.count += 1;
                false
            }
            _ => {
                buckets.insert(
                    key,
                    Bucket {
                        count: 1,
                        expires_at: now + self.window,
                    },
                );
                false
            }
        }
    }
}

/// Best-effort client identity: proxy headers first, "unknown" otherwise.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}
