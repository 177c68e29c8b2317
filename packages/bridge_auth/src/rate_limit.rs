//! Fixed-window rate limiting, keyed by an arbitrary string (device id or
//! peer address, per spec §7). Increments are atomic under the map lock;
//! eventual consistency across replicas is acceptable per spec §5.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

struct Window {
    count: u32,
    window_start: Instant,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    buckets: Arc<RwLock<HashMap<String, Window>>>,
}

pub struct Check {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn check(&self, key: &str) -> Check {
        let now = Instant::now();
        let mut buckets = self.buckets.write().await;
        let entry = buckets.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start) >= self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= self.limit {
            let elapsed = now.duration_since(entry.window_start);
            let retry_after = self.window.saturating_sub(elapsed).as_secs().max(1);
            return Check {
                allowed: false,
                remaining: 0,
                retry_after_secs: retry_after,
            };
        }

        entry.count += 1;
        Check {
            allowed: true,
            remaining: self.limit - entry.count,
            retry_after_secs: 0,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blocks_after_limit() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            assert!(rl.check("peer-1").await.allowed);
        }
        let blocked = rl.check("peer-1").await;
        assert!(!blocked.allowed);
        assert!(blocked.retry_after_secs > 0);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let rl = RateLimiter::new(1, Duration::from_secs(60));
        assert!(rl.check("a").await.allowed);
        assert!(rl.check("b").await.allowed);
        assert!(!rl.check("a").await.allowed);
    }
}
