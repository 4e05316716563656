use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::BlogConfig;

/// Sliding-window limits for one kind of action.
#[derive(Debug, Clone, Copy)]
pub struct Limit {
    pub max_attempts: u64,
    pub window: Duration,
}

/// In-memory limiter keyed by `"<bucket>:<client hash>"`.
pub struct RateLimiter {
    login: Limit,
    comment: Limit,
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Login,
    Comment,
}

impl Bucket {
    fn prefix(self) -> &'static str {
        match self {
            Bucket::Login => "login",
            Bucket::Comment => "comment",
        }
    }
}

impl RateLimiter {
    pub fn new(login: Limit, comment: Limit) -> Self {
        RateLimiter {
            login,
            comment,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &BlogConfig) -> Self {
        let window = Duration::from_secs(config.rate_window_minutes.max(1) * 60);
        Self::new(
            Limit { max_attempts: config.login_attempts.max(1), window },
            Limit { max_attempts: config.comment_attempts.max(1), window },
        )
    }

    /// Record an attempt; `false` once the bucket is full for this client.
    pub fn check_and_record(&self, bucket: Bucket, client: &str) -> bool {
        let limit = match bucket {
            Bucket::Login => self.login,
            Bucket::Comment => self.comment,
        };
        let key = format!("{}:{}", bucket.prefix(), client);
        let now = Instant::now();
        let horizon = self.login.window.max(self.comment.window);

        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // Drop idle clients so the map does not grow without bound
        map.retain(|_, attempts| {
            attempts.retain(|t| now.duration_since(*t) < horizon);
            !attempts.is_empty()
        });

        let attempts = map.entry(key).or_default();
        attempts.retain(|t| now.duration_since(*t) < limit.window);
        if (attempts.len() as u64) < limit.max_attempts {
            attempts.push(now);
            true
        } else {
            false
        }
    }

    /// Forget a client's attempts, e.g. after a successful login.
    pub fn reset(&self, bucket: Bucket, client: &str) {
        let key = format!("{}:{}", bucket.prefix(), client);
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&key);
    }
}
