use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lets at most one event per key through every `interval`.
///
/// Used to keep flood and host-movement logs bounded under churn.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: HashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    pub fn allow(&mut self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    pub fn allow_at(&mut self, key: &str, now: Instant) -> bool {
        match self.last.get(key) {
            Some(previous) if now.duration_since(*previous) < self.interval => false,
            _ => {
                self.last.insert(key.to_string(), now);
                true
            }
        }
    }
}

/// Logs through `log` at the given level unless `key` fired within the limiter's interval.
#[macro_export]
macro_rules! rate_limited {
    ($limiter:expr, $key:expr, $level:expr, $($arg:tt)+) => {
        if $limiter.allow(&$key) {
            log::log!($level, $($arg)+);
        }
    };
}
