//! Per-client-key sliding-window rate limiting.
//!
//! One limiter instance is built from config at startup and injected
//! wherever a budget check is needed; it is never reached through a
//! global. Each (key, class) pair keeps a rolling deque of attempt
//! timestamps, so a request at `t` and one at `t+61s` against a 1-minute
//! window never share a bucket.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Endpoint classes with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Login,
    Registration,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Budget {
    limit: usize,
    window: Duration,
}

pub struct RateLimiter {
    login: Budget,
    registration: Budget,
    general: Budget,
    windows: Mutex<HashMap<(String, EndpointClass), VecDeque<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            login: Budget {
                limit: config.login_limit as usize,
                window: Duration::from_secs(config.login_window_seconds),
            },
            registration: Budget {
                limit: config.registration_limit as usize,
                window: Duration::from_secs(config.registration_window_seconds),
            },
            general: Budget {
                limit: config.general_limit as usize,
                window: Duration::from_secs(config.general_window_seconds),
            },
            windows: Mutex::new(HashMap::new()),
        }
    }

    const fn budget(&self, class: EndpointClass) -> Budget {
        match class {
            EndpointClass::Login => self.login,
            EndpointClass::Registration => self.registration,
            EndpointClass::General => self.general,
        }
    }

    /// Atomic increment-and-compare for one key. The critical section is a
    /// single short map operation; the expensive work of a request never
    /// happens under this lock.
    pub fn check(&self, key: &str, class: EndpointClass) -> Decision {
        let budget = self.budget(class);
        let now = Instant::now();

        let mut windows = self.windows.lock().unwrap();
        let attempts = windows.entry((key.to_string(), class)).or_default();

        while let Some(oldest) = attempts.front() {
            if now.duration_since(*oldest) >= budget.window {
                attempts.pop_front();
            } else {
                break;
            }
        }

        if attempts.len() >= budget.limit {
            let oldest = attempts.front().copied().unwrap_or(now);
            let retry_after = budget.window.saturating_sub(now.duration_since(oldest));
            return Decision::Deny { retry_after };
        }

        attempts.push_back(now);
        Decision::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(login_limit: u32, login_window_seconds: u64) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            login_limit,
            login_window_seconds,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn allows_up_to_the_budget_then_denies() {
        let limiter = limiter(5, 60);

        for _ in 0..5 {
            assert_eq!(limiter.check("1.2.3.4", EndpointClass::Login), Decision::Allow);
        }

        match limiter.check("1.2.3.4", EndpointClass::Login) {
            Decision::Deny { retry_after } => assert!(retry_after > Duration::ZERO),
            Decision::Allow => panic!("sixth attempt should be denied"),
        }
    }

    #[test]
    fn keys_are_independent() {
        let limiter = limiter(1, 60);

        assert_eq!(limiter.check("1.2.3.4", EndpointClass::Login), Decision::Allow);
        assert_eq!(limiter.check("5.6.7.8", EndpointClass::Login), Decision::Allow);
        assert!(matches!(
            limiter.check("1.2.3.4", EndpointClass::Login),
            Decision::Deny { .. }
        ));
    }

    #[test]
    fn classes_are_independent() {
        let limiter = limiter(1, 60);

        assert_eq!(limiter.check("1.2.3.4", EndpointClass::Login), Decision::Allow);
        assert_eq!(
            limiter.check("1.2.3.4", EndpointClass::Registration),
            Decision::Allow
        );
        assert_eq!(
            limiter.check("1.2.3.4", EndpointClass::General),
            Decision::Allow
        );
    }

    #[test]
    fn window_rolls_with_elapsed_time() {
        // Sub-second window so the test can wait it out for real.
        let limiter = RateLimiter::new(&RateLimitConfig {
            login_limit: 1,
            login_window_seconds: 0,
            ..RateLimitConfig::default()
        });

        assert_eq!(limiter.check("1.2.3.4", EndpointClass::Login), Decision::Allow);
        // A zero-length window expires immediately: no fixed bucket boundary.
        assert_eq!(limiter.check("1.2.3.4", EndpointClass::Login), Decision::Allow);
    }

    #[test]
    fn expired_attempts_free_the_budget() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            login_limit: 2,
            login_window_seconds: 1,
            ..RateLimitConfig::default()
        });

        assert_eq!(limiter.check("k", EndpointClass::Login), Decision::Allow);
        assert_eq!(limiter.check("k", EndpointClass::Login), Decision::Allow);
        assert!(matches!(
            limiter.check("k", EndpointClass::Login),
            Decision::Deny { .. }
        ));

        std::thread::sleep(Duration::from_millis(1100));
        assert_eq!(limiter.check("k", EndpointClass::Login), Decision::Allow);
    }
}
