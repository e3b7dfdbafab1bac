//! Sliding-window request tracker and the logistic curve that turns
//! request density into an Argon2id iteration count (C5, §4.3).
//!
//! Every check is read-prune-decide-write under a single lock
//! acquisition per identity: stale timestamps are dropped from the
//! window before the density is computed, so a bursty identity that
//! goes quiet ages back down to the minimum iteration count on its own.
//! Splitting this into a separate read and write would let a burst
//! exceed `max_requests` between the two (§9 "Tracker atomicity").

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::config::RateLimiterConfig;
use crate::store::TrackerEntry;

const LOGISTIC_K: f64 = 10.0;
const LOGISTIC_MID: f64 = 0.55;

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-LOGISTIC_K * (x - LOGISTIC_MID)).exp())
}

/// Maps request density (`min(1, request_count / max_requests)`) onto
/// an Argon2id iteration count via a logistic curve, normalized so the
/// curve spans exactly `[pow_iterations_min, pow_iterations_max]` at
/// `density ∈ {0, 1}`.
pub fn pow_iterations(request_count: u64, cfg: &RateLimiterConfig) -> u32 {
    let density = (request_count as f64 / cfg.max_requests as f64).min(1.0);
    let raw0 = logistic(0.0);
    let raw1 = logistic(1.0);
    let normalized = (logistic(density) - raw0) / (raw1 - raw0);
    let span = (cfg.pow_iterations_max - cfg.pow_iterations_min) as f64;
    let iterations = cfg.pow_iterations_min as f64 + normalized * span;
    iterations
        .round()
        .clamp(cfg.pow_iterations_min as f64, cfg.pow_iterations_max as f64) as u32
}

/// Outcome of recording one request attempt.
pub enum Admission {
    Admitted { iterations: u32, request_count: u64 },
    Limited { retry_after_secs: u64 },
}

/// Per-identity sliding-window tracker driving both rate limiting and
/// PoW iteration-count selection.
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    entries: Mutex<HashMap<String, TrackerEntry>>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig) -> Self {
        Self {
            cfg,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `identity` (typically a hash of the
    /// client's remote address) and return whether it's admitted, and
    /// if so, the iteration count it should solve its PoW challenge at.
    pub fn admit(&self, identity: &str, now: DateTime<Utc>) -> Admission {
        let window_start = now - Duration::seconds(self.cfg.window_secs as i64);
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(identity.to_string())
            .or_insert_with(|| TrackerEntry {
                identity: identity.to_string(),
                request_timestamps: Vec::new(),
                expires_at: now + Duration::seconds(self.cfg.tracker_ttl_secs as i64),
            });

        entry.request_timestamps.retain(|ts| *ts >= window_start);
        entry.expires_at = now + Duration::seconds(self.cfg.tracker_ttl_secs as i64);

        if entry.request_timestamps.len() as u64 >= self.cfg.max_requests {
            let first = entry.request_timestamps.first().copied().unwrap_or(now);
            let retry_at = first + Duration::seconds(self.cfg.window_secs as i64);
            let retry_after_secs = (retry_at - now).num_seconds().max(1) as u64;
            return Admission::Limited { retry_after_secs };
        }

        entry.request_timestamps.push(now);
        let request_count = entry.request_timestamps.len() as u64;
        Admission::Admitted {
            iterations: pow_iterations(request_count, &self.cfg),
            request_count,
        }
    }

    /// Drop entries whose `expires_at` has passed. Called from the
    /// expiry janitor (C8) alongside session sweeping.
    pub fn sweep_stale(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at >= now);
        before - entries.len()
    }

    pub fn tracked_identities(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RateLimiterConfig {
        RateLimiterConfig {
            window_secs: 60,
            max_requests: 8,
            tracker_ttl_secs: 300,
            pow_iterations_min: 2,
            pow_iterations_max: 7,
        }
    }

    #[test]
    fn low_density_gets_minimum_iterations() {
        assert_eq!(pow_iterations(0, &cfg()), 2);
    }

    #[test]
    fn saturating_density_gets_maximum_iterations() {
        assert_eq!(pow_iterations(1000, &cfg()), 7);
    }

    #[test]
    fn iterations_are_monotonic_in_request_count() {
        let c = cfg();
        let mut prev = pow_iterations(0, &c);
        for n in 1..=c.max_requests {
            let next = pow_iterations(n, &c);
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn repeated_admits_raise_density_and_iterations() {
        let limiter = RateLimiter::new(cfg());
        let now = Utc::now();
        let Admission::Admitted { request_count: first_count, iterations: first_iter } = limiter.admit("1.2.3.4", now) else {
            panic!("expected admission");
        };
        assert_eq!(first_count, 1);
        for i in 1..6 {
            limiter.admit("1.2.3.4", now + Duration::seconds(i));
        }
        let Admission::Admitted { request_count: last_count, iterations: last_iter } =
            limiter.admit("1.2.3.4", now + Duration::seconds(6))
        else {
            panic!("expected admission");
        };
        assert!(last_count > first_count);
        assert!(last_iter >= first_iter);
    }

    #[test]
    fn max_requests_within_window_triggers_rate_limit() {
        let limiter = RateLimiter::new(cfg());
        let now = Utc::now();
        for i in 0..cfg().max_requests {
            let admission = limiter.admit("9.9.9.9", now + Duration::seconds(i as i64));
            assert!(matches!(admission, Admission::Admitted { .. }));
        }
        let limited = limiter.admit("9.9.9.9", now + Duration::seconds(cfg().max_requests as i64));
        match limited {
            Admission::Limited { retry_after_secs } => assert!(retry_after_secs >= 1),
            Admission::Admitted { .. } => panic!("expected the request to be rate-limited"),
        }
    }

    #[test]
    fn window_expiry_resets_density() {
        let limiter = RateLimiter::new(cfg());
        let now = Utc::now();
        for i in 0..5 {
            limiter.admit("5.6.7.8", now + Duration::seconds(i));
        }
        let Admission::Admitted { request_count, .. } = limiter.admit("5.6.7.8", now + Duration::seconds(1000)) else {
            panic!("expected admission");
        };
        assert_eq!(request_count, 1);
    }

    #[test]
    fn sweep_stale_removes_old_identities() {
        let limiter = RateLimiter::new(cfg());
        let now = Utc::now();
        limiter.admit("9.9.9.9", now);
        assert_eq!(limiter.tracked_identities(), 1);
        let swept = limiter.sweep_stale(now + Duration::seconds(10_000));
        assert_eq!(swept, 1);
        assert_eq!(limiter.tracked_identities(), 0);
    }
}
