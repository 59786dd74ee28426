// Per-user sliding-window rate limiting

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

/// Request ceilings per sliding window
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 20,
            per_hour: 100,
            per_day: 500,
        }
    }
}

/// Remaining allowance per window for one user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemainingRequests {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

/// Sliding-window limiter over per-user timestamp lists.
/// Timestamps older than 24 hours are pruned on every touch.
pub struct RateLimiter {
    limits: RateLimits,
    windows: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Check and record a request for `user_id` at the current time.
    /// Returns false (and records nothing) when any window is at its ceiling.
    pub fn check_limit(&self, user_id: &str) -> bool {
        self.check_limit_at(user_id, Utc::now())
    }

    /// Clock-injected variant for deterministic tests
    pub fn check_limit_at(&self, user_id: &str, now: DateTime<Utc>) -> bool {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let timestamps = windows.entry(user_id.to_string()).or_default();
        timestamps.retain(|t| now.signed_duration_since(*t) < Duration::hours(24));

        let (minute, hour, day) = count_windows(timestamps, now);
        if minute >= self.limits.per_minute
            || hour >= self.limits.per_hour
            || day >= self.limits.per_day
        {
            log::warn!("Rate limit hit for user {user_id}");
            return false;
        }
        timestamps.push(now);
        true
    }

    pub fn remaining_requests(&self, user_id: &str) -> RemainingRequests {
        self.remaining_requests_at(user_id, Utc::now())
    }

    pub fn remaining_requests_at(&self, user_id: &str, now: DateTime<Utc>) -> RemainingRequests {
        let windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (minute, hour, day) = windows
            .get(user_id)
            .map(|timestamps| count_windows(timestamps, now))
            .unwrap_or((0, 0, 0));
        RemainingRequests {
            per_minute: self.limits.per_minute.saturating_sub(minute),
            per_hour: self.limits.per_hour.saturating_sub(hour),
            per_day: self.limits.per_day.saturating_sub(day),
        }
    }
}

fn count_windows(timestamps: &[DateTime<Utc>], now: DateTime<Utc>) -> (u32, u32, u32) {
    let mut minute = 0;
    let mut hour = 0;
    let mut day = 0;
    for t in timestamps {
        let age = now.signed_duration_since(*t);
        if age < Duration::seconds(60) {
            minute += 1;
        }
        if age < Duration::seconds(3600) {
            hour += 1;
        }
        if age < Duration::seconds(86400) {
            day += 1;
        }
    }
    (minute, hour, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_up_to_minute_ceiling() {
        let limiter = RateLimiter::new(RateLimits::default());
        let now = Utc::now();
        for _ in 0..20 {
            assert!(limiter.check_limit_at("u1", now));
        }
        assert!(!limiter.check_limit_at("u1", now));
    }

    #[test]
    fn test_rejected_request_is_not_recorded() {
        let limiter = RateLimiter::new(RateLimits::default());
        let now = Utc::now();
        for _ in 0..20 {
            limiter.check_limit_at("u1", now);
        }
        // Rejections must not consume allowance
        for _ in 0..5 {
            assert!(!limiter.check_limit_at("u1", now));
        }
        let remaining = limiter.remaining_requests_at("u1", now);
        assert_eq!(remaining.per_minute, 0);
        assert_eq!(remaining.per_hour, 80);
    }

    #[test]
    fn test_minute_window_slides() {
        let limiter = RateLimiter::new(RateLimits::default());
        let now = Utc::now();
        for _ in 0..20 {
            assert!(limiter.check_limit_at("u1", now));
        }
        assert!(!limiter.check_limit_at("u1", now));
        // 61 seconds later the minute window has emptied
        let later = now + Duration::seconds(61);
        assert!(limiter.check_limit_at("u1", later));
    }

    #[test]
    fn test_hourly_ceiling_applies_across_minutes() {
        let limiter = RateLimiter::new(RateLimits::default());
        let start = Utc::now();
        // 100 requests spread over 10 minutes, well under the minute limit
        for i in 0..100u32 {
            let at = start + Duration::seconds(i as i64 * 6);
            assert!(limiter.check_limit_at("u1", at));
        }
        let after = start + Duration::seconds(660);
        assert!(!limiter.check_limit_at("u1", after));
    }

    #[test]
    fn test_users_are_independent() {
        let limiter = RateLimiter::new(RateLimits::default());
        let now = Utc::now();
        for _ in 0..20 {
            limiter.check_limit_at("u1", now);
        }
        assert!(!limiter.check_limit_at("u1", now));
        assert!(limiter.check_limit_at("u2", now));
    }

    #[test]
    fn test_old_timestamps_pruned() {
        let limiter = RateLimiter::new(RateLimits::default());
        let now = Utc::now();
        for _ in 0..20 {
            limiter.check_limit_at("u1", now);
        }
        let next_day = now + Duration::hours(25);
        let remaining = limiter.remaining_requests_at("u1", next_day);
        assert_eq!(remaining.per_day, 500);
        assert!(limiter.check_limit_at("u1", next_day));
    }
}
