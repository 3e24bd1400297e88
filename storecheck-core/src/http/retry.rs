use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Method;

use super::outcome::FailureKind;

const STATUS_FORCELIST: [u16; 5] = [429, 500, 502, 503, 504];
const RETRY_AFTER_STATUSES: [u16; 3] = [413, 429, 503];
const BACKOFF_MAX: Duration = Duration::from_secs(120);

/// Fixed connection-level retry policy of the shop session.
///
/// `total` counts retries after the first attempt. Statuses in the forcelist
/// are retried for GET and POST only; connect and timeout failures are retried
/// for every method.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    total: usize,
    backoff_factor: f64,
    allowed_methods: Vec<Method>,
}

impl RetryPolicy {
    pub fn standard() -> Self {
        Self {
            total: 3,
            backoff_factor: 1.0,
            allowed_methods: vec![Method::GET, Method::POST],
        }
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor.max(0.0);
        self
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_retryable_status(&self, method: &Method, status: u16) -> bool {
        self.allowed_methods.contains(method) && STATUS_FORCELIST.contains(&status)
    }

    /// Connect failures are always retried; timeouts only for allowed methods.
    pub fn is_retryable_failure(&self, method: &Method, kind: &FailureKind) -> bool {
        match kind {
            FailureKind::Connect => true,
            FailureKind::Timeout => self.allowed_methods.contains(method),
            _ => false,
        }
    }

    /// Sleep before retry number `retry` (1-based): none before the first,
    /// then `factor * 2^(retry - 1)` seconds, capped.
    pub fn backoff(&self, retry: usize) -> Duration {
        if retry <= 1 || self.backoff_factor == 0.0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(32) as i32;
        let seconds = self.backoff_factor * 2f64.powi(exponent);
        Duration::try_from_secs_f64(seconds)
            .unwrap_or(BACKOFF_MAX)
            .min(BACKOFF_MAX)
    }

    /// Delay demanded by a `Retry-After` header, for the statuses that honour it,
    /// capped like the computed backoff.
    pub fn retry_after(&self, status: u16, headers: &HeaderMap) -> Option<Duration> {
        if !RETRY_AFTER_STATUSES.contains(&status) {
            return None;
        }
        let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(Duration::from_secs(seconds).min(BACKOFF_MAX));
        }
        let at = DateTime::parse_from_rfc2822(value).ok()?;
        let delta = at.with_timezone(&Utc) - Utc::now();
        Some(delta.to_std().unwrap_or(Duration::ZERO).min(BACKOFF_MAX))
    }

    pub(crate) fn delay_before(
        &self,
        retry: usize,
        status: Option<u16>,
        headers: Option<&HeaderMap>,
    ) -> Duration {
        match (status, headers) {
            (Some(status), Some(headers)) => self
                .retry_after(status, headers)
                .unwrap_or_else(|| self.backoff(retry)),
            _ => self.backoff(retry),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn standard_policy_matches_session_defaults() {
        let policy = RetryPolicy::standard();
        assert_eq!(policy.total(), 3);
        for status in [429, 500, 502, 503, 504] {
            assert!(policy.is_retryable_status(&Method::GET, status));
            assert!(policy.is_retryable_status(&Method::POST, status));
        }
        assert!(!policy.is_retryable_status(&Method::GET, 404));
        assert!(!policy.is_retryable_status(&Method::GET, 501));
        assert!(!policy.is_retryable_status(&Method::PUT, 503));
        assert!(!policy.is_retryable_status(&Method::DELETE, 500));
        assert!(policy.is_retryable_failure(&Method::PUT, &FailureKind::Connect));
        assert!(policy.is_retryable_failure(&Method::GET, &FailureKind::Timeout));
        assert!(!policy.is_retryable_failure(&Method::PUT, &FailureKind::Timeout));
        assert!(!policy.is_retryable_failure(&Method::GET, &FailureKind::Body));
    }

    #[test]
    fn backoff_grows_exponentially_after_first_retry() {
        let policy = RetryPolicy::standard();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(30), BACKOFF_MAX);
        assert_eq!(
            RetryPolicy::standard().with_backoff_factor(0.0).backoff(3),
            Duration::ZERO
        );
    }

    #[test]
    fn retry_after_seconds_overrides_backoff() {
        let policy = RetryPolicy::standard();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(
            policy.delay_before(1, Some(503), Some(&headers)),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.delay_before(2, Some(500), Some(&headers)),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn retry_after_date_in_the_past_means_no_wait() {
        let policy = RetryPolicy::standard();
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(policy.retry_after(429, &headers), Some(Duration::ZERO));
    }

    #[test]
    fn oversized_backoff_factor_saturates_at_the_cap() {
        for factor in [1e300, f64::INFINITY, f64::MAX] {
            let policy = RetryPolicy::standard().with_backoff_factor(factor);
            assert_eq!(policy.backoff(2), BACKOFF_MAX);
            assert_eq!(policy.backoff(4), BACKOFF_MAX);
        }
        let policy = RetryPolicy::standard().with_backoff_factor(f64::NAN);
        assert_eq!(policy.backoff(3), Duration::ZERO);
    }

    #[test]
    fn long_retry_after_is_capped() {
        let policy = RetryPolicy::standard();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("86400"));
        assert_eq!(policy.retry_after(503, &headers), Some(BACKOFF_MAX));

        let tomorrow = (Utc::now() + chrono::Duration::days(1)).to_rfc2822();
        headers.insert(RETRY_AFTER, HeaderValue::from_str(&tomorrow).unwrap());
        assert_eq!(policy.retry_after(429, &headers), Some(BACKOFF_MAX));
    }
}
