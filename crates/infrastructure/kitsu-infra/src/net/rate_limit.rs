use reqwest::header::HeaderMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

/// Added to every advertised reset window.
pub const RATE_LIMIT_MARGIN: Duration = Duration::from_millis(100);

const HEADER_LIMIT: &str = "x-ratelimit-limit";
const HEADER_REMAINING: &str = "x-ratelimit-remaining";
const HEADER_RESET: &str = "x-ratelimit-reset";
const HEADER_RESET_AFTER: &str = "x-ratelimit-reset-after";

/// Quota state reported by the remote with every API response.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateLimit {
    pub limit: u64,
    pub remaining: u64,
    /// Unix time at which the quota refills.
    pub reset: f64,
    /// Seconds until the quota refills.
    pub reset_after: f64,
}

impl RateLimit {
    /// `None` if the response carries none of the rate-limit headers.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let number = |name: &str| -> Option<f64> {
            headers
                .get(name)?
                .to_str()
                .ok()?
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
        };
        let limit = number(HEADER_LIMIT);
        let remaining = number(HEADER_REMAINING);
        let reset = number(HEADER_RESET);
        let reset_after = number(HEADER_RESET_AFTER);
        if limit.is_none() && remaining.is_none() && reset.is_none() && reset_after.is_none() {
            return None;
        }
        Some(Self {
            limit: limit.unwrap_or(0.0).max(0.0) as u64,
            remaining: remaining.unwrap_or(0.0).max(0.0) as u64,
            reset: reset.unwrap_or(0.0),
            reset_after: reset_after.unwrap_or(0.0),
        })
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    pub fn sleep_duration(&self) -> Duration {
        Duration::from_secs_f64(self.reset_after.max(0.0)) + RATE_LIMIT_MARGIN
    }

    pub async fn sleep(&self) {
        info!("Rate limited. Status: {self}.");
        tokio::time::sleep(self.sleep_duration()).await;
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "limit={}, remaining={}, reset={}, reset_after={}",
            self.limit, self.remaining, self.reset, self.reset_after
        )
    }
}

/// Most recent quota seen by any request of one sync.
///
/// Updated from every response, so under concurrent requests it only tracks
/// the quota approximately.
#[derive(Debug, Clone, Default)]
pub struct RemoteLimitState {
    last: Arc<Mutex<Option<(RateLimit, Instant)>>>,
}

impl RemoteLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, rate_limit: RateLimit) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some((rate_limit, Instant::now()));
        }
    }

    pub fn current(&self) -> Option<RateLimit> {
        self.last.lock().ok().and_then(|last| last.map(|(rl, _)| rl))
    }

    /// How long to wait before the next request, if the last response said
    /// the quota is used up.
    pub fn pending_wait(&self) -> Option<Duration> {
        let last = self.last.lock().ok()?;
        let (rate_limit, seen_at) = (*last)?;
        if !rate_limit.is_exhausted() {
            return None;
        }
        rate_limit
            .sleep_duration()
            .checked_sub(seen_at.elapsed())
            .filter(|d| !d.is_zero())
    }

    pub async fn wait_if_exhausted(&self) {
        if let Some(wait) = self.pending_wait() {
            info!("Rate limit quota used up, waiting {:.1}s.", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn parses_integer_and_float_headers() {
        let rl = RateLimit::from_headers(&headers(&[
            ("x-ratelimit-limit", "60"),
            ("x-ratelimit-remaining", "0"),
            ("x-ratelimit-reset", "1713800000.25"),
            ("x-ratelimit-reset-after", "2.5"),
        ]))
        .unwrap();
        assert_eq!(rl.limit, 60);
        assert!(rl.is_exhausted());
        assert_eq!(rl.reset_after, 2.5);
        assert_eq!(rl.sleep_duration(), Duration::from_millis(2600));
    }

    #[test]
    fn no_headers_means_no_rate_limit() {
        assert!(RateLimit::from_headers(&HeaderMap::new()).is_none());
    }

    #[test]
    fn negative_reset_after_sleeps_only_the_margin() {
        let rl = RateLimit {
            reset_after: -3.0,
            ..RateLimit::default()
        };
        assert_eq!(rl.sleep_duration(), RATE_LIMIT_MARGIN);
    }

    #[test]
    fn state_only_waits_when_exhausted() {
        let state = RemoteLimitState::new();
        assert!(state.pending_wait().is_none());
        state.update(RateLimit {
            limit: 10,
            remaining: 3,
            reset: 0.0,
            reset_after: 5.0,
        });
        assert!(state.pending_wait().is_none());
        state.update(RateLimit {
            limit: 10,
            remaining: 0,
            reset: 0.0,
            reset_after: 5.0,
        });
        let wait = state.pending_wait().unwrap();
        assert!(wait > Duration::from_secs(4) && wait <= Duration::from_millis(5100));
    }
}
