//! Rate limit header parsing.
//!
//! `http` and `application` error records built from a response that carries
//! `Retry-After` or `RateLimit-*` headers expose the parsed values, so an
//! `on_rate_limit` callback can decide how long to back off.

use http::HeaderMap;
use serde::{Serialize, Serializer};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Rate limit state reported by the server.
///
/// Both the `X-RateLimit-*` convention and the unprefixed `RateLimit-*`
/// headers are recognized; the prefixed form wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    /// `Retry-After`, given either as seconds or as an HTTP date.
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "as_seconds"
    )]
    pub retry_after: Option<Duration>,

    /// When the current window resets (`*RateLimit-Reset`, Unix seconds).
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "as_unix_seconds"
    )]
    pub reset_at: Option<SystemTime>,

    /// Requests left in the current window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,

    /// Requests allowed per window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl RateLimitInfo {
    /// Reads the rate limit headers of a response.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier::rate_limit::RateLimitInfo;
    /// use http::HeaderMap;
    /// use std::time::Duration;
    ///
    /// let mut headers = HeaderMap::new();
    /// headers.insert("retry-after", "60".parse().unwrap());
    /// headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
    ///
    /// let info = RateLimitInfo::from_headers(&headers);
    /// assert_eq!(info.retry_after, Some(Duration::from_secs(60)));
    /// assert!(info.is_rate_limited());
    /// ```
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let retry_after = header_text(headers, "retry-after").and_then(|value| {
            match value.parse::<u64>() {
                Ok(seconds) => Some(Duration::from_secs(seconds)),
                Err(_) => until(httpdate::parse_http_date(value).ok()?),
            }
        });

        Self {
            retry_after,
            reset_at: window_value(headers, "reset")
                .map(|seconds| UNIX_EPOCH + Duration::from_secs(seconds)),
            remaining: window_value(headers, "remaining"),
            limit: window_value(headers, "limit"),
        }
    }

    /// How long to wait before the next request, capped at `max_wait`.
    ///
    /// `retry_after` takes precedence over `reset_at`. Returns `None` when
    /// neither is known or the reset time already passed.
    pub fn delay(&self, max_wait: Duration) -> Option<Duration> {
        self.retry_after
            .or_else(|| until(self.reset_at?))
            .map(|delay| delay.min(max_wait))
    }

    /// `true` when the server asked to wait or reported an exhausted window.
    pub fn is_rate_limited(&self) -> bool {
        self.retry_after.is_some() || self.remaining == Some(0)
    }

    /// `true` when the response carried none of the recognized headers.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

/// Reads `x-ratelimit-{field}`, falling back to `ratelimit-{field}`.
fn window_value(headers: &HeaderMap, field: &str) -> Option<u64> {
    ["x-ratelimit-", "ratelimit-"]
        .iter()
        .find_map(|prefix| header_text(headers, &format!("{}{}", prefix, field))?.parse().ok())
}

fn until(time: SystemTime) -> Option<Duration> {
    time.duration_since(SystemTime::now()).ok()
}

fn as_seconds<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    value.map(|duration| duration.as_secs()).serialize(serializer)
}

fn as_unix_seconds<S: Serializer>(
    value: &Option<SystemTime>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    value
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_secs())
        .serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use serde_json::json;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|&(name, value)| {
                (
                    http::HeaderName::from_static(name),
                    HeaderValue::from_str(value).unwrap(),
                )
            })
            .collect()
    }

    fn unix_now() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }

    #[test]
    fn test_retry_after_seconds_and_http_date() {
        let info = RateLimitInfo::from_headers(&headers(&[("retry-after", "60")]));
        assert_eq!(info.retry_after, Some(Duration::from_secs(60)));

        let later = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(120));
        let info = RateLimitInfo::from_headers(&headers(&[("retry-after", later.as_str())]));
        let wait = info.retry_after.unwrap();
        assert!(wait > Duration::from_secs(100) && wait <= Duration::from_secs(120));

        let past = httpdate::fmt_http_date(SystemTime::now() - Duration::from_secs(120));
        let info = RateLimitInfo::from_headers(&headers(&[("retry-after", past.as_str())]));
        assert_eq!(info.retry_after, None);
    }

    #[test]
    fn test_prefixed_headers_win() {
        let info = RateLimitInfo::from_headers(&headers(&[
            ("x-ratelimit-remaining", "3"),
            ("ratelimit-remaining", "9"),
            ("ratelimit-limit", "100"),
        ]));

        assert_eq!(info.remaining, Some(3));
        assert_eq!(info.limit, Some(100));
        assert!(!info.is_rate_limited());
    }

    #[test]
    fn test_delay_from_reset_time() {
        let reset = (unix_now() + 3).to_string();
        let info = RateLimitInfo::from_headers(&headers(&[
            ("x-ratelimit-reset", reset.as_str()),
            ("x-ratelimit-remaining", "0"),
        ]));

        assert!(info.is_rate_limited());
        // Whole-second timestamps can shave up to a second off the wait.
        let delay = info.delay(Duration::from_secs(300)).unwrap();
        assert!(delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3));

        let passed = (unix_now() - 10).to_string();
        let info = RateLimitInfo::from_headers(&headers(&[("ratelimit-reset", passed.as_str())]));
        assert_eq!(info.delay(Duration::from_secs(300)), None);
    }

    #[test]
    fn test_delay_prefers_retry_after_and_is_capped() {
        let info = RateLimitInfo {
            retry_after: Some(Duration::from_secs(600)),
            reset_at: Some(SystemTime::now() + Duration::from_secs(5)),
            ..RateLimitInfo::default()
        };

        assert_eq!(info.delay(Duration::from_secs(300)), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_empty_and_serialized_form() {
        assert!(RateLimitInfo::from_headers(&HeaderMap::new()).is_empty());
        assert!(RateLimitInfo::from_headers(&headers(&[("retry-after", "soon")])).is_empty());

        let info = RateLimitInfo::from_headers(&headers(&[
            ("retry-after", "30"),
            ("ratelimit-remaining", "0"),
            ("ratelimit-reset", "1700000000"),
        ]));
        assert!(!info.is_empty());
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"retryAfter": 30, "resetAt": 1700000000u64, "remaining": 0})
        );
    }
}
