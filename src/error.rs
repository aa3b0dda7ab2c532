//! The error type returned at the public boundary.
//!
//! Every transport-level failure (network, abort, HTTP status, application
//! payload) is normalized into an [`ErrorRecord`] and surfaced as
//! [`Error::Request`]. The other variants describe failures that happen
//! outside of a request attempt: bad configuration, body serialization,
//! interceptor rejections, and typed decoding of a successful payload.

use crate::interceptor::InterceptorError;
use crate::rate_limit::RateLimitInfo;
use crate::record::{ErrorKind, ErrorRecord};
use http::StatusCode;

/// The main error type for client calls.
///
/// # Examples
///
/// ```no_run
/// use courier::{Client, Error, ErrorKind};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.get("/endpoint").await {
///     Ok(outcome) => println!("Success: {:?}", outcome.response().map(|r| &r.data)),
///     Err(Error::Request(record)) if record.kind() == ErrorKind::Abort => {
///         eprintln!("Cancelled: {}", record.message);
///     }
///     Err(Error::Request(record)) => {
///         eprintln!("{} error {}: {}", record.kind(), record.status, record.message);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A request failed and its record was dispatched to the error callbacks.
    #[error("{0}")]
    Request(Box<ErrorRecord>),

    /// A request or response interceptor rejected.
    #[error("Interceptor failed: {0}")]
    Interceptor(#[from] InterceptorError),

    /// Failed to deserialize a successful response body into the expected type.
    ///
    /// # Fields
    ///
    /// * `raw_response` - The response payload as text
    /// * `serde_error` - The error message from serde
    /// * `status` - The HTTP status code of the response
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The payload that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Invalid configuration was provided, such as a malformed header.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl From<ErrorRecord> for Error {
    fn from(record: ErrorRecord) -> Self {
        Error::Request(Box::new(record))
    }
}

impl Error {
    /// Returns the error record of a failed request.
    pub fn record(&self) -> Option<&ErrorRecord> {
        match self {
            Error::Request(record) => Some(record),
            _ => None,
        }
    }

    /// Consumes the error, returning the error record of a failed request.
    pub fn into_record(self) -> Option<ErrorRecord> {
        match self {
            Error::Request(record) => Some(*record),
            _ => None,
        }
    }

    /// Returns the failure kind of a failed request.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.record().map(ErrorRecord::kind)
    }

    /// Returns the HTTP status code if this error has one.
    ///
    /// `network` and `abort` failures carry no status.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Request(record) => StatusCode::from_u16(record.status).ok(),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if the request failed because its timeout elapsed.
    pub fn is_timeout(&self) -> bool {
        self.record().is_some_and(ErrorRecord::is_timeout)
    }

    /// Returns `true` if retrying the same request could succeed.
    ///
    /// Network failures, `429`, and `5xx` statuses are considered retryable.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier::{Error, ErrorRecord};
    /// use courier::record::ResponseInfo;
    ///
    /// let response = ResponseInfo {
    ///     status: 503,
    ///     status_text: "Service Unavailable".into(),
    ///     headers: Default::default(),
    ///     data: serde_json::Value::Null,
    ///     rate_limit: None,
    /// };
    /// let err = Error::from(ErrorRecord::http("down", "https://api.test", response));
    /// assert!(err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Request(record) => match record.kind() {
                ErrorKind::Network => true,
                ErrorKind::Abort => false,
                ErrorKind::Http | ErrorKind::Application => {
                    record.status >= 500 || record.status == 429
                }
            },
            _ => false,
        }
    }

    /// Returns rate limit information parsed from the failed response.
    pub fn rate_limit_info(&self) -> Option<&RateLimitInfo> {
        self.record()?.response()?.rate_limit.as_ref()
    }

    /// Returns the recommended delay from rate limit information, capped by `max_wait`.
    pub fn rate_limit_delay(
        &self,
        max_wait: std::time::Duration,
    ) -> Option<std::time::Duration> {
        self.rate_limit_info()?.delay(max_wait)
    }
}

/// A specialized `Result` type for client calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::AbortReason;
    use crate::record::{NetworkInfo, ResponseInfo};
    use std::time::Duration;

    fn response(status: u16, headers: http::HeaderMap) -> ResponseInfo {
        ResponseInfo {
            status,
            status_text: String::new(),
            headers: Default::default(),
            data: serde_json::Value::Null,
            rate_limit: Some(RateLimitInfo::from_headers(&headers)),
        }
    }

    #[test]
    fn test_abort_has_no_status() {
        let err = Error::from(ErrorRecord::abort(AbortReason::Timeout));
        assert_eq!(err.status(), None);
        assert_eq!(err.kind(), Some(ErrorKind::Abort));
        assert!(err.is_timeout());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_network_is_retryable() {
        let source = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = Error::from(ErrorRecord::network(
            source,
            NetworkInfo {
                url: "https://api.test".into(),
                method: "GET".into(),
                params: Default::default(),
                headers: Default::default(),
            },
        ));
        assert!(err.is_retryable());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_rate_limit_delay() {
        let mut headers = http::HeaderMap::new();
        headers.insert("retry-after", "60".parse().unwrap());
        let err = Error::from(ErrorRecord::http(
            "slow down",
            "https://api.test",
            response(429, headers),
        ));

        assert!(err.is_retryable());
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(
            err.rate_limit_delay(Duration::from_secs(30)),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn test_into_record() {
        let err = Error::ConfigurationError("bad".into());
        assert!(err.into_record().is_none());

        let err = Error::from(ErrorRecord::http(
            "missing",
            "https://api.test/x",
            response(404, http::HeaderMap::new()),
        ));
        let record = err.into_record().unwrap();
        assert_eq!(record.request_url(), Some("https://api.test/x"));
        assert!(!Error::from(record).is_retryable());
    }
}
