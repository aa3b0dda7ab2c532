//! Normalized failure records.
//!
//! Every failure the pipeline observes (a transport that never produced a
//! response, a cancelled request, a non-2xx status, or an application error
//! encoded in a payload) is described by an [`ErrorRecord`] before any user
//! callback sees it.

use crate::abort::AbortReason;
use crate::endpoint::Params;
use crate::rate_limit::RateLimitInfo;
use http::HeaderMap;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The taxonomy tag of an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// No response was obtained (connection refused, DNS, TLS).
    Network,
    /// A response was obtained with a status outside 2xx.
    Http,
    /// The payload itself encodes a domain-level error.
    Application,
    /// The request was cancelled or timed out.
    Abort,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Http => "http",
            ErrorKind::Application => "application",
            ErrorKind::Abort => "abort",
        };
        f.write_str(name)
    }
}

/// Request details captured for `network` records.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkInfo {
    /// The final URL the transport was asked to call.
    pub url: String,
    /// The HTTP method.
    pub method: String,
    /// The parameters the caller supplied.
    pub params: Params,
    /// The headers that were sent.
    pub headers: BTreeMap<String, String>,
}

/// Response details captured for `http` and `application` records.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    /// The HTTP status code.
    pub status: u16,
    /// The canonical reason phrase for the status.
    pub status_text: String,
    /// The response headers.
    pub headers: BTreeMap<String, String>,
    /// The decoded response body.
    pub data: Value,
    /// Parsed rate limit headers, when the response carried any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
}

/// Variant-specific payload of an [`ErrorRecord`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ErrorDetails {
    /// See [`ErrorKind::Network`].
    Network(NetworkInfo),
    /// See [`ErrorKind::Http`].
    #[serde(rename_all = "camelCase")]
    Http {
        request_url: String,
        response: ResponseInfo,
    },
    /// See [`ErrorKind::Application`].
    #[serde(rename_all = "camelCase")]
    Application {
        request_url: String,
        response: ResponseInfo,
    },
    /// See [`ErrorKind::Abort`].
    Abort { reason: AbortReason },
}

/// A normalized description of a failed logical request.
///
/// Records are plain data: callbacks receive them by reference, the error
/// interceptor receives and returns them by value, and the public boundary
/// either returns them inside [`Outcome::Failure`](crate::Outcome::Failure)
/// or wraps them in [`Error::Request`](crate::Error::Request).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// Human-readable message.
    pub message: String,
    /// HTTP status, `0` for network and abort records.
    pub status: u16,
    /// ISO 8601 creation time.
    pub timestamp: String,
    /// Set once the record went through callback dispatch.
    pub handled_by_client: bool,
    /// Free-form values, typically added by the error interceptor.
    pub extras: Map<String, Value>,
    /// Machine-readable code, when one is known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// The underlying error, when the failure came from the transport.
    #[serde(skip)]
    pub original_error: Option<Arc<dyn std::error::Error + Send + Sync>>,
    /// Variant-specific payload.
    #[serde(flatten)]
    pub details: ErrorDetails,
}

impl ErrorRecord {
    fn new(message: String, status: u16, code: Option<String>, details: ErrorDetails) -> Self {
        Self {
            message,
            status,
            timestamp: now_iso8601(),
            handled_by_client: false,
            extras: Map::new(),
            code,
            original_error: None,
            details,
        }
    }

    /// Creates a `network` record for a transport that produced no response.
    pub fn network(
        source: impl std::error::Error + Send + Sync + 'static,
        info: NetworkInfo,
    ) -> Self {
        let mut record = Self::new(
            format!("Network error: {}", source),
            0,
            None,
            ErrorDetails::Network(info),
        );
        record.original_error = Some(Arc::new(source));
        record
    }

    /// Creates an `http` record for a non-2xx response.
    pub fn http(message: impl Into<String>, request_url: impl Into<String>, response: ResponseInfo) -> Self {
        let status = response.status;
        Self::new(
            message.into(),
            status,
            None,
            ErrorDetails::Http {
                request_url: request_url.into(),
                response,
            },
        )
    }

    /// Creates an `application` record for an error encoded in a payload.
    pub fn application(
        message: impl Into<String>,
        code: impl Into<String>,
        request_url: impl Into<String>,
        response: ResponseInfo,
    ) -> Self {
        let status = response.status;
        Self::new(
            message.into(),
            status,
            Some(code.into()),
            ErrorDetails::Application {
                request_url: request_url.into(),
                response,
            },
        )
    }

    /// Creates an `abort` record.
    pub fn abort(reason: AbortReason) -> Self {
        let code = match reason {
            AbortReason::Timeout => "TIMEOUT",
            AbortReason::Cancelled(_) => "ABORT",
        };
        Self::new(
            reason.message().to_string(),
            0,
            Some(code.to_string()),
            ErrorDetails::Abort { reason },
        )
    }

    /// Returns the taxonomy tag.
    pub fn kind(&self) -> ErrorKind {
        match self.details {
            ErrorDetails::Network(_) => ErrorKind::Network,
            ErrorDetails::Http { .. } => ErrorKind::Http,
            ErrorDetails::Application { .. } => ErrorKind::Application,
            ErrorDetails::Abort { .. } => ErrorKind::Abort,
        }
    }

    /// Returns the response details for `http` and `application` records.
    pub fn response(&self) -> Option<&ResponseInfo> {
        match &self.details {
            ErrorDetails::Http { response, .. } | ErrorDetails::Application { response, .. } => {
                Some(response)
            }
            _ => None,
        }
    }

    /// Returns the URL of the failed request, when it is known.
    pub fn request_url(&self) -> Option<&str> {
        match &self.details {
            ErrorDetails::Http { request_url, .. }
            | ErrorDetails::Application { request_url, .. } => Some(request_url),
            ErrorDetails::Network(info) => Some(&info.url),
            ErrorDetails::Abort { .. } => None,
        }
    }

    /// Returns the abort reason for `abort` records.
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.details {
            ErrorDetails::Abort { reason } => Some(reason),
            _ => None,
        }
    }

    /// Returns `true` if this record was produced by an elapsed timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.abort_reason(), Some(AbortReason::Timeout))
    }

    /// Stores a value in the `extras` bag.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error", self.kind())?;
        if self.status != 0 {
            write!(f, " ({})", self.status)?;
        }
        write!(f, ": {}", self.message)
    }
}

pub(crate) fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn header_entries(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response_info(status: u16) -> ResponseInfo {
        ResponseInfo {
            status,
            status_text: "Internal Server Error".to_string(),
            headers: BTreeMap::new(),
            data: json!({"message": "boom"}),
            rate_limit: None,
        }
    }

    #[test]
    fn test_http_record_carries_status_and_url() {
        let record = ErrorRecord::http("boom", "https://api.test/items", response_info(500));

        assert_eq!(record.kind(), ErrorKind::Http);
        assert_eq!(record.status, 500);
        assert_eq!(record.request_url(), Some("https://api.test/items"));
        assert!(!record.handled_by_client);
        assert!(record.extras.is_empty());
        assert!(record.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_abort_record_codes() {
        let timeout = ErrorRecord::abort(AbortReason::Timeout);
        assert_eq!(timeout.kind(), ErrorKind::Abort);
        assert_eq!(timeout.status, 0);
        assert_eq!(timeout.code.as_deref(), Some("TIMEOUT"));
        assert!(timeout.is_timeout());

        let cancelled = ErrorRecord::abort(AbortReason::Cancelled("navigated away".into()));
        assert_eq!(cancelled.code.as_deref(), Some("ABORT"));
        assert_eq!(cancelled.message, "navigated away");
        assert!(!cancelled.is_timeout());
    }

    #[test]
    fn test_serializes_type_tag_and_camel_case_fields() {
        let record = ErrorRecord::application("Nope", "E42", "https://api.test/x", response_info(422))
            .with_extra("traceId", "abc");
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["type"], "application");
        assert_eq!(value["code"], "E42");
        assert_eq!(value["handledByClient"], false);
        assert_eq!(value["requestUrl"], "https://api.test/x");
        assert_eq!(value["response"]["statusText"], "Internal Server Error");
        assert_eq!(value["extras"]["traceId"], "abc");
    }

    #[test]
    fn test_display() {
        let record = ErrorRecord::http("HTTP Error: 503 Service Unavailable", "u", response_info(503));
        assert_eq!(
            record.to_string(),
            "http error (503): HTTP Error: 503 Service Unavailable"
        );
    }
}
