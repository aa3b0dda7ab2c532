//! Successful responses and the outcome of a logical request.
//!
//! The [`Response`] type carries the decoded (and possibly unwrapped and
//! intercepted) payload along with metadata about the HTTP exchange, such as
//! the status, headers, latency, and the number of attempts it took.

use crate::error::{Error, Result};
use crate::record::ErrorRecord;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::time::Duration;

/// A decoded response payload.
///
/// Which variant is produced depends on the configured
/// [`ResponseType`](crate::ResponseType).
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// A JSON document; `Null` when the body was empty or failed to parse.
    Json(Value),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl ResponseData {
    /// Returns the JSON document, if this is JSON data.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Renders the payload as text.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            ResponseData::Json(Value::Null) => Cow::Borrowed(""),
            ResponseData::Json(value) => Cow::Owned(value.to_string()),
            ResponseData::Text(text) => Cow::Borrowed(text),
            ResponseData::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Converts the payload into a JSON value for error records.
    ///
    /// Text is kept as a JSON string; bytes are kept as lossy text.
    pub(crate) fn to_value(&self) -> Value {
        match self {
            ResponseData::Json(value) => value.clone(),
            ResponseData::Text(text) => Value::String(text.clone()),
            ResponseData::Bytes(bytes) => {
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

/// Status line and headers of a received response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub status: StatusCode,
    /// Canonical reason phrase for `status`, empty if unknown.
    pub status_text: String,
    pub headers: HeaderMap,
    /// The URL the response came from.
    pub url: String,
}

/// A successful response.
///
/// # Examples
///
/// ```no_run
/// use courier::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), courier::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client.get("/users/123").await?.into_result()?;
/// let user: User = response.json()?;
///
/// println!("User: {}", user.name);
/// println!("Request took {:?}", response.latency);
/// println!("Retry attempts: {}", response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    /// The payload after `data_key` unwrapping and response interceptors.
    pub data: ResponseData,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The URL the response came from.
    pub url: String,

    /// The total latency of the logical request, including all retry attempts.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    ///
    /// This will be `1` for requests that succeeded on the first try,
    /// and higher for requests that required retries.
    pub attempts: usize,
}

impl Response {
    pub(crate) fn new(
        data: ResponseData,
        meta: ResponseMeta,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            status: meta.status,
            headers: meta.headers,
            url: meta.url,
            latency,
            attempts,
        }
    }

    /// Deserializes the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the payload text if it
    /// does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let parsed = match &self.data {
            ResponseData::Json(value) => T::deserialize(value),
            ResponseData::Text(text) => serde_json::from_str(text),
            ResponseData::Bytes(bytes) => serde_json::from_slice(bytes),
        };

        parsed.map_err(|e| Error::DeserializationFailed {
            raw_response: self.data.to_text().into_owned(),
            serde_error: e.to_string(),
            status: self.status,
        })
    }

    /// Returns the payload rendered as text.
    pub fn text(&self) -> Cow<'_, str> {
        self.data.to_text()
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a reference to a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// The resolved result of a logical request.
///
/// Failures only appear here when the client was built with
/// `suppress_errors`; otherwise they are returned as
/// [`Error::Request`].
#[derive(Debug, Clone)]
pub enum Outcome {
    Success(Response),
    Failure(ErrorRecord),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            Outcome::Success(response) => Some(response),
            Outcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorRecord> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(record) => Some(record),
        }
    }

    /// Converts a suppressed failure back into an `Err`.
    pub fn into_result(self) -> Result<Response> {
        match self {
            Outcome::Success(response) => Ok(response),
            Outcome::Failure(record) => Err(Error::from(record)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn response(data: ResponseData) -> Response {
        let meta = ResponseMeta {
            status: StatusCode::OK,
            status_text: "OK".into(),
            headers: HeaderMap::new(),
            url: "https://api.test/users/1".into(),
        };
        Response::new(data, meta, Duration::from_millis(12), 1)
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
    }

    #[test]
    fn test_json_from_every_variant() {
        let expected = User { id: 1 };
        assert_eq!(response(ResponseData::Json(json!({"id": 1}))).json::<User>().unwrap(), expected);
        assert_eq!(response(ResponseData::Text(r#"{"id":1}"#.into())).json::<User>().unwrap(), expected);
        assert_eq!(response(ResponseData::Bytes(br#"{"id":1}"#.to_vec())).json::<User>().unwrap(), expected);
    }

    #[test]
    fn test_json_mismatch_keeps_raw_payload() {
        let err = response(ResponseData::Text("not json".into()))
            .json::<User>()
            .unwrap_err();
        match err {
            Error::DeserializationFailed { raw_response, status, .. } => {
                assert_eq!(raw_response, "not json");
                assert_eq!(status, StatusCode::OK);
            }
            other => panic!("Expected DeserializationFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_outcome_into_result() {
        let outcome = Outcome::Success(response(ResponseData::Json(Value::Null)));
        assert!(outcome.is_success());
        assert!(!outcome.into_result().unwrap().was_retried());

        let record = ErrorRecord::abort(crate::abort::AbortReason::Timeout);
        let outcome = Outcome::Failure(record);
        assert!(outcome.error().is_some());
        assert!(outcome.into_result().unwrap_err().is_timeout());
    }
}
