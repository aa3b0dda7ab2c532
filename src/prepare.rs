//! Turns a request descriptor and its effective configuration into the
//! transport-level request: final headers, encoded body, and cancellation.

use crate::abort::{AbortController, AbortReason, AbortSignal};
use crate::config::Config;
use crate::endpoint::value_text;
use crate::error::Result;
use crate::form::FormData;
use crate::record::header_entries;
use crate::request::{parse_header, Body, RequestOptions};
use http::header::{HeaderMap, CONTENT_TYPE};
use http::Method;
use serde_json::Value;
use url::form_urlencoded;

/// An encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedBody {
    Empty,
    /// JSON or URL-encoded text.
    Text(String),
    /// Converted to a multipart form with a fresh boundary on every attempt.
    Multipart(FormData),
}

/// The request handed to the transport, as request interceptors see it.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: PreparedBody,
    /// Cancels the in-flight call.
    pub signal: AbortSignal,
}

/// A prepared request plus the controller created for it, if any.
pub(crate) struct Prepared {
    pub(crate) request: PreparedRequest,
    /// `None` when the caller supplied its own signal.
    pub(crate) controller: Option<AbortController>,
}

/// Builds the transport request.
///
/// Headers are the configured defaults overlaid with the request's own.
/// `Content-Type` is dropped on `GET`/`HEAD` unless forced, and a configured
/// token is written last. Without a caller-supplied signal a controller is
/// created, and a positive timeout aborts it with [`AbortReason::Timeout`].
///
/// Must be called from within a Tokio runtime when a timeout is configured.
pub(crate) fn prepare(
    method: &Method,
    url: String,
    options: &RequestOptions,
    body: Option<&Body>,
    config: &Config,
) -> Result<Prepared> {
    let mut headers = config.headers.clone();
    headers.extend(options.headers.clone());

    let bodiless = *method == Method::GET || *method == Method::HEAD;
    if bodiless && !options.force_content_type {
        headers.remove(CONTENT_TYPE);
    }

    if let Some(token) = config.token.as_ref().filter(|t| !t.value.is_empty()) {
        let (name, value) = parse_header(&token.key, &token.header_value())?;
        headers.insert(name, value);
    }

    let body = match body {
        Some(body) if !bodiless => encode_body(body, &mut headers),
        _ => PreparedBody::Empty,
    };

    let (signal, controller) = match &options.signal {
        Some(signal) => (signal.clone(), None),
        None => {
            let controller = AbortController::new();
            if !config.timeout.is_zero() {
                schedule_timeout(&controller, config);
            }
            (controller.signal(), Some(controller))
        }
    };

    let request = PreparedRequest {
        method: method.clone(),
        url,
        headers,
        body,
        signal,
    };

    if config.debug {
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            headers = ?header_entries(&request.headers),
            body = ?request.body,
            "Prepared request"
        );
    }

    Ok(Prepared {
        request,
        controller,
    })
}

fn encode_body(body: &Body, headers: &mut HeaderMap) -> PreparedBody {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match body {
        Body::Form(form) => {
            headers.remove(CONTENT_TYPE);
            PreparedBody::Multipart(form.clone())
        }
        Body::Data(Value::Null) => PreparedBody::Empty,
        Body::Data(data) if content_type.contains("multipart/form-data") => {
            headers.remove(CONTENT_TYPE);
            PreparedBody::Multipart(FormData::from_value(data))
        }
        Body::Data(data) if content_type.contains("application/x-www-form-urlencoded") => {
            PreparedBody::Text(url_encoded(data))
        }
        Body::Data(data) => PreparedBody::Text(data.to_string()),
    }
}

fn url_encoded(data: &Value) -> String {
    match data {
        Value::Object(entries) => {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in entries {
                serializer.append_pair(key, &value_text(value));
            }
            serializer.finish()
        }
        other => value_text(other),
    }
}

/// Aborts `controller` once the timeout elapses. The task exits early when
/// the request settles, so `on_timeout` never fires for a finished request.
fn schedule_timeout(controller: &AbortController, config: &Config) {
    let controller = controller.clone();
    let signal = controller.signal();
    let timeout = config.timeout;
    let on_timeout = config.callbacks.on_timeout.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = signal.settled() => {}
            _ = tokio::time::sleep(timeout) => {
                if controller.abort(AbortReason::Timeout) {
                    tracing::warn!(timeout_ms = timeout.as_millis(), "Request timed out");
                    if let Some(on_timeout) = on_timeout {
                        on_timeout();
                    }
                }
            }
        }
    });
}
