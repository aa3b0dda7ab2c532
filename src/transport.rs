//! Performs exactly one network call per attempt.
//!
//! Anything that goes wrong before the status line and headers arrive is a
//! [`TransportFailure`]. Any response at all, whatever its status, is a
//! transport success; the body is read and the status evaluated in the
//! processor.

use crate::abort::AbortReason;
use crate::prepare::{PreparedBody, PreparedRequest};
use crate::response::ResponseMeta;
use std::time::Instant;

/// A response whose headers arrived; the body has not been read yet.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub(crate) meta: ResponseMeta,
    pub(crate) body: reqwest::Response,
}

/// Why no response was obtained.
#[derive(Debug)]
pub(crate) enum TransportFailure {
    /// The platform reported a failure (connect, DNS, TLS, invalid headers).
    Network(reqwest::Error),
    /// The request's signal fired first.
    Aborted(AbortReason),
}

/// Sends `request`, racing the call against its abort signal.
///
/// A signal that is already aborted fails the call before anything is sent.
pub(crate) async fn invoke(
    http_client: &reqwest::Client,
    request: &PreparedRequest,
) -> Result<RawResponse, TransportFailure> {
    if let Some(reason) = request.signal.reason() {
        return Err(TransportFailure::Aborted(reason));
    }

    tokio::select! {
        biased;
        reason = request.signal.aborted() => Err(TransportFailure::Aborted(reason)),
        result = send(http_client, request) => result.map_err(TransportFailure::Network),
    }
}

async fn send(
    http_client: &reqwest::Client,
    request: &PreparedRequest,
) -> reqwest::Result<RawResponse> {
    let start = Instant::now();

    let mut builder = http_client
        .request(request.method.clone(), request.url.as_str())
        .headers(request.headers.clone());

    builder = match &request.body {
        PreparedBody::Empty => builder,
        PreparedBody::Text(text) => builder.body(text.clone()),
        PreparedBody::Multipart(form) => builder.multipart(form.to_multipart()?),
    };

    let response = builder.send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let url = response.url().to_string();

    tracing::info!(
        status = status.as_u16(),
        latency_ms = start.elapsed().as_millis(),
        content_length = ?response.content_length(),
        "Received HTTP response"
    );

    Ok(RawResponse {
        meta: ResponseMeta {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            url,
        },
        body: response,
    })
}
