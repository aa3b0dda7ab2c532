//! Turns a raw response into either a success payload or an error record.
//!
//! Processing runs in a fixed order:
//!
//! 1. Read the body and decode it according to the configured response type.
//!    A body that fails to arrive decodes like one that fails to parse.
//! 2. A non-2xx JSON object or array body, with application-error keys configured,
//!    becomes an `application` record.
//! 3. Any other non-2xx response becomes an `http` record.
//! 4. A 2xx payload is unwrapped by `data_key` and run through the response
//!    interceptors.
//!
//! Records are returned undispatched; the client dispatches once per logical
//! request, after retrying ends.

use crate::abort::{AbortReason, AbortSignal};
use crate::config::{Config, JsonErrorResponse, ResponseType};
use crate::endpoint::value_text;
use crate::interceptor::{InterceptorChain, ResponseContext};
use crate::rate_limit::RateLimitInfo;
use crate::record::{header_entries, ErrorRecord, ResponseInfo};
use crate::response::{ResponseData, ResponseMeta};
use crate::retry::AttemptError;
use crate::transport::RawResponse;
use serde_json::{json, Value};

const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";
const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// A decoded body and whether it parsed as JSON.
struct Decoded {
    data: ResponseData,
    is_json: bool,
}

pub(crate) async fn process(
    raw: RawResponse,
    request_url: &str,
    config: &Config,
    interceptors: &InterceptorChain<ResponseContext>,
    signal: &AbortSignal,
) -> Result<(ResponseMeta, ResponseData), AttemptError> {
    let RawResponse { meta, body } = raw;
    let body = read_body(body, signal).await.map_err(ErrorRecord::abort)?;

    if config.debug {
        tracing::debug!(
            status = meta.status.as_u16(),
            url = %meta.url,
            headers = ?header_entries(&meta.headers),
            body_bytes = ?body.as_ref().map(Vec::len),
            "Raw response"
        );
    }

    let Decoded { data, is_json } = decode(body.as_deref(), config.response_type);

    if !meta.status.is_success() {
        let record = match (&data, &config.json_error_response) {
            (ResponseData::Json(body @ (Value::Object(_) | Value::Array(_))), Some(keys))
                if is_json =>
            {
                application_record(body, keys, request_url, &meta)
            }
            _ => http_record(&data, request_url, &meta),
        };
        return Err(record.into());
    }

    if let (ResponseData::Json(body @ Value::Object(fields)), Some(keys)) =
        (&data, &config.json_error_response)
    {
        if keys.on_success && truthy_text(fields.get(&keys.code_key)).is_some() {
            return Err(application_record(body, keys, request_url, &meta).into());
        }
    }

    let data = unwrap_data_key(data, config.data_key.as_deref());

    let context = ResponseContext {
        data,
        response: meta,
        config: config.clone(),
    };
    let context = interceptors
        .apply(context)
        .await
        .map_err(AttemptError::Interceptor)?;

    Ok((context.response, context.data))
}

/// Reads the whole body, racing the read against `signal`.
///
/// A failed read yields `Ok(None)`; only an abort is an error.
async fn read_body(
    response: reqwest::Response,
    signal: &AbortSignal,
) -> Result<Option<Vec<u8>>, AbortReason> {
    tokio::select! {
        biased;
        reason = signal.aborted() => Err(reason),
        result = response.bytes() => Ok(match result {
            Ok(bytes) => Some(bytes.to_vec()),
            Err(error) => {
                tracing::warn!(error = %error, "Failed to read response body");
                None
            }
        }),
    }
}

/// Decodes a body; `None` is a body that could not be read.
fn decode(body: Option<&[u8]>, response_type: ResponseType) -> Decoded {
    let bytes = body.unwrap_or_default();
    match response_type {
        ResponseType::Json => match body.map(|bytes| serde_json::from_slice::<Value>(bytes)) {
            Some(Ok(value)) => Decoded {
                data: ResponseData::Json(value),
                is_json: true,
            },
            _ => Decoded {
                data: ResponseData::Json(Value::Null),
                is_json: false,
            },
        },
        ResponseType::Text => Decoded {
            data: ResponseData::Text(String::from_utf8_lossy(bytes).into_owned()),
            is_json: false,
        },
        ResponseType::Blob | ResponseType::ArrayBuffer => Decoded {
            data: ResponseData::Bytes(bytes.to_vec()),
            is_json: false,
        },
    }
}

fn application_record(
    body: &Value,
    keys: &JsonErrorResponse,
    request_url: &str,
    meta: &ResponseMeta,
) -> ErrorRecord {
    let message = truthy_text(body.get(&keys.message_key))
        .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string());
    let code =
        truthy_text(body.get(&keys.code_key)).unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string());

    ErrorRecord::application(message, code, request_url, response_info(meta, body.clone()))
}

fn http_record(data: &ResponseData, request_url: &str, meta: &ResponseMeta) -> ErrorRecord {
    let mut body = data.to_value();
    if is_blank(&body) {
        body = json!({
            "status": meta.status.as_u16(),
            "statusText": meta.status_text,
        });
    }

    let message = truthy_text(body.get("message"))
        .or_else(|| truthy_text(body.get("error")))
        .unwrap_or_else(|| {
            format!("HTTP Error: {} {}", meta.status.as_u16(), meta.status_text)
        });

    ErrorRecord::http(message, request_url, response_info(meta, body))
}

fn response_info(meta: &ResponseMeta, data: Value) -> ResponseInfo {
    let rate_limit = RateLimitInfo::from_headers(&meta.headers);
    ResponseInfo {
        status: meta.status.as_u16(),
        status_text: meta.status_text.clone(),
        headers: header_entries(&meta.headers),
        data,
        rate_limit: (!rate_limit.is_empty()).then_some(rate_limit),
    }
}

fn unwrap_data_key(data: ResponseData, data_key: Option<&str>) -> ResponseData {
    let Some(key) = data_key else {
        return data;
    };

    match data {
        ResponseData::Json(Value::Object(mut fields)) => match fields.remove(key) {
            Some(inner) => ResponseData::Json(inner),
            None => {
                tracing::warn!(data_key = key, "Data key not found in response");
                ResponseData::Json(Value::Object(fields))
            }
        },
        ResponseData::Json(Value::Null) => ResponseData::Json(Value::Null),
        ResponseData::Json(other) => {
            tracing::warn!(data_key = key, "Data key not found in response");
            ResponseData::Json(other)
        }
        other => other,
    }
}

/// Renders a value the way a loose truthiness check would accept it:
/// missing, `null`, `false`, `0`, and `""` yield `None`.
fn truthy_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(value_text(other)),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
