//! The request descriptor: what to call, with which parameters and body.
//!
//! A [`Request`] is built once per logical request and never mutated by the
//! pipeline; every later stage derives new values from it.

use crate::abort::AbortSignal;
use crate::config::ConfigOverrides;
use crate::endpoint::{value_text, Params};
use crate::error::{Error, Result};
use crate::form::{FilePart, FormData};
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;
use serde::Serialize;
use serde_json::Value;

/// A request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Structured data, encoded according to the effective `Content-Type`.
    Data(Value),
    /// A multipart form, always sent as `multipart/form-data`.
    Form(FormData),
}

impl Body {
    /// Serializes `value` into a data body.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Body> {
        serde_json::to_value(value)
            .map(Body::Data)
            .map_err(|e| Error::SerializationFailed(e.to_string()))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Data(value)
    }
}

impl From<FormData> for Body {
    fn from(form: FormData) -> Self {
        Body::Form(form)
    }
}

/// Transport-level options for a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) headers: HeaderMap,
    pub(crate) signal: Option<AbortSignal>,
    pub(crate) force_content_type: bool,
    pub(crate) config: Option<ConfigOverrides>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header, merged over the configured default headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds every header of `headers`.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Cancels the request through a caller-owned controller instead of a
    /// client-tracked one. Such requests are not reached by `abort_all`.
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Keeps `Content-Type` on `GET`/`HEAD` requests.
    pub fn force_content_type(mut self, force: bool) -> Self {
        self.force_content_type = force;
        self
    }

    /// Per-request configuration overrides.
    pub fn config(mut self, overrides: ConfigOverrides) -> Self {
        self.config = Some(overrides);
        self
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }
}

/// One file or several files uploaded under the same field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadFile {
    One(FilePart),
    /// Appended once per file under `name[]`.
    Many(Vec<FilePart>),
}

impl From<FilePart> for UploadFile {
    fn from(file: FilePart) -> Self {
        UploadFile::One(file)
    }
}

impl From<Vec<FilePart>> for UploadFile {
    fn from(files: Vec<FilePart>) -> Self {
        UploadFile::Many(files)
    }
}

/// A request descriptor: `{method, endpoint, params, body, options}`.
///
/// # Examples
///
/// ```
/// use courier::Request;
/// use serde_json::json;
///
/// let request = Request::post("/users")
///     .param("notify", true)
///     .body(json!({"name": "Alice"}));
/// assert_eq!(request.method(), &http::Method::POST);
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    endpoint: String,
    params: Params,
    body: Option<Body>,
    options: RequestOptions,
}

impl Request {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: Params::new(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn put(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PUT, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// A multipart `POST` carrying `files` and `extra_fields` in one form.
    ///
    /// A `Content-Type: multipart/form-data` header is set; the transport
    /// replaces it with one carrying the real boundary. Each extra field is
    /// appended as a single text part; arrays are joined with commas.
    pub fn upload<K, F>(
        endpoint: impl Into<String>,
        files: impl IntoIterator<Item = (K, F)>,
        extra_fields: Params,
    ) -> Self
    where
        K: Into<String>,
        F: Into<UploadFile>,
    {
        let mut form = FormData::new();
        for (name, file) in files {
            let name = name.into();
            match file.into() {
                UploadFile::One(file) => form.append_file(name, file),
                UploadFile::Many(files) => {
                    for file in files {
                        form.append_file(format!("{}[]", name), file);
                    }
                }
            }
        }

        for (name, value) in extra_fields.iter() {
            form.append_text(name, value_text(value));
        }

        let mut request = Self::post(endpoint).body(form);
        request
            .options
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"));
        request
    }

    /// Adds a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Adds every parameter of `params`.
    pub fn params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `value` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        Ok(self.body(Body::json(value)?))
    }

    /// Adds a request header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        self.options = self.options.header(name, value)?;
        Ok(self)
    }

    /// Replaces the transport options. Headers already set on the request
    /// are kept unless `options` sets the same header.
    pub fn options(mut self, options: RequestOptions) -> Self {
        let RequestOptions {
            headers,
            signal,
            force_content_type,
            config,
        } = options;
        self.options.headers.extend(headers);
        self.options.signal = signal;
        self.options.force_content_type = force_content_type;
        self.options.config = config;
        self
    }

    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.options.signal = Some(signal);
        self
    }

    pub fn config(mut self, overrides: ConfigOverrides) -> Self {
        self.options.config = Some(overrides);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn get_params(&self) -> &Params {
        &self.params
    }

    pub fn get_body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn get_options(&self) -> &RequestOptions {
        &self.options
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
    Ok((name, value))
}
