//! HTTP client with interceptors, retries, cancellation, and error dispatch.
//!
//! The [`Client`] type is the main entry point for making HTTP requests.
//! Use [`ClientBuilder`] to configure and create clients.

use crate::abort::{AbortRegistry, DEFAULT_ABORT_REASON};
use crate::config::{Callbacks, Config, JsonErrorResponse, ResponseType, Token};
use crate::dispatch::dispatch;
use crate::endpoint::{build_url, Params};
use crate::interceptor::{Interceptors, RequestContext};
use crate::prepare::{prepare, Prepared, PreparedRequest};
use crate::processor;
use crate::record::{header_entries, ErrorRecord, NetworkInfo};
use crate::request::{parse_header, Body, Request, RequestOptions, UploadFile};
use crate::response::{Outcome, Response};
use crate::retry::{execute_with_retry, AttemptError, RetryPolicy};
use crate::transport::{self, TransportFailure};
use crate::{Error, Result};
use futures::future::try_join_all;
use http::HeaderMap;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// An HTTP client running every request through the same pipeline.
///
/// The client is designed to be reused across multiple requests. Cloning it
/// is cheap and every clone shares configuration, interceptors, connection
/// pool, and the registry of outstanding requests.
///
/// # Examples
///
/// ```no_run
/// use courier::{Callbacks, Client, Params};
/// use serde::Deserialize;
/// use serde_json::json;
/// use std::time::Duration;
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
///     .timeout(Duration::from_secs(30))
///     .retries(2, Duration::from_millis(500))
///     .callbacks(Callbacks::new().on_unauthorized(|e| eprintln!("login again: {}", e.message)))
///     .build()?;
///
/// // GET request
/// let user: User = client.get("/users/123").await?.into_result()?.json()?;
/// println!("User: {}", user.name);
///
/// // POST request with query parameters
/// let created = client
///     .post_with(
///         "/users",
///         json!({"name": "Alice"}),
///         Params::new().with("notify", true),
///         Default::default(),
///     )
///     .await?
///     .into_result()?;
/// println!("Created in {:?}", created.latency);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    config: Config,
    interceptors: Interceptors,
    registry: AbortRegistry,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The base configuration of this client.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The request and response interceptor chains.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use courier::{Client, RequestPatch};
    ///
    /// # fn example(client: &Client) {
    /// let id = client.interceptors().request.register(|mut ctx: courier::RequestContext| async move {
    ///     ctx.request.headers.insert("x-request-source", "web".parse().unwrap());
    ///     Ok(RequestPatch::request(ctx.request))
    /// });
    ///
    /// client.interceptors().request.eject(id);
    /// # }
    /// ```
    pub fn interceptors(&self) -> &Interceptors {
        &self.inner.interceptors
    }

    /// Executes a request descriptor.
    ///
    /// This is the method every verb helper goes through. It merges the
    /// request's configuration overrides, runs the lifecycle hooks, prepares
    /// and intercepts the request, and retries failed attempts according to
    /// the effective retry policy.
    ///
    /// # Errors
    ///
    /// A failed request is dispatched to the error callbacks exactly once.
    /// It is then returned as [`Error::Request`], or as
    /// [`Outcome::Failure`] when the client suppresses errors.
    /// Interceptor failures and invalid headers are always returned as errors.
    pub async fn send(&self, request: Request) -> Result<Outcome> {
        let config = match &request.get_options().config {
            Some(overrides) => self.inner.config.merged(overrides),
            None => self.inner.config.clone(),
        };
        let callbacks = config.callbacks.clone();

        if let Some(on_before) = &callbacks.on_before {
            on_before(&request);
        }
        if let Some(on_loading) = &callbacks.on_loading {
            on_loading(true);
        }

        let result = self.execute(&request, config).await;

        if let Some(on_finally) = &callbacks.on_finally {
            on_finally();
        }
        if let Some(on_loading) = &callbacks.on_loading {
            on_loading(false);
        }

        result
    }

    async fn execute(&self, request: &Request, config: Config) -> Result<Outcome> {
        let start = Instant::now();

        let url = build_url(request.endpoint(), request.get_params(), &config);
        let Prepared {
            request: prepared,
            controller,
        } = prepare(
            request.method(),
            url,
            request.get_options(),
            request.get_body(),
            &config,
        )?;
        let _registration = controller.map(|c| self.inner.registry.register(c));

        let RequestContext {
            config,
            request: prepared,
        } = self
            .inner
            .interceptors
            .request
            .apply(RequestContext {
                config,
                request: prepared,
            })
            .await?;

        let signal = prepared.signal.clone();
        let http_client = &self.inner.http_client;
        let response_chain = &self.inner.interceptors.response;
        let params = request.get_params();
        let prepared = &prepared;
        let effective = &config;

        let (result, attempts) = execute_with_retry(
            move |attempt| async move {
                tracing::debug!(
                    method = %prepared.method,
                    url = %prepared.url,
                    attempt = attempt,
                    "Executing HTTP request"
                );

                let raw = transport::invoke(http_client, prepared)
                    .await
                    .map_err(|failure| classify(failure, prepared, params))?;
                processor::process(raw, &prepared.url, effective, response_chain, &prepared.signal)
                    .await
            },
            &config.retry,
            &signal,
        )
        .await;

        match result {
            Ok((meta, data)) => {
                let response = Response::new(data, meta, start.elapsed(), attempts);
                if let Some(on_after) = &config.callbacks.on_after {
                    on_after(&response);
                }
                Ok(Outcome::Success(response))
            }
            Err(AttemptError::Interceptor(error)) => Err(Error::Interceptor(error)),
            Err(AttemptError::Record(record)) => {
                tracing::warn!(
                    error = %record,
                    attempts = attempts,
                    latency_ms = start.elapsed().as_millis(),
                    "Request failed"
                );

                let record = dispatch(*record, &config);
                if config.suppress_errors {
                    Ok(Outcome::Failure(record))
                } else {
                    Err(Error::from(record))
                }
            }
        }
    }

    /// Makes a GET request to the specified endpoint.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use courier::Client;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct User { name: String }
    ///
    /// # async fn example() -> Result<(), courier::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    ///
    /// let user: User = client.get("/users/123").await?.into_result()?.json()?;
    /// println!("User: {}", user.name);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get(&self, endpoint: impl Into<String>) -> Result<Outcome> {
        self.send(Request::get(endpoint)).await
    }

    /// Makes a GET request with query parameters and options.
    pub async fn get_with(
        &self,
        endpoint: impl Into<String>,
        params: Params,
        options: RequestOptions,
    ) -> Result<Outcome> {
        self.send(Request::get(endpoint).params(params).options(options))
            .await
    }

    /// Makes a DELETE request to the specified endpoint.
    pub async fn delete(&self, endpoint: impl Into<String>) -> Result<Outcome> {
        self.send(Request::delete(endpoint)).await
    }

    /// Makes a DELETE request with query parameters and options.
    pub async fn delete_with(
        &self,
        endpoint: impl Into<String>,
        params: Params,
        options: RequestOptions,
    ) -> Result<Outcome> {
        self.send(Request::delete(endpoint).params(params).options(options))
            .await
    }

    /// Makes a POST request with a body.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use courier::{Body, Client};
    /// use serde::Serialize;
    ///
    /// #[derive(Serialize)]
    /// struct CreateUser { name: String }
    ///
    /// # async fn example() -> Result<(), courier::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.example.com")?
    ///     .build()?;
    ///
    /// let body = Body::json(&CreateUser { name: "Alice".to_string() })?;
    /// let outcome = client.post("/users", body).await?;
    /// assert!(outcome.is_success());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn post(&self, endpoint: impl Into<String>, body: impl Into<Body>) -> Result<Outcome> {
        self.send(Request::post(endpoint).body(body)).await
    }

    /// Makes a POST request with a body, query parameters, and options.
    pub async fn post_with(
        &self,
        endpoint: impl Into<String>,
        body: impl Into<Body>,
        params: Params,
        options: RequestOptions,
    ) -> Result<Outcome> {
        self.send(Request::post(endpoint).body(body).params(params).options(options))
            .await
    }

    /// Makes a PUT request with a body.
    pub async fn put(&self, endpoint: impl Into<String>, body: impl Into<Body>) -> Result<Outcome> {
        self.send(Request::put(endpoint).body(body)).await
    }

    /// Makes a PUT request with a body, query parameters, and options.
    pub async fn put_with(
        &self,
        endpoint: impl Into<String>,
        body: impl Into<Body>,
        params: Params,
        options: RequestOptions,
    ) -> Result<Outcome> {
        self.send(Request::put(endpoint).body(body).params(params).options(options))
            .await
    }

    /// Makes a PATCH request with a body.
    pub async fn patch(
        &self,
        endpoint: impl Into<String>,
        body: impl Into<Body>,
    ) -> Result<Outcome> {
        self.send(Request::patch(endpoint).body(body)).await
    }

    /// Makes a PATCH request with a body, query parameters, and options.
    pub async fn patch_with(
        &self,
        endpoint: impl Into<String>,
        body: impl Into<Body>,
        params: Params,
        options: RequestOptions,
    ) -> Result<Outcome> {
        self.send(Request::patch(endpoint).body(body).params(params).options(options))
            .await
    }

    /// Uploads files and extra fields as one multipart `POST`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use courier::{Client, FilePart, Params};
    ///
    /// # async fn example(client: Client) -> Result<(), courier::Error> {
    /// let avatar = FilePart::new("me.png", std::fs::read("me.png").unwrap()).mime("image/png");
    /// client
    ///     .upload(
    ///         "/profile/avatar",
    ///         [("avatar", avatar)],
    ///         Params::new().with("name", "x"),
    ///         Params::new(),
    ///         Default::default(),
    ///     )
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn upload<K, F>(
        &self,
        endpoint: impl Into<String>,
        files: impl IntoIterator<Item = (K, F)>,
        extra_fields: Params,
        params: Params,
        options: RequestOptions,
    ) -> Result<Outcome>
    where
        K: Into<String>,
        F: Into<UploadFile>,
    {
        self.send(
            Request::upload(endpoint, files, extra_fields)
                .params(params)
                .options(options),
        )
        .await
    }

    /// Runs keyed requests concurrently and collects their results by key.
    ///
    /// Fails fast: the first error is returned and the remaining futures are
    /// dropped.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use courier::Client;
    ///
    /// # async fn example(client: Client) -> Result<(), courier::Error> {
    /// let results = client
    ///     .all([("user", client.get("/user")), ("settings", client.get("/settings"))])
    ///     .await?;
    /// assert!(results["user"].is_success());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn all<K, F, T, E>(
        &self,
        requests: impl IntoIterator<Item = (K, F)>,
    ) -> std::result::Result<BTreeMap<String, T>, E>
    where
        K: Into<String>,
        F: Future<Output = std::result::Result<T, E>>,
    {
        let (keys, futures): (Vec<String>, Vec<F>) = requests
            .into_iter()
            .map(|(key, future)| (key.into(), future))
            .unzip();

        let values = try_join_all(futures).await?;
        Ok(keys.into_iter().zip(values).collect())
    }

    /// Like [`Client::all`], keying the results `result1` to `resultN` in
    /// input order.
    pub async fn all_indexed<F, T, E>(
        &self,
        requests: impl IntoIterator<Item = F>,
    ) -> std::result::Result<BTreeMap<String, T>, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
    {
        self.all(
            requests
                .into_iter()
                .enumerate()
                .map(|(index, future)| (format!("result{}", index + 1), future)),
        )
        .await
    }

    /// Aborts every outstanding request this client created a controller for.
    ///
    /// Requests made with a caller-supplied signal are not affected. Returns
    /// the number of requests that were tracked.
    pub fn abort_all(&self, reason: Option<&str>) -> usize {
        let reason = reason.unwrap_or(DEFAULT_ABORT_REASON);
        let count = self.inner.registry.abort_all(reason);
        tracing::info!(count = count, reason = reason, "Aborted outstanding requests");
        count
    }

    /// The number of outstanding requests `abort_all` would reach.
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.len()
    }
}

/// Turns a failed transport call into a record.
fn classify(failure: TransportFailure, request: &PreparedRequest, params: &Params) -> AttemptError {
    let record = match failure {
        TransportFailure::Aborted(reason) => ErrorRecord::abort(reason),
        TransportFailure::Network(source) => ErrorRecord::network(
            source,
            NetworkInfo {
                url: request.url.clone(),
                method: request.method.to_string(),
                params: params.clone(),
                headers: header_entries(&request.headers),
            },
        ),
    };
    record.into()
}

/// Builder for configuring and creating a [`Client`].
///
/// Starts from [`Config::default`].
///
/// # Examples
///
/// ```no_run
/// use courier::{ClientBuilder, Token};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), courier::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .token(Token::bearer("secret"))
///     .data_key("data")
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: Config,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Sets the base URL relative endpoints are joined to.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        let url = Url::parse(url.as_ref())?;
        self.config.base_url = url.as_str().trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.config.headers.insert(name, value);
        Ok(self)
    }

    /// Replaces the default headers, including the default `Content-Type`.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.config.headers = headers;
        self
    }

    /// Sets the per-request timeout. `Duration::ZERO` disables it.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.config.response_type = response_type;
        self
    }

    pub fn token(mut self, token: Token) -> Self {
        self.config.token = Some(token);
        self
    }

    /// Unwraps `data_key` from successful JSON payloads.
    pub fn data_key(mut self, data_key: impl Into<String>) -> Self {
        self.config.data_key = Some(data_key.into());
        self
    }

    /// Sets the keys used to detect application errors; `None` disables detection.
    pub fn json_error_response(mut self, keys: Option<JsonErrorResponse>) -> Self {
        self.config.json_error_response = keys;
        self
    }

    /// Sets the retry policy for failed requests.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Retries server errors `count` times, `delay` apart.
    pub fn retries(self, count: usize, delay: Duration) -> Self {
        self.retry(RetryPolicy::new(count, delay))
    }

    /// Resolve failures as [`Outcome::Failure`] instead of returning `Err`.
    pub fn suppress_errors(mut self, suppress: bool) -> Self {
        self.config.suppress_errors = suppress;
        self
    }

    /// Logs prepared requests, raw responses, and error records at debug level.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Transforms every error record after its specific callback ran.
    pub fn error_interceptor(
        mut self,
        transform: impl Fn(ErrorRecord) -> ErrorRecord + Send + Sync + 'static,
    ) -> Self {
        self.config.error_interceptor = Some(Arc::new(transform));
        self
    }

    /// Replaces the default query string serializer.
    pub fn params_serializer(
        mut self,
        serializer: impl Fn(&Params) -> String + Send + Sync + 'static,
    ) -> Self {
        self.config.params_serializer = Some(Arc::new(serializer));
        self
    }

    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.config.callbacks = callbacks;
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be created.
    pub fn build(self) -> Result<Client> {
        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                config: self.config,
                interceptors: Interceptors::default(),
                registry: AbortRegistry::default(),
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_validated_and_normalized() {
        assert!(matches!(
            ClientBuilder::new().base_url("not a url"),
            Err(Error::InvalidUrl(_))
        ));

        let client = ClientBuilder::new()
            .base_url("https://api.test/v1/")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(client.config().base_url, "https://api.test/v1");
    }

    #[test]
    fn test_invalid_default_header() {
        let result = ClientBuilder::new().default_header("bad header", "x");
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_all_preserves_keys_and_fails_fast() {
        let client = Client::builder().build().unwrap();

        let ok = client
            .all([
                ("a", futures::future::ready(Ok::<_, &str>(1))),
                ("b", futures::future::ready(Ok(2))),
            ])
            .await
            .unwrap();
        assert_eq!(ok.get("a"), Some(&1));
        assert_eq!(ok.get("b"), Some(&2));

        let err = client
            .all([
                ("a", futures::future::ready(Ok(1))),
                ("b", futures::future::ready(Err("b failed"))),
            ])
            .await
            .unwrap_err();
        assert_eq!(err, "b failed");

        let indexed = client
            .all_indexed(vec![
                futures::future::ready(Ok::<_, ()>("x")),
                futures::future::ready(Ok("y")),
            ])
            .await
            .unwrap();
        assert_eq!(indexed["result1"], "x");
        assert_eq!(indexed["result2"], "y");
    }

    #[tokio::test]
    async fn test_abort_all_with_nothing_pending() {
        let client = Client::builder().build().unwrap();
        assert_eq!(client.abort_all(None), 0);
        assert_eq!(client.pending_requests(), 0);
    }
}
