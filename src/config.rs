//! Client configuration, per-request overrides, and callbacks.

use crate::endpoint::Params;
use crate::record::ErrorRecord;
use crate::request::Request;
use crate::response::Response;
use crate::retry::{RetryCondition, RetryPolicy};
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Called with a dispatched error record.
pub type ErrorCallback = Arc<dyn Fn(&ErrorRecord) + Send + Sync>;
/// Replaces an error record before it reaches the caller.
pub type ErrorTransform = Arc<dyn Fn(ErrorRecord) -> ErrorRecord + Send + Sync>;
/// Renders query parameters into a query string (without the leading `?`).
pub type ParamsSerializer = Arc<dyn Fn(&Params) -> String + Send + Sync>;
/// Called once before a logical request starts.
pub type BeforeHook = Arc<dyn Fn(&Request) + Send + Sync>;
/// Called with the successful response.
pub type AfterHook = Arc<dyn Fn(&Response) + Send + Sync>;
/// Called with `true` when a logical request starts and `false` when it ends.
pub type LoadingHook = Arc<dyn Fn(bool) + Send + Sync>;
/// A callback without arguments.
pub type Hook = Arc<dyn Fn() + Send + Sync>;

/// How a response body is decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    /// Parsed as JSON; a body that fails to parse decodes to `null`.
    #[default]
    Json,
    /// Decoded as UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// Raw bytes.
    ArrayBuffer,
}

/// An authentication token injected into every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Header name, `Authorization` by default.
    pub key: String,
    pub value: String,
    /// Prefix placed before the value, `Bearer` by default.
    pub scheme: String,
}

impl Token {
    /// A bearer token sent as `Authorization: Bearer {value}`.
    pub fn bearer(value: impl Into<String>) -> Self {
        Self {
            key: "Authorization".to_string(),
            value: value.into(),
            scheme: "Bearer".to_string(),
        }
    }

    /// Sets the header name.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Sets the value prefix.
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub(crate) fn header_value(&self) -> String {
        if self.scheme.is_empty() {
            self.value.clone()
        } else {
            format!("{} {}", self.scheme, self.value)
        }
    }
}

/// Keys used to read an application error out of a JSON response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonErrorResponse {
    pub message_key: String,
    pub code_key: String,
    /// Also treat a 2xx JSON object carrying `code_key` as an application error.
    pub on_success: bool,
}

impl Default for JsonErrorResponse {
    fn default() -> Self {
        Self {
            message_key: "message".to_string(),
            code_key: "code".to_string(),
            on_success: false,
        }
    }
}

/// Lifecycle and error callbacks. Unset callbacks are `None`.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub(crate) on_before: Option<BeforeHook>,
    pub(crate) on_after: Option<AfterHook>,
    pub(crate) on_finally: Option<Hook>,
    pub(crate) on_loading: Option<LoadingHook>,
    pub(crate) on_abort: Option<ErrorCallback>,
    pub(crate) on_timeout: Option<Hook>,
    pub(crate) on_error: Option<ErrorCallback>,
    pub(crate) on_network_error: Option<ErrorCallback>,
    pub(crate) on_server_error: Option<ErrorCallback>,
    pub(crate) on_client_error: Option<ErrorCallback>,
    pub(crate) on_unauthorized: Option<ErrorCallback>,
    pub(crate) on_rate_limit: Option<ErrorCallback>,
    pub(crate) on_not_found: Option<ErrorCallback>,
    pub(crate) on_application_error: Option<ErrorCallback>,
}

macro_rules! error_callback_setters {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(mut self, callback: impl Fn(&ErrorRecord) + Send + Sync + 'static) -> Self {
                self.$name = Some(Arc::new(callback));
                self
            }
        )*
    };
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the request descriptor before anything else happens.
    pub fn on_before(mut self, hook: impl Fn(&Request) + Send + Sync + 'static) -> Self {
        self.on_before = Some(Arc::new(hook));
        self
    }

    /// Called with the response of a successful request.
    pub fn on_after(mut self, hook: impl Fn(&Response) + Send + Sync + 'static) -> Self {
        self.on_after = Some(Arc::new(hook));
        self
    }

    /// Called when a logical request ends, whatever the outcome.
    pub fn on_finally(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_finally = Some(Arc::new(hook));
        self
    }

    pub fn on_loading(mut self, hook: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_loading = Some(Arc::new(hook));
        self
    }

    /// Called when the configured timeout aborts a request.
    pub fn on_timeout(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_timeout = Some(Arc::new(hook));
        self
    }

    error_callback_setters! {
        /// Called for `abort` records, explicit cancellations and timeouts alike.
        on_abort,
        /// Called when no more specific error callback handled the record.
        on_error,
        on_network_error,
        /// Called for `status >= 500`.
        on_server_error,
        /// Called for `400 <= status < 500` not routed to a more specific callback.
        on_client_error,
        on_unauthorized,
        on_rate_limit,
        on_not_found,
        /// Called for `application` records no status callback handled.
        on_application_error,
    }

    /// Returns a copy where every callback set in `overrides` replaces ours.
    pub fn merged(&self, overrides: &Callbacks) -> Callbacks {
        fn pick<T: Clone>(base: &Option<T>, over: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }

        Callbacks {
            on_before: pick(&self.on_before, &overrides.on_before),
            on_after: pick(&self.on_after, &overrides.on_after),
            on_finally: pick(&self.on_finally, &overrides.on_finally),
            on_loading: pick(&self.on_loading, &overrides.on_loading),
            on_abort: pick(&self.on_abort, &overrides.on_abort),
            on_timeout: pick(&self.on_timeout, &overrides.on_timeout),
            on_error: pick(&self.on_error, &overrides.on_error),
            on_network_error: pick(&self.on_network_error, &overrides.on_network_error),
            on_server_error: pick(&self.on_server_error, &overrides.on_server_error),
            on_client_error: pick(&self.on_client_error, &overrides.on_client_error),
            on_unauthorized: pick(&self.on_unauthorized, &overrides.on_unauthorized),
            on_rate_limit: pick(&self.on_rate_limit, &overrides.on_rate_limit),
            on_not_found: pick(&self.on_not_found, &overrides.on_not_found),
            on_application_error: pick(
                &self.on_application_error,
                &overrides.on_application_error,
            ),
        }
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set: Vec<&str> = [
            ("on_before", self.on_before.is_some()),
            ("on_after", self.on_after.is_some()),
            ("on_finally", self.on_finally.is_some()),
            ("on_loading", self.on_loading.is_some()),
            ("on_abort", self.on_abort.is_some()),
            ("on_timeout", self.on_timeout.is_some()),
            ("on_error", self.on_error.is_some()),
            ("on_network_error", self.on_network_error.is_some()),
            ("on_server_error", self.on_server_error.is_some()),
            ("on_client_error", self.on_client_error.is_some()),
            ("on_unauthorized", self.on_unauthorized.is_some()),
            ("on_rate_limit", self.on_rate_limit.is_some()),
            ("on_not_found", self.on_not_found.is_some()),
            ("on_application_error", self.on_application_error.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, is_set)| is_set.then_some(name))
        .collect();
        f.debug_struct("Callbacks").field("set", &set).finish()
    }
}

/// The configuration governing a client's requests.
///
/// A client holds one immutable `Config`; per-request [`ConfigOverrides`]
/// produce a new effective configuration through [`Config::merged`].
#[derive(Clone)]
pub struct Config {
    pub base_url: String,
    /// Default headers, sent with every request.
    pub headers: HeaderMap,
    /// Per-request timeout. `Duration::ZERO` disables it.
    pub timeout: Duration,
    pub response_type: ResponseType,
    pub token: Option<Token>,
    /// Key to unwrap from a successful JSON payload.
    pub data_key: Option<String>,
    /// Keys used to detect application errors; `None` disables detection.
    pub json_error_response: Option<JsonErrorResponse>,
    pub retry: RetryPolicy,
    /// Resolve failures as [`Outcome::Failure`](crate::Outcome::Failure)
    /// instead of returning `Err`.
    pub suppress_errors: bool,
    /// Log prepared requests, raw responses, and error records.
    pub debug: bool,
    pub error_interceptor: Option<ErrorTransform>,
    pub params_serializer: Option<ParamsSerializer>,
    pub callbacks: Callbacks,
}

impl Default for Config {
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            base_url: String::new(),
            headers,
            timeout: Duration::from_millis(5000),
            response_type: ResponseType::Json,
            token: None,
            data_key: None,
            json_error_response: Some(JsonErrorResponse::default()),
            retry: RetryPolicy::default(),
            suppress_errors: false,
            debug: false,
            error_interceptor: None,
            params_serializer: None,
            callbacks: Callbacks::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("response_type", &self.response_type)
            .field("token", &self.token.as_ref().map(|t| &t.key))
            .field("data_key", &self.data_key)
            .field("json_error_response", &self.json_error_response)
            .field("retry_count", &self.retry.count)
            .field("retry_delay", &self.retry.delay)
            .field("suppress_errors", &self.suppress_errors)
            .field("debug", &self.debug)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Returns the effective configuration for one request.
    ///
    /// Every field set in `overrides` replaces the base value; callbacks are
    /// replaced one by one. `self` is left untouched.
    pub fn merged(&self, overrides: &ConfigOverrides) -> Config {
        let mut config = self.clone();

        if let Some(base_url) = &overrides.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(headers) = &overrides.headers {
            config.headers = headers.clone();
        }
        if let Some(timeout) = overrides.timeout {
            config.timeout = timeout;
        }
        if let Some(response_type) = overrides.response_type {
            config.response_type = response_type;
        }
        if let Some(token) = &overrides.token {
            config.token = token.clone();
        }
        if let Some(data_key) = &overrides.data_key {
            config.data_key = data_key.clone();
        }
        if let Some(json_error_response) = &overrides.json_error_response {
            config.json_error_response = json_error_response.clone();
        }
        if let Some(retry) = &overrides.retry {
            config.retry = retry.clone();
        }
        if let Some(debug) = overrides.debug {
            config.debug = debug;
        }
        if let Some(error_interceptor) = &overrides.error_interceptor {
            config.error_interceptor = Some(Arc::clone(error_interceptor));
        }
        if let Some(params_serializer) = &overrides.params_serializer {
            config.params_serializer = Some(Arc::clone(params_serializer));
        }
        config.callbacks = self.callbacks.merged(&overrides.callbacks);

        config
    }
}

/// A partial configuration for a single request.
///
/// There is no `suppress_errors` override; it is fixed per client.
///
/// # Examples
///
/// ```
/// use courier::ConfigOverrides;
/// use std::time::Duration;
///
/// let overrides = ConfigOverrides::new()
///     .timeout(Duration::from_secs(30))
///     .data_key("result");
/// ```
#[derive(Clone, Default)]
pub struct ConfigOverrides {
    pub(crate) base_url: Option<String>,
    pub(crate) headers: Option<HeaderMap>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) response_type: Option<ResponseType>,
    pub(crate) token: Option<Option<Token>>,
    pub(crate) data_key: Option<Option<String>>,
    pub(crate) json_error_response: Option<Option<JsonErrorResponse>>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) debug: Option<bool>,
    pub(crate) error_interceptor: Option<ErrorTransform>,
    pub(crate) params_serializer: Option<ParamsSerializer>,
    pub(crate) callbacks: Callbacks,
}

impl fmt::Debug for ConfigOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigOverrides")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("response_type", &self.response_type)
            .field("data_key", &self.data_key)
            .field("debug", &self.debug)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Replaces the default headers for this request.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn token(mut self, token: Token) -> Self {
        self.token = Some(Some(token));
        self
    }

    pub fn without_token(mut self) -> Self {
        self.token = Some(None);
        self
    }

    pub fn data_key(mut self, data_key: impl Into<String>) -> Self {
        self.data_key = Some(Some(data_key.into()));
        self
    }

    pub fn without_data_key(mut self) -> Self {
        self.data_key = Some(None);
        self
    }

    pub fn json_error_response(mut self, keys: JsonErrorResponse) -> Self {
        self.json_error_response = Some(Some(keys));
        self
    }

    /// Disables application-error detection for this request.
    pub fn without_json_error_response(mut self) -> Self {
        self.json_error_response = Some(None);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Shorthand for a retry policy with the default condition.
    pub fn retries(self, count: usize, delay: Duration) -> Self {
        self.retry(RetryPolicy::new(count, delay))
    }

    /// Shorthand for a retry policy with a custom condition.
    pub fn retry_when(
        self,
        count: usize,
        delay: Duration,
        condition: impl RetryCondition + 'static,
    ) -> Self {
        self.retry(RetryPolicy::new(count, delay).condition(condition))
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn error_interceptor(
        mut self,
        transform: impl Fn(ErrorRecord) -> ErrorRecord + Send + Sync + 'static,
    ) -> Self {
        self.error_interceptor = Some(Arc::new(transform));
        self
    }

    pub fn params_serializer(
        mut self,
        serializer: impl Fn(&Params) -> String + Send + Sync + 'static,
    ) -> Self {
        self.params_serializer = Some(Arc::new(serializer));
        self
    }

    /// Callbacks that replace the client's for this request.
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(config.response_type, ResponseType::Json);
        assert_eq!(
            config.json_error_response,
            Some(JsonErrorResponse::default())
        );
        assert_eq!(config.retry.count, 0);
        assert!(!config.suppress_errors);
        assert!(config.callbacks.on_error.is_none());
    }

    #[test]
    fn test_merge_leaves_base_untouched() {
        let base = Config {
            base_url: "https://api.test".into(),
            data_key: Some("data".into()),
            ..Config::default()
        };

        let merged = base.merged(
            &ConfigOverrides::new()
                .timeout(Duration::from_secs(1))
                .without_data_key()
                .retries(2, Duration::ZERO),
        );

        assert_eq!(merged.base_url, "https://api.test");
        assert_eq!(merged.timeout, Duration::from_secs(1));
        assert_eq!(merged.data_key, None);
        assert_eq!(merged.retry.count, 2);

        assert_eq!(base.timeout, Duration::from_millis(5000));
        assert_eq!(base.data_key.as_deref(), Some("data"));
        assert_eq!(base.retry.count, 0);
    }

    #[test]
    fn test_callbacks_merge_per_field() {
        let base_calls = Arc::new(AtomicUsize::new(0));
        let override_calls = Arc::new(AtomicUsize::new(0));
        let (b, o) = (base_calls.clone(), override_calls.clone());

        let base = Callbacks::new()
            .on_error(move |_| {
                b.fetch_add(1, Ordering::SeqCst);
            })
            .on_finally(|| {});
        let overrides = Callbacks::new().on_error(move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        });

        let merged = base.merged(&overrides);
        assert!(merged.on_finally.is_some());

        let record = ErrorRecord::abort(crate::abort::AbortReason::Timeout);
        (merged.on_error.unwrap())(&record);
        assert_eq!(base_calls.load(Ordering::SeqCst), 0);
        assert_eq!(override_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_token_header_value() {
        assert_eq!(Token::bearer("abc").header_value(), "Bearer abc");
        assert_eq!(
            Token::bearer("abc").key("X-Api-Key").scheme("").header_value(),
            "abc"
        );
    }
}
