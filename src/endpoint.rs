//! Query parameters and final URL resolution.

use crate::config::Config;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use url::form_urlencoded;

/// Query parameters for a request.
///
/// Values are JSON scalars; `null` values are dropped by the default
/// serializer, everything else is rendered as text.
///
/// # Examples
///
/// ```
/// use courier::Params;
///
/// let params = Params::new()
///     .with("page", 2)
///     .with("q", "rust")
///     .with("cursor", None::<String>);
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any previous value for `key`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a parameter, returning the previous value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns the value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` if `key` is present, even with a `null` value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copies every parameter of `other` into `self`, `other` winning on collision.
    pub fn extend(&mut self, other: Params) {
        self.0.extend(other.0);
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Serializes parameters as an `application/x-www-form-urlencoded` query string.
///
/// `null` values are dropped; other values are coerced to text.
pub fn default_params_serializer(params: &Params) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params.iter() {
        if !value.is_null() {
            serializer.append_pair(key, &value_text(value));
        }
    }
    serializer.finish()
}

/// Resolves `endpoint` and `params` into the final request URL.
///
/// Absolute endpoints (`http://` or `https://`) bypass the configured base
/// URL. A query string embedded in the endpoint is merged into `params`,
/// with the explicit `params` winning on key collision.
pub fn build_url(endpoint: &str, params: &Params, config: &Config) -> String {
    let (path, embedded_query) = match endpoint.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (endpoint, None),
    };

    let mut merged = params.clone();
    if let Some(query) = embedded_query {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            if !merged.contains_key(&key) {
                merged.insert(key.into_owned(), value.into_owned());
            }
        }
    }

    let query = match &config.params_serializer {
        Some(serializer) => serializer(&merged),
        None => default_params_serializer(&merged),
    };

    let mut url = if is_absolute(path) {
        path.to_string()
    } else {
        format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            path.trim_matches('/')
        )
    };
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }
    url
}

fn is_absolute(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Renders a JSON value the way form fields and query values expect it.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn config(base_url: &str) -> Config {
        Config {
            base_url: base_url.to_string(),
            ..Config::default()
        }
    }

    fn query_pairs(url: &str) -> HashMap<String, String> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or("");
        form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect()
    }

    #[test]
    fn test_embedded_query_merges_with_params() {
        let params = Params::new().with("b", 3).with("c", 4);
        let url = build_url("/items?a=1&b=2", &params, &config("https://api.test"));

        assert!(url.starts_with("https://api.test/items?"));
        let pairs = query_pairs(&url);
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs["a"], "1");
        assert_eq!(pairs["b"], "3");
        assert_eq!(pairs["c"], "4");
    }

    #[test]
    fn test_absolute_endpoint_ignores_base_url() {
        let params = Params::new().with("q", 1);
        let url = build_url("https://x.test/y", &params, &config("https://ignored"));
        assert_eq!(url, "https://x.test/y?q=1");

        let url = build_url("HTTP://x.test/y", &Params::new(), &config("https://ignored"));
        assert_eq!(url, "HTTP://x.test/y");
    }

    #[test]
    fn test_joins_with_exactly_one_slash() {
        let cfg = config("https://api.test/v1/");
        assert_eq!(build_url("/users/", &Params::new(), &cfg), "https://api.test/v1/users");
        assert_eq!(build_url("users", &Params::new(), &cfg), "https://api.test/v1/users");
    }

    #[test]
    fn test_empty_query_has_no_question_mark() {
        let params = Params::new().with("skip", Value::Null);
        let url = build_url("/users", &params, &config("https://api.test"));
        assert_eq!(url, "https://api.test/users");
    }

    #[test]
    fn test_default_serializer_coerces_and_encodes() {
        let params = Params::new()
            .with("active", true)
            .with("name", "a b&c")
            .with("ids", serde_json::json!([1, 2]));
        assert_eq!(
            default_params_serializer(&params),
            "active=true&ids=1%2C2&name=a+b%26c"
        );
    }

    #[test]
    fn test_custom_params_serializer() {
        let mut cfg = config("https://api.test");
        cfg.params_serializer = Some(Arc::new(|params: &Params| {
            params
                .iter()
                .map(|(k, v)| format!("{}:{}", k, value_text(v)))
                .collect::<Vec<_>>()
                .join(";")
        }));

        let url = build_url("/search", &Params::new().with("q", "x"), &cfg);
        assert_eq!(url, "https://api.test/search?q:x");
    }
}
