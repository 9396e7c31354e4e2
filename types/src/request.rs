//! Request description handed verbatim to the transport.

use std::time::Duration;

use crate::Method;

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// UTF-8 text sent as-is.
    Text(String),
    /// Raw bytes sent as-is.
    Bytes(Vec<u8>),
    /// Serialized as JSON with `content-type: application/json`.
    Json(serde_json::Value),
    /// Serialized as `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

/// Per-request options.
///
/// The dispatcher never inspects these; they are forwarded to the transport
/// untouched. Anything HTTP-semantic (redirect policy, retries, pooling) is
/// the transport's concern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Body>,
    /// Overrides the transport's default request timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Body::Text(body.into()));
        self
    }

    #[must_use]
    pub fn bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(Body::Bytes(body.into()));
        self
    }

    #[must_use]
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    #[must_use]
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.body = Some(Body::Form(fields));
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Everything the transport needs to perform one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    method: Method,
    url: String,
    options: RequestOptions,
}

impl RequestSpec {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>, options: RequestOptions) -> Self {
        Self {
            method,
            url: url.into(),
            options,
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url, RequestOptions::default())
    }

    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn options(&self) -> &RequestOptions {
        &self.options
    }
}
