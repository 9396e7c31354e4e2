//! `reqwest` blocking client adapter.

use fanout_config::TransportConfig;
use fanout_types::{Body, Method, RequestOptions, Response};
use reqwest::blocking::{Client, ClientBuilder};
use reqwest::redirect::Policy;
use std::time::Instant;

use crate::{Transport, TransportError};

/// Blocking HTTP transport backed by a pooled `reqwest::blocking::Client`.
///
/// The blocking client owns an internal runtime thread, so it must be built
/// and dropped outside of any async context. Calls made from tokio's blocking
/// pool are fine.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, reqwest::Error> {
        let client = client_builder(config).build()?;
        Ok(Self { client })
    }

    /// Transport with every setting at its default.
    pub fn with_defaults() -> Result<Self, reqwest::Error> {
        Self::new(&TransportConfig::default())
    }

    /// Wrap an already configured client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn client_builder(config: &TransportConfig) -> ClientBuilder {
    let redirect = match config.max_redirects() {
        0 => Policy::none(),
        n => Policy::limited(n),
    };

    Client::builder()
        .user_agent(config.user_agent())
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(redirect)
        .tcp_keepalive(Some(config.tcp_keepalive()))
        .pool_max_idle_per_host(config.pool_max_idle_per_host())
        .pool_idle_timeout(Some(config.pool_idle_timeout()))
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

impl Transport for HttpTransport {
    fn call(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response, TransportError> {
        let started = Instant::now();

        let mut request = self.client.request(to_reqwest_method(method), url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        request = match &options.body {
            None => request,
            Some(Body::Text(text)) => request.body(text.clone()),
            Some(Body::Bytes(bytes)) => request.body(bytes.clone()),
            Some(Body::Json(value)) => request.json(value),
            Some(Body::Form(fields)) => request.form(fields),
        };
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().map_err(TransportError::from)?;

        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().map_err(TransportError::from)?.to_vec();
        let elapsed = started.elapsed();

        tracing::debug!(
            method = %method,
            url,
            status,
            bytes = body.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "HTTP call finished"
        );

        Ok(Response::new(final_url, status, headers, body, elapsed))
    }
}
