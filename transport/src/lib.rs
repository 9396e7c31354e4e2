//! The blocking HTTP primitive the dispatcher fans out over.
//!
//! # Architecture
//!
//! - [`Transport`] - one synchronous call: method, URL and options in, a buffered
//!   [`Response`] or a [`TransportError`] out. Implementations block the calling
//!   thread for the whole network round trip.
//! - [`HttpTransport`] - the production implementation over `reqwest`'s blocking
//!   client, configured from [`fanout_config::TransportConfig`].
//!
//! Any `Fn(Method, &str, &RequestOptions) -> Result<Response, TransportError>`
//! closure is also a [`Transport`], which is how tests script latency and
//! failures without a network.

mod http;

pub use http::HttpTransport;

pub use fanout_types;

use fanout_types::{FailureKind, Method, RequestOptions, Response};
use std::error::Error as StdError;
use thiserror::Error;

/// A synchronous HTTP client.
///
/// `call` is allowed to block for as long as the request takes. It is only
/// ever invoked from worker threads, never from the coordinating thread.
pub trait Transport: Send + Sync + 'static {
    fn call(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response, TransportError>;
}

impl<F> Transport for F
where
    F: Fn(Method, &str, &RequestOptions) -> Result<Response, TransportError>
        + Send
        + Sync
        + 'static,
{
    fn call(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response, TransportError> {
        self(method, url, options)
    }
}

/// Transport-level failure: no HTTP response was obtained.
///
/// HTTP error statuses (4xx/5xx) are *not* transport errors; they come back
/// as ordinary responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    kind: FailureKind,
    message: String,
}

impl TransportError {
    #[must_use]
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_connect() {
            FailureKind::Connect
        } else if err.is_redirect() {
            FailureKind::Redirect
        } else if err.is_builder() {
            FailureKind::InvalidUrl
        } else if err.is_body() {
            FailureKind::Body
        } else if err.is_decode() {
            FailureKind::Decode
        } else if err.is_request() {
            FailureKind::Connect
        } else {
            FailureKind::Other
        };
        Self::new(kind, error_chain(&err))
    }
}

/// Render an error and its sources as `outer: inner: root`.
///
/// reqwest's top-level message ("error sending request") hides the useful
/// part (DNS failure, refused connection) in the source chain.
pub(crate) fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}
