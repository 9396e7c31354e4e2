//! Transport-neutral HTTP response.

use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::time::Duration;

/// A fully-read HTTP response.
///
/// The body is buffered by the transport before the response is handed back,
/// so a `Response` can cross threads and outlive the connection it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    elapsed: Duration,
}

impl Response {
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
        elapsed: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            status,
            headers,
            body,
            elapsed,
        }
    }

    /// Final URL after any redirects the transport followed.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value matching `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Body decoded as UTF-8, with invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Wall-clock time the transport spent on the call, body read included.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
