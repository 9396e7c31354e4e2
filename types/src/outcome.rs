//! Tagged per-request outcome.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::{Method, Response};

/// Coarse classification of why a request produced no response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Could not connect (refused, reset, DNS resolution, TLS handshake).
    Connect,
    /// Connect or request timeout elapsed.
    Timeout,
    /// URL could not be parsed or uses an unsupported scheme.
    InvalidUrl,
    /// Redirect loop or redirect limit exceeded.
    Redirect,
    /// Request or response body could not be transferred.
    Body,
    /// Response could not be decoded.
    Decode,
    /// The transport panicked while executing the call.
    Panicked,
    Other,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FailureKind::Connect => "connect",
            FailureKind::Timeout => "timeout",
            FailureKind::InvalidUrl => "invalid_url",
            FailureKind::Redirect => "redirect",
            FailureKind::Body => "body",
            FailureKind::Decode => "decode",
            FailureKind::Panicked => "panicked",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request that ended without a response.
///
/// Always carries the URL as submitted (not a redirect target) so a failed
/// entry in a batch can be matched back to its submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{method} {url} failed ({kind}): {message}")]
pub struct RequestFailure {
    method: Method,
    url: String,
    kind: FailureKind,
    message: String,
}

impl RequestFailure {
    #[must_use]
    pub fn new(
        method: Method,
        url: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            method,
            url: url.into(),
            kind,
            message: message.into(),
        }
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
    pub const fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Human-readable description of the underlying transport error.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Placeholder body. A failed request never has one.
    #[must_use]
    pub const fn body(&self) -> &[u8] {
        &[]
    }
}

/// Result of one request task: exactly one of success or failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(Response),
    Failure(RequestFailure),
}

impl Outcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    #[must_use]
    pub const fn response(&self) -> Option<&Response> {
        match self {
            Outcome::Success(response) => Some(response),
            Outcome::Failure(_) => None,
        }
    }

    #[must_use]
    pub const fn failure(&self) -> Option<&RequestFailure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<Response, RequestFailure> {
        match self {
            Outcome::Success(response) => Ok(response),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

impl From<Result<Response, RequestFailure>> for Outcome {
    fn from(result: Result<Response, RequestFailure>) -> Self {
        match result {
            Ok(response) => Outcome::Success(response),
            Err(failure) => Outcome::Failure(failure),
        }
    }
}
