//! Core domain types for Fanout.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer: the transport produces [`Response`]s,
//! the dispatcher wraps them into [`Outcome`]s, and callers read them back.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod outcome;
mod request;
mod response;

pub use outcome::{FailureKind, Outcome, RequestFailure};
pub use request::{Body, RequestOptions, RequestSpec};
pub use response::Response;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// HTTP Method
// ============================================================================

/// HTTP verbs the dispatcher can submit.
///
/// Kept as a closed enum so every submission method on the dispatcher maps to
/// exactly one variant and transports never see free-form verb strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Get,
        Method::Post,
        Method::Put,
        Method::Patch,
        Method::Delete,
        Method::Head,
        Method::Options,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported HTTP method: {0}")]
pub struct UnknownMethodError(String);

impl FromStr for Method {
    type Err = UnknownMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMethodError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert_eq!(" Delete ".parse::<Method>(), Ok(Method::Delete));
        assert_eq!("OPTIONS".parse::<Method>(), Ok(Method::Options));
    }

    #[test]
    fn method_rejects_unknown_verbs() {
        let err = "TRACE".parse::<Method>().unwrap_err();
        assert_eq!(err.to_string(), "unsupported HTTP method: TRACE");
    }

    #[test]
    fn method_display_matches_wire_name() {
        for method in Method::ALL {
            assert_eq!(method.to_string(), method.as_str());
        }
    }

    #[test]
    fn method_serializes_uppercase() {
        let json = serde_json::to_string(&Method::Patch).unwrap();
        assert_eq!(json, "\"PATCH\"");
    }
}
