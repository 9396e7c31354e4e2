//! Ordered concurrent dispatch of blocking HTTP calls.
//!
//! # Architecture
//!
//! - [`Dispatcher`] - owns the scheduling context and the ordered request registry.
//!   [`Dispatcher::enter`] opens a [`Scope`]; requests submitted through the scope
//!   start immediately on worker threads; closing (or dropping) the scope waits for
//!   all of them and tears the context down.
//! - [`RequestTask`] - one blocking [`Transport`] call on a worker thread, settled
//!   into exactly one [`Outcome`].
//! - [`execute`] - a single request from inside an existing tokio runtime.
//!
//! # Ordering
//!
//! [`Dispatcher::results`] is always in submission order. Callbacks run on the
//! coordinating thread in completion order.
//!
//! # Error Handling
//!
//! Transport failures (DNS, refused connections, timeouts, malformed URLs, even a
//! panicking transport) never abort a batch: they come back as
//! [`Outcome::Failure`] in their slot. Only usage errors and scheduling-context
//! failures are returned as [`DispatchError`].
//!
//! ```no_run
//! use fanout_core::{Dispatcher, HttpTransport, RequestOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut dispatcher = Dispatcher::new(HttpTransport::with_defaults()?);
//! {
//!     let mut scope = dispatcher.enter()?;
//!     scope.get("https://example.com/", RequestOptions::default())?;
//!     scope.get("https://example.org/", RequestOptions::default())?;
//! }
//! for outcome in dispatcher.results() {
//!     println!("{}", outcome.is_success());
//! }
//! # Ok(())
//! # }
//! ```

mod context;
mod dispatcher;
mod errors;
mod task;

pub use dispatcher::{
    Callback, Dispatcher, DispatcherBuilder, DispatcherState, FailureHandler, Scope,
};
pub use errors::DispatchError;
pub use task::{FinishedTask, RequestTask};

pub use fanout_config::DispatcherConfig;
pub use fanout_transport::{HttpTransport, Transport, TransportError};
pub use fanout_types::{
    Body, FailureKind, Method, Outcome, RequestFailure, RequestOptions, RequestSpec, Response,
};

use std::sync::Arc;

use tokio::runtime::Handle;

/// Run one request on the current runtime's blocking pool.
///
/// For callers already inside tokio. Failures are converted exactly as in a
/// dispatcher batch. Polled outside a tokio runtime, the request is not sent
/// and the outcome is a failure of kind [`FailureKind::Other`].
pub async fn execute(transport: Arc<dyn Transport>, spec: RequestSpec) -> Outcome {
    let handle = match Handle::try_current() {
        Ok(handle) => handle,
        Err(err) => {
            return Outcome::Failure(RequestFailure::new(
                spec.method(),
                spec.url(),
                FailureKind::Other,
                err.to_string(),
            ));
        }
    };
    RequestTask::spawn(0, spec, transport, &handle)
        .finish()
        .await
        .into_outcome()
}

pub async fn get(
    transport: Arc<dyn Transport>,
    url: impl Into<String>,
    options: RequestOptions,
) -> Outcome {
    execute(transport, RequestSpec::new(Method::Get, url, options)).await
}

pub async fn post(
    transport: Arc<dyn Transport>,
    url: impl Into<String>,
    options: RequestOptions,
) -> Outcome {
    execute(transport, RequestSpec::new(Method::Post, url, options)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::time::Duration;

    fn echo(
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response, TransportError> {
        if url.contains(".invalid") {
            return Err(TransportError::new(FailureKind::Connect, "no such host"));
        }
        let body = match &options.body {
            Some(Body::Text(text)) => text.clone().into_bytes(),
            _ => method.as_str().as_bytes().to_vec(),
        };
        Ok(Response::new(url, 200, Vec::new(), body, Duration::ZERO))
    }

    #[tokio::test]
    async fn execute_inside_runtime() {
        let transport: Arc<dyn Transport> = Arc::new(echo);
        let outcome = get(Arc::clone(&transport), "http://ok/", RequestOptions::default()).await;
        assert_eq!(outcome.response().unwrap().body(), b"GET");

        let outcome = post(
            transport,
            "http://ok/",
            RequestOptions::new().text("payload"),
        )
        .await;
        assert_eq!(outcome.response().unwrap().body(), b"payload");
    }

    #[tokio::test]
    async fn execute_converts_failures() {
        let outcome = get(
            Arc::new(echo),
            "http://nope.invalid/",
            RequestOptions::default(),
        )
        .await;
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.url(), "http://nope.invalid/");
        assert_eq!(failure.kind(), FailureKind::Connect);
    }

    #[test]
    fn execute_outside_runtime_is_a_failure() {
        let outcome = get(Arc::new(echo), "http://ok/", RequestOptions::default())
            .now_or_never()
            .unwrap();
        let failure = outcome.failure().unwrap();
        assert_eq!(failure.url(), "http://ok/");
        assert_eq!(failure.kind(), FailureKind::Other);
        assert!(failure.message().contains("runtime"));
    }

    #[tokio::test]
    async fn concurrent_executes_overlap() {
        let slow = |_: Method, url: &str, _: &RequestOptions| {
            std::thread::sleep(Duration::from_millis(200));
            Ok::<_, TransportError>(Response::new(
                url,
                200,
                Vec::new(),
                Vec::new(),
                Duration::ZERO,
            ))
        };
        let transport: Arc<dyn Transport> = Arc::new(slow);
        let started = std::time::Instant::now();
        let (a, b, c) = tokio::join!(
            get(Arc::clone(&transport), "http://a/", RequestOptions::default()),
            get(Arc::clone(&transport), "http://b/", RequestOptions::default()),
            get(Arc::clone(&transport), "http://c/", RequestOptions::default()),
        );
        assert!(a.is_success() && b.is_success() && c.is_success());
        assert!(started.elapsed() < Duration::from_millis(550));
    }
}
