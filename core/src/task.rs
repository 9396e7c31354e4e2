//! One blocking HTTP call, run off the coordinating thread.
//!
//! A [`RequestTask`] is created at submission time and immediately handed to
//! the runtime's blocking pool. Awaiting [`RequestTask::finish`] yields a
//! [`FinishedTask`] holding exactly one [`Outcome`]: transport errors and
//! panics inside the transport are converted, never propagated.

use std::any::Any;
use std::sync::Arc;

use fanout_transport::Transport;
use fanout_types::{FailureKind, Method, Outcome, RequestFailure, RequestSpec};
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinHandle};

/// A submitted request whose outcome is not yet known.
#[derive(Debug)]
pub struct RequestTask {
    index: usize,
    spec: RequestSpec,
    join: JoinHandle<Outcome>,
}

impl RequestTask {
    /// Start `spec` on `handle`'s blocking pool.
    ///
    /// `index` is the submission position and travels with the outcome so the
    /// dispatcher can restore submission order after completion-order waits.
    pub fn spawn(
        index: usize,
        spec: RequestSpec,
        transport: Arc<dyn Transport>,
        handle: &Handle,
    ) -> Self {
        let call_spec = spec.clone();
        let join = handle.spawn_blocking(move || call(transport.as_ref(), &call_spec));
        Self { index, spec, join }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the worker and settle the outcome.
    pub async fn finish(self) -> FinishedTask {
        let outcome = match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Failure(join_failure(&self.spec, err)),
        };

        match &outcome {
            Outcome::Success(response) => tracing::trace!(
                index = self.index,
                url = self.spec.url(),
                status = response.status(),
                "Request task finished"
            ),
            Outcome::Failure(failure) => tracing::debug!(
                index = self.index,
                url = self.spec.url(),
                kind = %failure.kind(),
                "Request task failed"
            ),
        }

        FinishedTask {
            index: self.index,
            spec: self.spec,
            outcome,
        }
    }
}

/// Run the transport on the current (worker) thread.
pub(crate) fn call(transport: &dyn Transport, spec: &RequestSpec) -> Outcome {
    match transport.call(spec.method(), spec.url(), spec.options()) {
        Ok(response) => Outcome::Success(response),
        Err(err) => Outcome::Failure(RequestFailure::new(
            spec.method(),
            spec.url(),
            err.kind(),
            err.message(),
        )),
    }
}

fn join_failure(spec: &RequestSpec, err: JoinError) -> RequestFailure {
    if err.is_panic() {
        let message = panic_message(err.into_panic().as_ref());
        tracing::error!(url = spec.url(), "Transport panicked: {message}");
        return RequestFailure::new(
            spec.method(),
            spec.url(),
            FailureKind::Panicked,
            format!("transport panicked: {message}"),
        );
    }
    RequestFailure::new(
        spec.method(),
        spec.url(),
        FailureKind::Other,
        format!("request task did not complete: {err}"),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A request task with its outcome settled. Immutable.
#[derive(Debug, Clone)]
pub struct FinishedTask {
    index: usize,
    spec: RequestSpec,
    outcome: Outcome,
}

impl FinishedTask {
    /// Position of this request in submission order.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    #[must_use]
    pub const fn method(&self) -> Method {
        self.spec.method()
    }

    #[must_use]
    pub fn url(&self) -> &str {
        self.spec.url()
    }

    #[must_use]
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    #[must_use]
    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }
}
