//! Scoped fan-out/fan-in over a blocking transport.
//!
//! ```text
//! Dispatcher::enter() -> Scope (Open)
//!     scope.get()/post()/... -> RequestTask spawned on the blocking pool
//! scope.close() / drop(scope) (Closing)
//!     await every task in completion order -> callbacks
//!     sort by submission index -> results
//!     tear down scheduling context (Closed)
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use fanout_config::DispatcherConfig;
use fanout_transport::Transport;
use fanout_types::{Method, Outcome, RequestFailure, RequestOptions, RequestSpec};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;

use crate::context::SchedulingContext;
use crate::errors::DispatchError;
use crate::task::{FinishedTask, RequestTask};

/// Invoked once per finished request, in completion order.
pub type Callback = Box<dyn FnMut(&FinishedTask) + Send>;

/// Invoked once per failed request, before the callback for that request.
pub type FailureHandler = Box<dyn FnMut(&RequestFailure) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// Constructed; no scope has been entered yet.
    Idle,
    /// Accepting submissions.
    Open,
    /// Waiting on outstanding requests; submissions are rejected.
    Closing,
    /// Results are readable and the scheduling context is gone.
    Closed,
}

impl DispatcherState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            DispatcherState::Idle => "idle",
            DispatcherState::Open => "open",
            DispatcherState::Closing => "closing",
            DispatcherState::Closed => "closed",
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issues HTTP requests concurrently and returns their outcomes in
/// submission order.
///
/// A dispatcher is reusable: each [`enter`](Self::enter) starts a fresh
/// batch with a fresh scheduling context, discarding the previous results.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
    callback: Option<Callback>,
    on_failure: Option<FailureHandler>,
    state: DispatcherState,
    context: Option<SchedulingContext>,
    pending: Vec<RequestTask>,
    results: Vec<Outcome>,
    scopes_closed: u64,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("callback", &self.callback.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("pending", &self.pending.len())
            .field("results", &self.results.len())
            .finish_non_exhaustive()
    }
}

pub struct DispatcherBuilder {
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
    callback: Option<Callback>,
    on_failure: Option<FailureHandler>,
}

impl DispatcherBuilder {
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    /// Share one transport (and its connection pool) between dispatchers.
    #[must_use]
    pub fn from_shared(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: DispatcherConfig::default(),
            callback: None,
            on_failure: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn callback(mut self, callback: impl FnMut(&FinishedTask) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Replaces the default `warn` log emitted for each failed request.
    #[must_use]
    pub fn on_failure(mut self, handler: impl FnMut(&RequestFailure) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            transport: self.transport,
            config: self.config,
            callback: self.callback,
            on_failure: self.on_failure,
            state: DispatcherState::Idle,
            context: None,
            pending: Vec::new(),
            results: Vec::new(),
            scopes_closed: 0,
        }
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        DispatcherBuilder::new(transport).build()
    }

    #[must_use]
    pub fn builder(transport: impl Transport) -> DispatcherBuilder {
        DispatcherBuilder::new(transport)
    }

    /// Open a scope: create the scheduling context and start a new batch.
    ///
    /// The returned guard closes the scope when dropped, so the context is
    /// released on every exit path.
    pub fn enter(&mut self) -> Result<Scope<'_>, DispatchError> {
        if matches!(self.state, DispatcherState::Open | DispatcherState::Closing) {
            return Err(DispatchError::AlreadyOpen);
        }

        let context =
            SchedulingContext::new(&self.config).map_err(DispatchError::SchedulingContext)?;
        self.pending.clear();
        self.results.clear();
        self.context = Some(context);
        self.state = DispatcherState::Open;
        tracing::debug!("Dispatcher scope opened");

        Ok(Scope { dispatcher: self })
    }

    /// Run `body` inside a scope and close it afterwards.
    ///
    /// The scope is closed even if `body` panics; in that case requests
    /// still in flight are abandoned rather than awaited.
    pub fn run<T>(
        &mut self,
        body: impl FnOnce(&mut Scope<'_>) -> T,
    ) -> Result<T, DispatchError> {
        let mut scope = self.enter()?;
        let value = body(&mut scope);
        scope.close();
        Ok(value)
    }

    /// Queue a request. Returns as soon as the request is handed to a worker.
    pub fn submit(&mut self, spec: RequestSpec) -> Result<(), DispatchError> {
        let live = self.context.as_ref().and_then(SchedulingContext::handle);
        let handle = match (self.state, live) {
            (DispatcherState::Open, Some(handle)) => handle,
            (state, _) => {
                return Err(DispatchError::UseAfterClose {
                    method: spec.method(),
                    url: spec.url().to_string(),
                    state,
                });
            }
        };

        let index = self.pending.len();
        tracing::debug!(index, method = %spec.method(), url = spec.url(), "Request submitted");
        let task = RequestTask::spawn(index, spec, Arc::clone(&self.transport), handle);
        self.pending.push(task);
        Ok(())
    }

    pub fn request(
        &mut self,
        method: Method,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<(), DispatchError> {
        self.submit(RequestSpec::new(method, url, options))
    }

    pub fn get(
        &mut self,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<(), DispatchError> {
        self.request(Method::Get, url, options)
    }

    pub fn post(
        &mut self,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<(), DispatchError> {
        self.request(Method::Post, url, options)
    }

    pub fn put(
        &mut self,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<(), DispatchError> {
        self.request(Method::Put, url, options)
    }

    pub fn patch(
        &mut self,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<(), DispatchError> {
        self.request(Method::Patch, url, options)
    }

    pub fn delete(
        &mut self,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<(), DispatchError> {
        self.request(Method::Delete, url, options)
    }

    pub fn head(
        &mut self,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<(), DispatchError> {
        self.request(Method::Head, url, options)
    }

    pub fn options(
        &mut self,
        url: impl Into<String>,
        options: RequestOptions,
    ) -> Result<(), DispatchError> {
        self.request(Method::Options, url, options)
    }

    #[must_use]
    pub const fn state(&self) -> DispatcherState {
        self.state
    }

    /// Requests submitted in the current scope.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.pending.len()
    }

    /// Outcomes of the last closed scope, in submission order.
    ///
    /// Empty while a scope is open.
    #[must_use]
    pub fn results(&self) -> &[Outcome] {
        &self.results
    }

    pub fn take_results(&mut self) -> Vec<Outcome> {
        std::mem::take(&mut self.results)
    }

    #[must_use]
    pub fn has_live_context(&self) -> bool {
        self.context.as_ref().is_some_and(SchedulingContext::is_live)
    }

    /// Number of scheduling contexts this dispatcher has torn down.
    #[must_use]
    pub const fn scopes_closed(&self) -> u64 {
        self.scopes_closed
    }

    fn close(&mut self) {
        if self.state != DispatcherState::Open {
            return;
        }
        self.state = DispatcherState::Closing;

        let started = Instant::now();
        let pending = std::mem::take(&mut self.pending);
        let submitted = pending.len();

        let Self {
            context,
            callback,
            on_failure,
            ..
        } = self;

        let waited = panic::catch_unwind(AssertUnwindSafe(|| {
            context.as_ref().and_then(|context| {
                context.block_on(async {
                    let mut in_flight: FuturesUnordered<_> =
                        pending.into_iter().map(RequestTask::finish).collect();
                    let mut completed = Vec::with_capacity(submitted);
                    while let Some(finished) = in_flight.next().await {
                        notify(callback.as_mut(), on_failure.as_mut(), &finished);
                        completed.push(finished);
                    }
                    completed
                })
            })
        }));

        // A panicking callback or failure handler must not leave the context live.
        let mut completed = match waited {
            Ok(completed) => completed.unwrap_or_default(),
            Err(payload) => {
                self.abandon();
                panic::resume_unwind(payload);
            }
        };

        completed.sort_unstable_by_key(FinishedTask::index);
        debug_assert_eq!(completed.len(), submitted);
        self.results = completed.into_iter().map(FinishedTask::into_outcome).collect();

        self.release_context(false);
        let failed = self.results.iter().filter(|o| o.is_failure()).count();
        tracing::debug!(
            submitted,
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dispatcher scope closed"
        );
    }

    /// Close without waiting. Used when the scope unwinds.
    fn abandon(&mut self) {
        if !matches!(self.state, DispatcherState::Open | DispatcherState::Closing) {
            return;
        }
        let abandoned = self.pending.len();
        self.pending.clear();
        self.results.clear();
        self.release_context(true);
        tracing::warn!(abandoned, "Dispatcher scope abandoned during unwind");
    }

    fn release_context(&mut self, abandon: bool) {
        if let Some(mut context) = self.context.take() {
            let released = if abandon {
                context.abandon()
            } else {
                context.shutdown()
            };
            if released {
                self.scopes_closed += 1;
            }
        }
        self.state = DispatcherState::Closed;
    }
}

fn notify(
    callback: Option<&mut Callback>,
    on_failure: Option<&mut FailureHandler>,
    finished: &FinishedTask,
) {
    if let Outcome::Failure(failure) = finished.outcome() {
        match on_failure {
            Some(handler) => handler(failure),
            None => tracing::warn!(
                index = finished.index(),
                url = failure.url(),
                kind = %failure.kind(),
                "Request failed: {}",
                failure.message()
            ),
        }
    }
    if let Some(callback) = callback {
        callback(finished);
    }
}

/// An open dispatcher scope.
///
/// Derefs to the [`Dispatcher`], so submission methods are called on the
/// scope directly. Dropping the scope closes it.
pub struct Scope<'d> {
    dispatcher: &'d mut Dispatcher,
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl Scope<'_> {
    /// Wait for every submitted request and tear down the scheduling context.
    ///
    /// Idempotent. Submissions after this fail with
    /// [`DispatchError::UseAfterClose`].
    pub fn close(&mut self) -> &[Outcome] {
        self.dispatcher.close();
        &self.dispatcher.results
    }
}

impl Deref for Scope<'_> {
    type Target = Dispatcher;

    fn deref(&self) -> &Dispatcher {
        self.dispatcher
    }
}

impl DerefMut for Scope<'_> {
    fn deref_mut(&mut self) -> &mut Dispatcher {
        self.dispatcher
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.dispatcher.abandon();
        } else {
            self.dispatcher.close();
        }
    }
}
