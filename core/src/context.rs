//! The scheduling context owned by an open dispatcher scope.

use std::future::Future;
use std::io;
use std::time::Duration;

use fanout_config::DispatcherConfig;
use tokio::runtime::{Builder, Handle, Runtime};

/// How long a normal teardown waits for worker threads to wind down.
/// Every task has already finished by then, so this only covers thread exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A current-thread tokio runtime: the thread that calls [`Self::block_on`]
/// is the single coordinating flow, and blocking calls go to the runtime's
/// blocking pool.
///
/// Torn down at most once. Dropping a live context abandons it without
/// waiting for in-flight workers.
#[derive(Debug)]
pub(crate) struct SchedulingContext {
    runtime: Option<Runtime>,
}

impl SchedulingContext {
    pub(crate) fn new(config: &DispatcherConfig) -> io::Result<Self> {
        if Handle::try_current().is_ok() {
            return Err(io::Error::other(
                "a dispatcher scope cannot be opened from inside a tokio runtime; \
                 use fanout_core::execute from async code",
            ));
        }

        let runtime = Builder::new_current_thread()
            .max_blocking_threads(config.max_blocking_threads())
            .thread_name(config.thread_name())
            .thread_keep_alive(config.thread_keep_alive())
            .build()?;

        tracing::debug!(
            max_blocking_threads = config.max_blocking_threads(),
            thread_name = config.thread_name(),
            "Scheduling context created"
        );
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    pub(crate) fn is_live(&self) -> bool {
        self.runtime.is_some()
    }

    pub(crate) fn handle(&self) -> Option<&Handle> {
        self.runtime.as_ref().map(Runtime::handle)
    }

    /// Drive `future` to completion on the calling thread.
    pub(crate) fn block_on<F: Future>(&self, future: F) -> Option<F::Output> {
        self.runtime.as_ref().map(|runtime| runtime.block_on(future))
    }

    /// Release the runtime. Returns `false` if it was already released.
    pub(crate) fn shutdown(&mut self) -> bool {
        let Some(runtime) = self.runtime.take() else {
            return false;
        };
        runtime.shutdown_timeout(SHUTDOWN_GRACE);
        tracing::debug!("Scheduling context torn down");
        true
    }

    /// Release the runtime without waiting on workers still inside a call.
    pub(crate) fn abandon(&mut self) -> bool {
        let Some(runtime) = self.runtime.take() else {
            return false;
        };
        runtime.shutdown_background();
        tracing::debug!("Scheduling context abandoned");
        true
    }
}

impl Drop for SchedulingContext {
    fn drop(&mut self) {
        self.abandon();
    }
}
