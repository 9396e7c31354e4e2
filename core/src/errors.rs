use std::io;

use fanout_types::Method;
use thiserror::Error;

use crate::DispatcherState;

/// Faults that escape a dispatcher.
///
/// Per-request transport failures never show up here; they are recorded as
/// [`fanout_types::Outcome::Failure`] entries in the results.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A request was submitted while no scope was open.
    #[error("cannot submit {method} {url}: dispatcher scope is {state}")]
    UseAfterClose {
        method: Method,
        url: String,
        state: DispatcherState,
    },

    /// `enter` was called while a scope is still open.
    #[error("a dispatcher scope is already open")]
    AlreadyOpen,

    /// The scheduling context could not be built.
    #[error("failed to create scheduling context: {0}")]
    SchedulingContext(#[source] io::Error),
}

impl DispatchError {
    #[must_use]
    pub const fn is_use_after_close(&self) -> bool {
        matches!(self, DispatchError::UseAfterClose { .. })
    }
}
