//! Per-instance log sink.

use std::fmt;

use tracing::dispatcher::{self, Dispatch};

/// Where a decorator sends its `tracing` events.
///
/// Each decorator owns its logger; nothing here touches the global default
/// subscriber. The default is [`Logger::discard`].
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// Drops every event.
    pub fn discard() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    /// Captures the subscriber that is the default for the calling thread.
    pub fn current() -> Self {
        Self {
            dispatch: dispatcher::get_default(Dispatch::clone),
        }
    }

    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Runs `f` with this logger's subscriber as the default.
    pub(crate) fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::discard()
    }
}

impl From<Dispatch> for Logger {
    fn from(dispatch: Dispatch) -> Self {
        Self::new(dispatch)
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}
