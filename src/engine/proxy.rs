//! engine::proxy
//!
//! Deferred reads.
//!
//! A [`ReadProxy`] wraps a single-shot read. Nothing happens until the first
//! call to [`ReadProxy::value`]; the result is then memoized for the life
//! of the proxy. Dropping an unevaluated proxy performs no I/O.
//!
//! The proxy is not `Sync`: evaluating it from several threads needs
//! external synchronization.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::error::ButlerError;

type Reader<'a> = Box<dyn FnOnce() -> Result<Arc<Value>, ButlerError> + 'a>;

enum State<'a> {
    Pending(Reader<'a>),
    Evaluating,
    Ready(Arc<Value>),
    Failed(String),
}

/// A lazily evaluated dataset read.
pub struct ReadProxy<'a> {
    state: RefCell<State<'a>>,
}

impl<'a> ReadProxy<'a> {
    /// Defer `read` until first access.
    pub fn new(read: impl FnOnce() -> Result<Arc<Value>, ButlerError> + 'a) -> Self {
        Self {
            state: RefCell::new(State::Pending(Box::new(read))),
        }
    }

    /// A proxy whose value is already known.
    pub fn ready(value: Arc<Value>) -> Self {
        Self {
            state: RefCell::new(State::Ready(value)),
        }
    }

    /// True once the read has run, successfully or not.
    pub fn is_evaluated(&self) -> bool {
        matches!(&*self.state.borrow(), State::Ready(_) | State::Failed(_))
    }

    /// The value, reading it on first call.
    ///
    /// # Errors
    ///
    /// The read's own error on the first call; [`ButlerError::DeferredRead`]
    /// on later calls after a failure.
    pub fn value(&self) -> Result<Arc<Value>, ButlerError> {
        let pending = {
            let mut state = self.state.borrow_mut();
            match &*state {
                State::Ready(value) => return Ok(Arc::clone(value)),
                State::Failed(message) => return Err(ButlerError::DeferredRead(message.clone())),
                State::Evaluating => {
                    return Err(ButlerError::Invariant("read proxy re-entered".into()))
                }
                State::Pending(_) => {}
            }
            std::mem::replace(&mut *state, State::Evaluating)
        };

        let State::Pending(read) = pending else {
            return Err(ButlerError::Invariant("read proxy state lost".into()));
        };
        let result = read();
        *self.state.borrow_mut() = match &result {
            Ok(value) => State::Ready(Arc::clone(value)),
            Err(err) => State::Failed(err.to_string()),
        };
        result
    }
}

impl fmt::Debug for ReadProxy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.borrow() {
            State::Pending(_) => "pending",
            State::Evaluating => "evaluating",
            State::Ready(_) => "ready",
            State::Failed(_) => "failed",
        };
        f.debug_struct("ReadProxy").field("state", &state).finish()
    }
}
