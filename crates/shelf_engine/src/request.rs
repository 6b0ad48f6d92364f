//! Callback-style requests.
//!
//! Every engine operation hands back a [`Request`]. The outcome is delivered
//! exactly once, to whichever of `on_success` / `on_error` matches it, no
//! matter whether the handler is attached before or after completion.
//! Handlers always run outside the request's lock.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

type SuccessHandler<T> = Box<dyn FnOnce(T) + Send>;
type ErrorHandler = Box<dyn FnOnce(EngineError) + Send>;

struct Slot<T> {
    outcome: Option<EngineResult<T>>,
    on_success: Option<SuccessHandler<T>>,
    on_error: Option<ErrorHandler>,
    settled: bool,
}

enum Delivery<T> {
    Success(SuccessHandler<T>, T),
    Error(ErrorHandler, EngineError),
}

impl<T> Slot<T> {
    fn take_delivery(&mut self) -> Option<Delivery<T>> {
        let delivery = match self.outcome.take()? {
            Ok(value) => match self.on_success.take() {
                Some(handler) => Delivery::Success(handler, value),
                None => {
                    self.outcome = Some(Ok(value));
                    return None;
                }
            },
            Err(err) => match self.on_error.take() {
                Some(handler) => Delivery::Error(handler, err),
                None => {
                    self.outcome = Some(Err(err));
                    return None;
                }
            },
        };
        self.settled = true;
        self.on_success = None;
        self.on_error = None;
        Some(delivery)
    }
}

/// A pending or completed engine operation.
pub struct Request<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

/// The completing side of a [`Request`].
///
/// Dropping a responder without completing it abandons the request: no
/// handler ever runs, and the handlers are released once the request is
/// dropped too.
pub struct Responder<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Request<T> {
    /// Creates a pending request and its responder.
    pub fn new() -> (Self, Responder<T>) {
        let slot = Arc::new(Mutex::new(Slot {
            outcome: None,
            on_success: None,
            on_error: None,
            settled: false,
        }));
        (
            Self {
                slot: Arc::clone(&slot),
            },
            Responder { slot },
        )
    }

    /// Creates a request that has already completed.
    pub fn ready(outcome: EngineResult<T>) -> Self {
        let (request, responder) = Self::new();
        responder.complete(outcome);
        request
    }

    /// Sets the handler for a successful outcome.
    pub fn on_success(&self, handler: impl FnOnce(T) + Send + 'static) {
        let delivery = {
            let mut slot = self.slot.lock();
            if slot.settled {
                return;
            }
            slot.on_success = Some(Box::new(handler));
            slot.take_delivery()
        };
        deliver(delivery);
    }

    /// Sets the handler for a failed outcome.
    pub fn on_error(&self, handler: impl FnOnce(EngineError) + Send + 'static) {
        let delivery = {
            let mut slot = self.slot.lock();
            if slot.settled {
                return;
            }
            slot.on_error = Some(Box::new(handler));
            slot.take_delivery()
        };
        deliver(delivery);
    }

    /// Returns `true` once an outcome is available or has been delivered.
    pub fn is_done(&self) -> bool {
        let slot = self.slot.lock();
        slot.settled || slot.outcome.is_some()
    }

    /// Takes the outcome directly, if it is available and no handler has
    /// consumed it.
    pub fn into_result(self) -> Option<EngineResult<T>> {
        let mut slot = self.slot.lock();
        let outcome = slot.outcome.take()?;
        slot.settled = true;
        Some(outcome)
    }
}

impl<T> Responder<T> {
    /// Completes the request.
    pub fn complete(self, outcome: EngineResult<T>) {
        let delivery = {
            let mut slot = self.slot.lock();
            if slot.settled || slot.outcome.is_some() {
                return;
            }
            slot.outcome = Some(outcome);
            slot.take_delivery()
        };
        deliver(delivery);
    }
}

fn deliver<T>(delivery: Option<Delivery<T>>) {
    match delivery {
        Some(Delivery::Success(handler, value)) => handler(value),
        Some(Delivery::Error(handler, err)) => handler(err),
        None => {}
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("done", &self.is_done())
            .finish()
    }
}
