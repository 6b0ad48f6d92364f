//! Bridge from engine requests to futures.
//!
//! Every client operation goes through [`settle`]: the request's success and
//! error handlers feed a single oneshot channel, so the future completes
//! exactly once with whichever outcome the engine delivers.

use crate::error::{CoreError, CoreResult};
use futures_channel::oneshot;
use parking_lot::Mutex;
use shelf_engine::{EngineResult, Request};
use std::sync::Arc;

/// Waits for `request` to complete.
///
/// Success resolves with the request's result and failure with its error as
/// [`CoreError::Transaction`]. A request abandoned by the engine resolves
/// with [`CoreError::Unavailable`].
pub async fn settle<T: Send + 'static>(request: Request<T>) -> CoreResult<T> {
    match outcome(request).await {
        Some(result) => result.map_err(CoreError::Transaction),
        None => Err(CoreError::Unavailable),
    }
}

/// Waits for `request`, yielding `None` if it was abandoned.
pub(crate) async fn outcome<T: Send + 'static>(request: Request<T>) -> Option<EngineResult<T>> {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));

    let on_success = Arc::clone(&tx);
    request.on_success(move |value| {
        if let Some(tx) = on_success.lock().take() {
            let _ = tx.send(Ok(value));
        }
    });
    request.on_error(move |err| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(Err(err));
        }
    });
    // Only the responder may keep the handlers alive from here on
    drop(request);

    rx.await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_engine::EngineError;

    #[tokio::test]
    async fn ready_success() {
        assert_eq!(settle(Request::ready(Ok(5_u32))).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn ready_failure() {
        let err = settle(Request::<u32>::ready(Err(EngineError::ReadOnly)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Transaction(EngineError::ReadOnly)));
    }

    #[tokio::test]
    async fn completed_later_from_another_thread() {
        let (request, responder) = Request::new();
        let worker = std::thread::spawn(move || responder.complete(Ok("late")));
        assert_eq!(settle(request).await.unwrap(), "late");
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn abandoned_request_is_unavailable() {
        let (request, responder) = Request::<u32>::new();
        drop(responder);
        assert!(matches!(settle(request).await, Err(CoreError::Unavailable)));
    }
}
