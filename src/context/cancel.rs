//! Completion signalling for in-flight requests.
//!
//! Each request gets a fresh [`Completion`]; the context signals it when the
//! response is finalized. [`Cancellation`] is the read-only handle units pass to
//! background work that should stop once the request is over. The handle owns
//! its own reference to the completion, so it stays valid after the context is
//! released back to the pool.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::Error;

#[derive(Debug)]
struct Outcome {
    error: Option<Arc<Error>>,
    trace: Option<String>,
}

#[derive(Debug)]
pub(crate) struct Completion {
    done: watch::Sender<bool>,
    deadline: Mutex<Option<Instant>>,
    outcome: OnceLock<Outcome>,
}

impl Completion {
    pub(crate) fn new(deadline: Option<Instant>) -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            done,
            deadline: Mutex::new(deadline),
            outcome: OnceLock::new(),
        })
    }

    pub(crate) fn set_deadline(&self, deadline: Option<Instant>) {
        *self.deadline.lock() = deadline;
    }

    /// Records the final outcome and wakes every waiter. Later calls are ignored.
    pub(crate) fn complete(&self, error: Option<Arc<Error>>, trace: Option<String>) {
        if self.outcome.set(Outcome { error, trace }).is_ok() {
            self.done.send_replace(true);
        }
    }

    /// Wakes waiters of a request that was dropped without being finalized.
    pub(crate) fn abandon(&self) {
        if self.outcome.get().is_none() {
            self.done.send_replace(true);
        }
    }
}

/// A handle that reports when its request has finished.
///
/// # Examples
///
/// ```
/// use waypoint::{handler, Context, Router};
/// use waypoint::http::{Recorder, Request};
///
/// let mut router = Router::new();
/// let (tx, rx) = std::sync::mpsc::channel();
/// router.get("/", [handler(move |ctx: &mut Context| {
///     tx.send(ctx.cancellation()).unwrap();
///     ctx.set_body("ok");
///     Ok(())
/// })]);
///
/// router.serve(Request::new("GET", "/"), Recorder::new());
/// let token = rx.recv().unwrap();
/// assert!(token.is_done());
/// assert!(token.err().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct Cancellation {
    completion: Arc<Completion>,
}

impl Cancellation {
    pub(crate) fn new(completion: Arc<Completion>) -> Self {
        Self { completion }
    }

    /// Returns the request deadline, if one was set.
    pub fn deadline(&self) -> Option<Instant> {
        *self.completion.deadline.lock()
    }

    /// Returns `true` once the request has been finalized or abandoned.
    pub fn is_done(&self) -> bool {
        *self.completion.done.borrow()
    }

    /// Waits until the request has been finalized or abandoned.
    pub async fn done(&self) {
        let mut done = self.completion.done.subscribe();
        // The sender lives in `self.completion`, so the channel cannot close here.
        let _ = done.wait_for(|done| *done).await;
    }

    /// Returns the error the request finished with, if any.
    ///
    /// `None` until the request is done.
    pub fn err(&self) -> Option<Arc<Error>> {
        self.completion
            .outcome
            .get()
            .and_then(|outcome| outcome.error.clone())
    }

    /// Returns the diagnostic trace captured with the final error, if any.
    pub fn error_trace(&self) -> Option<&str> {
        self.completion
            .outcome
            .get()
            .and_then(|outcome| outcome.trace.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn complete_records_outcome_once() {
        let completion = Completion::new(None);
        let token = Cancellation::new(Arc::clone(&completion));
        assert!(!token.is_done());
        assert!(token.err().is_none());

        completion.complete(Some(Arc::new(Error::DeadlineExceeded)), Some("trace".into()));
        completion.complete(None, None);

        assert!(token.is_done());
        assert!(matches!(token.err().as_deref(), Some(Error::DeadlineExceeded)));
        assert_eq!(token.error_trace(), Some("trace"));
    }

    #[test]
    fn abandon_wakes_without_outcome() {
        let completion = Completion::new(None);
        let token = Cancellation::new(Arc::clone(&completion));
        completion.abandon();
        assert!(token.is_done());
        assert!(token.err().is_none());
    }

    #[test]
    fn deadline_follows_updates() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let completion = Completion::new(None);
        let token = Cancellation::new(Arc::clone(&completion));
        assert_eq!(token.deadline(), None);
        completion.set_deadline(Some(deadline));
        assert_eq!(token.deadline(), Some(deadline));
    }

    #[tokio::test]
    async fn done_resolves_after_completion() {
        let completion = Completion::new(None);
        let token = Cancellation::new(Arc::clone(&completion));

        let waiter = tokio::spawn({
            let token = token.clone();
            async move { token.done().await }
        });
        tokio::task::yield_now().await;
        completion.complete(None, None);

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn done_is_immediate_when_already_complete() {
        let completion = Completion::new(None);
        completion.complete(None, None);
        Cancellation::new(completion).done().await;
    }
}
