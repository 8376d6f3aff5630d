use std::future::{Future, pending};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// The reason a [`Context`] is done.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Done {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Context carries a cancellation signal and an optional deadline across
/// API boundaries.
///
/// Derived contexts inherit every cancellation signal and the deadline of
/// their parent, so canceling a parent cancels all of its children, while
/// a child can only ever shorten the deadline.
///
/// The same context is used to shut the long-running tasks down, once it is
/// done, nothing started with it should keep running.
#[derive(Clone, Debug, Default)]
pub struct Context {
    cancels: Vec<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

/// Cancels the [`Context`] created alongside it, and all contexts derived
/// from that one.
///
/// Dropping the handle without calling `cancel` does not cancel anything.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Context {
    /// An empty context, it is never canceled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let (tx, rx) = watch::channel(false);

        let mut cx = self.clone();
        cx.cancels.push(rx);

        (cx, CancelHandle { tx: Arc::new(tx) })
    }

    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Context {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };

        Context {
            cancels: self.cancels.clone(),
            deadline: Some(deadline),
        }
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `Some` if the context is already done, cancellation wins over
    /// an expired deadline.
    pub fn err(&self) -> Option<Done> {
        if self.cancels.iter().any(|rx| *rx.borrow()) {
            return Some(Done::Canceled);
        }

        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(Done::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is canceled or its deadline expired.
    pub async fn done(&self) -> Done {
        let canceled = async {
            let waits = self
                .cancels
                .iter()
                .cloned()
                .map(|mut rx| {
                    Box::pin(async move {
                        // the sender is gone without canceling, so it never will
                        if rx.wait_for(|canceled| *canceled).await.is_err() {
                            pending::<()>().await;
                        }
                    })
                })
                .collect::<Vec<_>>();

            if waits.is_empty() {
                pending::<()>().await;
            } else {
                futures::future::select_all(waits).await;
            }
        };

        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = canceled => Done::Canceled,
            _ = expired => Done::DeadlineExceeded,
        }
    }

    /// Drives `fut` to completion unless the context is done first, in which
    /// case `fut` is dropped, and whatever it was doing is aborted.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Done> {
        if let Some(done) = self.err() {
            return Err(done);
        }

        tokio::select! {
            biased;

            done = self.done() => Err(done),
            output = fut => Ok(output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn background_never_done() {
        let cx = Context::background();
        assert_eq!(cx.err(), None);
        assert_eq!(cx.deadline(), None);

        let result = cx.run(async { 1 }).await;
        assert_eq!(result, Ok(1));
    }

    #[tokio::test]
    async fn cancel_propagates_to_children() {
        let (parent, handle) = Context::background().with_cancel();
        let child = parent.with_timeout(Duration::from_secs(60));
        let (grandchild, _grandchild_handle) = child.with_cancel();

        assert_eq!(grandchild.err(), None);
        handle.cancel();

        assert_eq!(parent.err(), Some(Done::Canceled));
        assert_eq!(child.err(), Some(Done::Canceled));
        assert_eq!(grandchild.done().await, Done::Canceled);
    }

    #[tokio::test]
    async fn cancel_child_leaves_parent() {
        let (parent, _handle) = Context::background().with_cancel();
        let (child, child_handle) = parent.with_cancel();

        child_handle.cancel();
        assert_eq!(child.err(), Some(Done::Canceled));
        assert_eq!(parent.err(), None);
    }

    #[tokio::test]
    async fn dropped_handle_does_not_cancel() {
        let (cx, handle) = Context::background().with_cancel();
        drop(handle);

        assert_eq!(cx.err(), None);
        let result = cx
            .with_timeout(Duration::from_millis(50))
            .run(pending::<()>())
            .await;
        assert_eq!(result, Err(Done::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_only_shrinks() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(10));
        assert_eq!(child.deadline(), parent.deadline());

        let shorter = parent.with_timeout(Duration::from_millis(100));
        assert!(shorter.deadline() < parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn run_aborts_on_deadline() {
        let cx = Context::background().with_timeout(Duration::from_secs(1));

        let result = cx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "finished"
            })
            .await;

        assert_eq!(result, Err(Done::DeadlineExceeded));
        assert_eq!(cx.err(), Some(Done::DeadlineExceeded));
    }

    #[tokio::test]
    async fn run_on_canceled_context_never_polls() {
        let (cx, handle) = Context::background().with_cancel();
        handle.cancel();

        let mut polled = false;
        let result = cx
            .run(async {
                polled = true;
            })
            .await;

        assert_eq!(result, Err(Done::Canceled));
        assert!(!polled);
    }

    #[tokio::test]
    async fn cancel_while_running() {
        let (cx, handle) = Context::background().with_cancel();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.cancel();
        });

        let result = cx.run(pending::<()>()).await;
        assert_eq!(result, Err(Done::Canceled));
    }
}
