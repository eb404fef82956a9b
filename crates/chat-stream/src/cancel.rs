use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct CancelState {
    cancelled: bool,
    requests: u64,
}

/// Marker returned by [`CancelToken::mark`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CancelMark(u64);

/// One-shot, self-healing "stop generating" token.
///
/// Each engine owns its own token. `cancel()` asserts the flag; after the
/// configured grace window it re-arms itself so the next turn does not start
/// cancelled. Cancelling again during the window restarts the window.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<CancelState>>,
    grace: Duration,
}

impl CancelToken {
    pub fn new(grace: Duration) -> Self {
        let (tx, _rx) = watch::channel(CancelState::default());
        Self {
            tx: Arc::new(tx),
            grace,
        }
    }

    /// Requests cancellation.
    ///
    /// Outside a tokio runtime the token cannot schedule its re-arm and stays
    /// cancelled until [`CancelToken::rearm`] is called.
    pub fn cancel(&self) {
        let mut request = 0;
        self.tx.send_modify(|state| {
            state.cancelled = true;
            state.requests += 1;
            request = state.requests;
        });
        debug!(request, grace_ms = self.grace.as_millis() as u64, "cancellation requested");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime to re-arm cancellation token");
            return;
        };
        let tx = Arc::clone(&self.tx);
        let grace = self.grace;
        handle.spawn(async move {
            tokio::time::sleep(grace).await;
            let rearmed = tx.send_if_modified(|state| {
                if state.requests == request && state.cancelled {
                    state.cancelled = false;
                    true
                } else {
                    false
                }
            });
            if rearmed {
                debug!(request, "cancellation token re-armed");
            }
        });
    }

    /// Clears the flag immediately.
    pub fn rearm(&self) {
        self.tx.send_if_modified(|state| std::mem::take(&mut state.cancelled));
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().cancelled
    }

    /// Captures the request count so later calls can ask whether a cancel
    /// happened after this point, even if the token has re-armed since.
    pub fn mark(&self) -> CancelMark {
        CancelMark(self.tx.borrow().requests)
    }

    pub fn requested_since(&self, mark: CancelMark) -> bool {
        self.tx.borrow().requests != mark.0
    }

    /// Resolves while the flag is asserted.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let closed = rx.wait_for(|state| state.cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }

    /// Resolves once `cancel()` has been called after `mark` was taken.
    pub async fn cancelled_since(&self, mark: CancelMark) {
        let mut rx = self.tx.subscribe();
        let closed = rx.wait_for(|state| state.requests != mark.0).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}
