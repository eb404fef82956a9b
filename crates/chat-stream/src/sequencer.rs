use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::Notify;

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<Job>,
    draining: bool,
}

#[derive(Default)]
struct SequencerInner {
    state: Mutex<QueueState>,
    idle: Notify,
}

impl SequencerInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO of asynchronous apply jobs with a single-flight drain loop.
///
/// Job N runs to completion, including any awaited reveal slices, before job
/// N+1 is started. Pushing while a drain is running only enqueues.
#[derive(Clone, Default)]
pub struct Sequencer {
    inner: Arc<SequencerInner>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `job`, starting a drain task if none is running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn push<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let start_drain = {
            let mut state = self.inner.lock();
            state
                .jobs
                .push_back(Box::new(move || -> BoxFuture<'static, ()> { Box::pin(job()) }));
            !std::mem::replace(&mut state.draining, true)
        };
        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }

    /// Number of jobs waiting to start.
    pub fn pending(&self) -> usize {
        self.inner.lock().jobs.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        !state.draining && state.jobs.is_empty()
    }

    /// Waits until every job pushed so far has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

/// Resets the drain flag if a job panics so waiters are not stranded.
struct DrainGuard {
    inner: Arc<SequencerInner>,
    finished: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.inner.lock();
            state.jobs.clear();
            state.draining = false;
        }
        self.inner.idle.notify_waiters();
    }
}

async fn drain(inner: Arc<SequencerInner>) {
    let mut guard = DrainGuard {
        inner,
        finished: false,
    };
    loop {
        let job = {
            let mut state = guard.inner.lock();
            match state.jobs.pop_front() {
                Some(job) => job,
                None => {
                    state.draining = false;
                    break;
                }
            }
        };
        job().await;
    }
    guard.finished = true;
}
