//! FIFO request queue.
//!
//! Serializes all synthesis jobs into one logical executor: a single drain
//! task processes jobs strictly in submission order, one at a time. The
//! supervisor may run other process types (playback, listing) concurrently;
//! synthesis itself only ever flows through here.

use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::{OratorError, Result};

type JobFuture = Pin<Box<dyn Future<Output = Result<PathBuf>> + Send>>;
type JobFn = Box<dyn FnOnce() -> JobFuture + Send>;

/// One queued unit of work plus the continuation back to its submitter.
struct QueuedJob {
    run: JobFn,
    done: oneshot::Sender<Result<PathBuf>>,
}

/// Snapshot of the queue for status reporting.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub draining: bool,
}

/// Awaitable handle returned by [`RequestQueue::submit`].
pub struct JobHandle {
    rx: oneshot::Receiver<Result<PathBuf>>,
}

impl JobHandle {
    /// Resolves with the job's artifact path or its error. A queue clear
    /// before the job started resolves to `QueueCancelled`.
    pub async fn wait(self) -> Result<PathBuf> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(OratorError::QueueCancelled),
        }
    }
}

#[derive(Clone)]
pub struct RequestQueue {
    state: Arc<Mutex<QueueState>>,
}

#[derive(Default)]
struct QueueState {
    jobs: VecDeque<QueuedJob>,
    // Reentrancy guard: true while a drain task is alive. Flag and deque
    // share one lock so a second drain task can never be spawned.
    draining: bool,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// Append a job and make sure a drain task is running. The job is a
    /// thunk so no work happens until the queue reaches it.
    pub async fn submit<F, Fut>(&self, job: F) -> JobHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<PathBuf>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let run: JobFn = Box::new(move || {
            let fut: JobFuture = Box::pin(job());
            fut
        });

        let mut state = self.state.lock().await;
        state.jobs.push_back(QueuedJob { run, done: tx });
        debug!(target: "queue", pending = state.jobs.len(), "job submitted");

        if !state.draining {
            state.draining = true;
            tokio::spawn(drain(Arc::clone(&self.state)));
        }

        JobHandle { rx }
    }

    pub async fn status(&self) -> QueueStatus {
        let state = self.state.lock().await;
        QueueStatus {
            pending: state.jobs.len(),
            draining: state.draining,
        }
    }

    /// Fail every job that has not started with `QueueCancelled` and return
    /// how many were dropped. A job already mid-execution is unaffected and
    /// the queue remains usable afterwards.
    pub async fn clear(&self) -> usize {
        let dropped: Vec<QueuedJob> = {
            let mut state = self.state.lock().await;
            state.jobs.drain(..).collect()
        };
        let cancelled = dropped.len();
        for job in dropped {
            let _ = job.done.send(Err(OratorError::QueueCancelled));
        }
        if cancelled > 0 {
            info!(target: "queue", cancelled, "cleared pending jobs");
        }
        cancelled
    }
}

/// Single drain loop: pops the head until the deque is empty, then clears
/// the guard and exits. A failing job is reported to its own continuation
/// and never aborts the loop.
async fn drain(state: Arc<Mutex<QueueState>>) {
    loop {
        let job = {
            let mut st = state.lock().await;
            match st.jobs.pop_front() {
                Some(job) => job,
                None => {
                    st.draining = false;
                    return;
                }
            }
        };

        let result = (job.run)().await;
        if let Err(err) = &result {
            warn!(target: "queue", error = %err, "job failed; continuing with next");
        }
        // Submitter may have dropped its handle; nothing to deliver then.
        let _ = job.done.send(result);
    }
}
