//! In-memory job queue with bounded concurrency.
//!
//! `enqueue` never blocks: it pushes onto a FIFO list and dispatches as many
//! jobs as the concurrency bound allows. Each job runs on its own tokio task;
//! completion (success, error, or panic) frees a slot and triggers the next
//! dispatch. Nothing is persisted, so pending jobs die with the process.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::error::{Error, JobError};

/// Processes one job. Returning `Err` routes the job to the error hook.
#[async_trait]
pub trait JobWorker<J>: Send + Sync {
    async fn handle(&self, job: J) -> Result<(), Error>;
}

/// Called exactly once for every job whose worker failed or panicked.
/// A panicking hook is contained and does not stall the queue.
pub type ErrorHook<J> = Arc<dyn Fn(&Error, &J) + Send + Sync>;

struct State<J> {
    pending: VecDeque<J>,
    in_flight: usize,
    worker: Option<Arc<dyn JobWorker<J>>>,
    on_error: ErrorHook<J>,
}

struct Inner<J> {
    concurrency: usize,
    state: Mutex<State<J>>,
    idle: Notify,
}

/// Cloneable handle to a shared queue.
pub struct JobQueue<J> {
    inner: Arc<Inner<J>>,
}

impl<J> Clone for JobQueue<J> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<J: Clone + Send + 'static> JobQueue<J> {
    /// Create a queue that runs at most `concurrency` jobs at once (min 1).
    pub fn new(concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                concurrency: concurrency.max(1),
                state: Mutex::new(State {
                    pending: VecDeque::new(),
                    in_flight: 0,
                    worker: None,
                    on_error: Arc::new(|e: &Error, _job: &J| {
                        error!(error = %e, "Job failed");
                    }),
                }),
                idle: Notify::new(),
            }),
        }
    }

    /// Replace the error hook.
    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(&Error, &J) + Send + Sync + 'static,
    {
        self.lock().on_error = Arc::new(hook);
    }

    /// Register the worker and drain anything enqueued so far.
    pub fn start(&self, worker: Arc<dyn JobWorker<J>>) {
        {
            let mut state = self.lock();
            if state.worker.is_some() {
                warn!("Job queue already started, ignoring second worker");
                return;
            }
            state.worker = Some(worker);
        }
        debug!(concurrency = self.inner.concurrency, "Job queue started");
        self.dispatch();
    }

    /// Push a job. Never blocks.
    pub fn enqueue(&self, job: J) {
        self.lock().pending.push_back(job);
        self.dispatch();
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.in_flight == 0 && state.pending.is_empty()
    }

    /// Wait until nothing is pending or running.
    ///
    /// Never resolves while jobs are pending on a queue that was not started.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<J>> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn dispatch(&self) {
        loop {
            let (job, worker, on_error) = {
                let mut state = self.lock();
                if state.in_flight >= self.inner.concurrency {
                    return;
                }
                let Some(worker) = state.worker.clone() else {
                    return;
                };
                let Some(job) = state.pending.pop_front() else {
                    return;
                };
                state.in_flight += 1;
                (job, worker, Arc::clone(&state.on_error))
            };

            let queue = self.clone();
            tokio::spawn(async move {
                let failed_job = job.clone();
                // Nested spawn so a panicking worker surfaces as a JoinError.
                let result = tokio::spawn(async move { worker.handle(job).await }).await;
                let failure = match result {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(join_err) => Some(Error::Job(JobError::Panicked(join_err.to_string()))),
                };
                if let Some(e) = failure {
                    if catch_unwind(AssertUnwindSafe(|| on_error(&e, &failed_job))).is_err() {
                        error!(error = %e, "Error hook panicked");
                    }
                }
                queue.finish();
            });
        }
    }

    fn finish(&self) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.dispatch();
        if self.is_idle() {
            self.inner.idle.notify_waiters();
        }
    }
}
