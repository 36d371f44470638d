//! Fixed-size worker pool for overlap detection.
//!
//! Workers are plain threads draining a bounded `tokio::sync::mpsc` queue.
//! Each task carries its own `oneshot` sender for the result, so workers hold
//! no per-caller state. When the queue is full, submission waits up to the
//! configured timeout, retries a bounded number of times, and then fails with
//! `FramedexError::ResourceExhausted`.

use crate::compute::temporal::{Interval, OverlapWindow, find_overlaps};
use crate::error::{FramedexError, Result};
use framedex_types::detection::Detection;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot};

pub type Windows = Vec<OverlapWindow<Arc<Detection>>>;

const SUBMIT_POLL: Duration = Duration::from_millis(1);

/// Overlap detection for one `(video_id, object_name)` group.
#[derive(Debug, Clone)]
pub struct OverlapJob {
    pub video_id: String,
    pub object_name: String,
    pub instances: Vec<Interval<Arc<Detection>>>,
    pub count: usize,
}

impl OverlapJob {
    pub fn run(&self) -> Result<Windows> {
        find_overlaps(&self.instances, self.count)
    }
}

struct Task {
    job: OverlapJob,
    respond: oneshot::Sender<Result<Windows>>,
}

/// Pending result of a submitted job.
pub type JobHandle = oneshot::Receiver<Result<Windows>>;

pub struct OverlapPool {
    tx: Option<mpsc::Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
    submit_timeout: Duration,
    submit_retries: u32,
}

impl OverlapPool {
    /// Start `threads` workers behind a queue of `queue_depth` tasks.
    pub fn new(
        threads: usize,
        queue_depth: usize,
        submit_timeout: Duration,
        submit_retries: u32,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>(queue_depth.max(1));
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(threads);
        for idx in 0..threads {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("framedex-overlap-{}", idx))
                .spawn(move || worker_loop(idx, rx))?;
            workers.push(handle);
        }

        log::info!(
            "Overlap pool started with {} workers, queue depth {}",
            threads,
            queue_depth
        );

        Ok(Self {
            tx: Some(tx),
            workers,
            submit_timeout,
            submit_retries,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn sender(&self) -> Result<&mpsc::Sender<Task>> {
        self.tx
            .as_ref()
            .ok_or_else(|| FramedexError::Internal("overlap pool already shut down".into()))
    }

    fn exhausted(&self) -> FramedexError {
        FramedexError::ResourceExhausted(format!(
            "overlap queue full after {} attempts of {:?}",
            self.submit_retries + 1,
            self.submit_timeout
        ))
    }

    /// Queue a job from synchronous code.
    ///
    /// Sleeps while the queue is full, so async tasks should use
    /// [`submit`](Self::submit).
    pub fn submit_blocking(&self, job: OverlapJob) -> Result<JobHandle> {
        let tx = self.sender()?;
        let (respond, handle) = oneshot::channel();
        let mut task = Task { job, respond };

        for attempt in 0..=self.submit_retries {
            let deadline = Instant::now() + self.submit_timeout;
            loop {
                match tx.try_send(task) {
                    Ok(()) => return Ok(handle),
                    Err(TrySendError::Closed(_)) => {
                        return Err(FramedexError::Internal("overlap workers are gone".into()));
                    }
                    Err(TrySendError::Full(back)) => {
                        task = back;
                        if Instant::now() >= deadline {
                            break;
                        }
                        std::thread::sleep(SUBMIT_POLL);
                    }
                }
            }
            log::warn!(
                "Overlap queue full, attempt {} of {}",
                attempt + 1,
                self.submit_retries + 1
            );
        }

        Err(self.exhausted())
    }

    /// Queue a job from async code.
    pub async fn submit(&self, job: OverlapJob) -> Result<JobHandle> {
        let tx = self.sender()?;
        let (respond, handle) = oneshot::channel();
        let mut task = Task { job, respond };

        for attempt in 0..=self.submit_retries {
            match tx.send_timeout(task, self.submit_timeout).await {
                Ok(()) => return Ok(handle),
                Err(SendTimeoutError::Closed(_)) => {
                    return Err(FramedexError::Internal("overlap workers are gone".into()));
                }
                Err(SendTimeoutError::Timeout(back)) => {
                    task = back;
                    log::warn!(
                        "Overlap queue full, attempt {} of {}",
                        attempt + 1,
                        self.submit_retries + 1
                    );
                }
            }
        }

        Err(self.exhausted())
    }

    /// Run every job on the pool and wait for all results, in job order.
    ///
    /// Called from inside a tokio runtime, where blocking on the workers is
    /// not allowed, the jobs run on the calling thread instead. Async callers
    /// that want the pool use [`submit`](Self::submit).
    pub fn run_all(&self, jobs: Vec<OverlapJob>) -> Result<Vec<Windows>> {
        if tokio::runtime::Handle::try_current().is_ok() {
            log::debug!("Running {} overlap jobs inline on a runtime thread", jobs.len());
            return jobs.iter().map(OverlapJob::run).collect();
        }

        let handles = jobs
            .into_iter()
            .map(|job| self.submit_blocking(job))
            .collect::<Result<Vec<_>>>()?;

        handles
            .into_iter()
            .map(|handle| {
                handle.blocking_recv().map_err(|_| {
                    FramedexError::Internal("overlap worker dropped a task".into())
                })?
            })
            .collect()
    }

    /// Close the queue and wait for workers to finish queued tasks.
    pub fn shutdown(&mut self) {
        if self.tx.take().is_none() {
            return;
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("Overlap worker panicked");
            }
        }
        log::info!("Overlap pool stopped");
    }
}

impl Drop for OverlapPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(idx: usize, rx: Arc<Mutex<mpsc::Receiver<Task>>>) {
    loop {
        // Lock only long enough to take one task.
        let task = rx.lock().blocking_recv();
        let Some(Task { job, respond }) = task else {
            break;
        };

        let result = job.run();
        if let Err(e) = &result {
            log::error!(
                "Overlap job for '{}' in video '{}' failed: {}",
                job.object_name,
                job.video_id,
                e
            );
        }
        // Receiver gone means the caller gave up waiting.
        let _ = respond.send(result);
    }
    log::debug!("Overlap worker {} exiting", idx);
}
