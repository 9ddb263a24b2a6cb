//! # Job Workers
//!
//! Two ways to drain a [`JobQueue`]:
//!
//! - [`ThreadWorker`]: a dedicated OS thread blocking on the queue. For
//!   latency-sensitive background work such as shader compilation.
//! - [`AmortizationWorker`]: no thread. The frame loop calls
//!   [`AmortizationWorker::process`] with a budget, keeping small cleanup
//!   jobs inside the frame without thread overhead.
//!
//! Several workers may share one queue; there is no ordering between them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use kiln_shared::DEFAULT_WORKER_THREAD_NAME;

use crate::error::{CoreError, CoreResult};
use crate::jobs::JobQueue;

/// Common interface of the consumption strategies.
pub trait JobWorker {
    /// The queue this worker drains.
    fn queue(&self) -> &Arc<JobQueue>;

    /// Stops the queue and finishes all work this worker is responsible for.
    /// No job runs on this worker after it returns.
    fn terminate(&mut self);
}

/// Settings for a [`ThreadWorker`]'s thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadWorkerConfig {
    /// OS thread name.
    pub name: String,
    /// Stack size in bytes, platform default when `None`.
    pub stack_size: Option<usize>,
}

impl Default for ThreadWorkerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_WORKER_THREAD_NAME.to_string(),
            stack_size: None,
        }
    }
}

/// Drains a queue on a dedicated thread.
///
/// A job that panics is logged and counted in
/// [`ThreadWorker::jobs_panicked`]; the thread keeps draining the queue.
/// With `panic = "abort"` the process ends instead.
///
/// # Example
///
/// ```rust,ignore
/// let queue = JobQueue::create();
/// let mut worker = ThreadWorker::create(Arc::clone(&queue), ThreadWorkerConfig::default())?;
///
/// queue.push(Job::new(|| compile_shader()));
///
/// worker.terminate(); // runs what is left, then joins
/// ```
pub struct ThreadWorker {
    queue: Arc<JobQueue>,
    thread: Option<JoinHandle<()>>,
    executed: Arc<AtomicU64>,
    panicked: Arc<AtomicU64>,
    name: String,
}

impl ThreadWorker {
    /// Spawns the worker thread.
    ///
    /// # Errors
    ///
    /// [`CoreError::ThreadSpawn`] if the OS refuses to create the thread.
    pub fn create(queue: Arc<JobQueue>, config: ThreadWorkerConfig) -> CoreResult<Self> {
        let mut builder = thread::Builder::new().name(config.name.clone());
        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let executed = Arc::new(AtomicU64::new(0));
        let panicked = Arc::new(AtomicU64::new(0));
        let thread_queue = Arc::clone(&queue);
        let thread_executed = Arc::clone(&executed);
        let thread_panicked = Arc::clone(&panicked);
        let thread_name = config.name.clone();
        let thread = builder
            .spawn(move || Self::run(&thread_queue, &thread_executed, &thread_panicked, &thread_name))
            .map_err(|e| CoreError::ThreadSpawn(e.to_string()))?;

        tracing::debug!(name = %config.name, "thread worker started");

        Ok(Self {
            queue,
            thread: Some(thread),
            executed,
            panicked,
            name: config.name,
        })
    }

    /// Worker thread main loop. Ends when the queue stops and runs dry.
    fn run(queue: &JobQueue, executed: &AtomicU64, panicked: &AtomicU64, name: &str) {
        while let Some(job) = queue.pop(true) {
            if panic::catch_unwind(AssertUnwindSafe(|| job.run())).is_ok() {
                executed.fetch_add(1, Ordering::Relaxed);
            } else {
                panicked.fetch_add(1, Ordering::Relaxed);
                tracing::error!(name, "job panicked on worker thread");
            }
        }
        tracing::debug!(name, "thread worker exiting");
    }

    /// Jobs that ran to completion so far.
    #[must_use]
    pub fn jobs_executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Jobs that panicked so far.
    #[must_use]
    pub fn jobs_panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// False once terminated or if the thread ended on its own.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|thread| !thread.is_finished())
    }
}

impl JobWorker for ThreadWorker {
    fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    fn terminate(&mut self) {
        self.queue.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(name = %self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Drains a bounded number of jobs each time the owner asks.
pub struct AmortizationWorker {
    queue: Arc<JobQueue>,
    executed: u64,
}

impl AmortizationWorker {
    /// Creates a worker over `queue`.
    #[must_use]
    pub fn create(queue: Arc<JobQueue>) -> Self {
        Self { queue, executed: 0 }
    }

    /// Runs at most `job_count` jobs (all queued jobs for `None`) on the
    /// calling thread. Never blocks. Returns how many ran.
    pub fn process(&mut self, job_count: Option<usize>) -> usize {
        let ran = match job_count {
            Some(0) => 0,
            Some(1) => match self.queue.pop(false) {
                Some(job) => {
                    job.run();
                    1
                }
                None => 0,
            },
            _ => {
                let jobs = self.queue.pop_batch(job_count);
                let ran = jobs.len();
                for job in jobs {
                    job.run();
                }
                ran
            }
        };

        if ran > 0 {
            self.executed += ran as u64;
            tracing::trace!(ran, "amortized jobs processed");
        }
        ran
    }

    /// Jobs run so far.
    #[must_use]
    pub const fn jobs_executed(&self) -> u64 {
        self.executed
    }
}

impl JobWorker for AmortizationWorker {
    fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Stops the queue and runs everything still queued.
    fn terminate(&mut self) {
        self.queue.stop();
        self.process(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::Job;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(counter: &Arc<AtomicUsize>) -> Job {
        let counter = Arc::clone(counter);
        Job::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_thread_worker_runs_everything_before_terminate_returns() {
        let queue = JobQueue::create();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = ThreadWorker::create(Arc::clone(&queue), ThreadWorkerConfig::default()).unwrap();

        for _ in 0..100 {
            queue.push(counting_job(&counter));
        }
        worker.terminate();

        assert_eq!(counter.load(Ordering::SeqCst), 100);
        assert_eq!(worker.jobs_executed(), 100);
        assert!(!worker.is_running());
    }

    #[test]
    fn test_thread_worker_survives_panicking_job() {
        let queue = JobQueue::create();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = ThreadWorker::create(Arc::clone(&queue), ThreadWorkerConfig::default()).unwrap();

        queue.push(Job::new(|| panic!("shader failed to compile")));
        for _ in 0..10 {
            queue.push(counting_job(&counter));
        }

        // The worker is still alive and picks up later jobs.
        let (tx, rx) = crossbeam_channel::bounded(1);
        queue.push(Job::new(move || {
            let _ = tx.send(());
        }));
        rx.recv().unwrap();
        assert!(worker.is_running());

        worker.terminate();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(worker.jobs_panicked(), 1);
        assert_eq!(worker.jobs_executed(), 11);
    }

    #[test]
    fn test_thread_worker_terminate_is_idempotent() {
        let queue = JobQueue::create();
        let mut worker = ThreadWorker::create(queue, ThreadWorkerConfig::default()).unwrap();
        worker.terminate();
        worker.terminate();
        assert!(worker.queue().is_stopping());
    }

    #[test]
    fn test_thread_worker_uses_configured_name() {
        let queue = JobQueue::create();
        let (tx, rx) = crossbeam_channel::bounded(1);
        let config = ThreadWorkerConfig { name: "shader-compiler".to_string(), stack_size: Some(256 * 1024) };
        let worker = ThreadWorker::create(Arc::clone(&queue), config).unwrap();

        queue.push(Job::new(move || {
            let _ = tx.send(thread::current().name().map(str::to_string));
        }));
        assert_eq!(rx.recv().unwrap().as_deref(), Some("shader-compiler"));
        assert_eq!(worker.name(), "shader-compiler");
    }

    #[test]
    fn test_amortization_budget() {
        let queue = JobQueue::create();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = AmortizationWorker::create(Arc::clone(&queue));
        for _ in 0..5 {
            queue.push(counting_job(&counter));
        }

        assert_eq!(worker.process(Some(1)), 1);
        assert_eq!(worker.process(Some(0)), 0);
        assert_eq!(worker.process(Some(3)), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(worker.jobs_executed(), 4);
    }

    #[test]
    fn test_amortization_terminate_drains() {
        let queue = JobQueue::create();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut worker = AmortizationWorker::create(Arc::clone(&queue));
        for _ in 0..7 {
            queue.push(counting_job(&counter));
        }

        worker.terminate();
        assert_eq!(counter.load(Ordering::SeqCst), 7);
        assert!(queue.is_empty());
        assert_eq!(queue.push(counting_job(&counter)), crate::jobs::INVALID_JOB_ID);
    }
}
