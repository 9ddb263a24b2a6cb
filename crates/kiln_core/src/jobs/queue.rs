//! # Job Queue
//!
//! Thread-safe FIFO of cancellable, identified jobs.
//!
//! ```text
//!   issue_job_id()          push(job)              pop() / pop_batch()
//!  ┌──────────────┐      ┌──────────────┐        ┌──────────────┐
//!  │ Reserved     │ ───► │ Queued       │ ─────► │ Executing    │
//!  │ (empty slot) │      │ (in order)   │        │ (caller owns)│
//!  └──────┬───────┘      └──────┬───────┘        └──────────────┘
//!         └──── cancel(id) ─────┴──► Cancelled (slot removed)
//! ```
//!
//! Cancellation removes the slot from the map and leaves the id in the
//! order queue. Consumers skip ids without a slot, so nothing has to be
//! rewritten in the middle of the queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// Identifier of a job. Never reused within a process.
pub type JobId = u64;

/// Returned when a job was not accepted.
pub const INVALID_JOB_ID: JobId = 0;

/// A single-call, type-erased unit of work.
pub struct Job(Box<dyn FnOnce() + Send + 'static>);

impl Job {
    /// Wraps a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }

    /// Runs the job, consuming it.
    #[inline]
    pub fn run(self) {
        (self.0)();
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Job")
    }
}

struct QueueState {
    /// Submission order. May contain ids whose slot was cancelled.
    job_order: VecDeque<JobId>,
    /// `None` marks a reserved slot whose job was not pushed yet.
    jobs: HashMap<JobId, Option<Job>>,
    next_job_id: JobId,
    is_stopping: bool,
}

impl QueueState {
    fn generate_id(&mut self) -> JobId {
        self.next_job_id += 1;
        self.next_job_id
    }

    /// Pops order entries until one still has a job.
    fn take_next(&mut self) -> Option<Job> {
        while let Some(id) = self.job_order.pop_front() {
            if let Some(job) = self.jobs.remove(&id).flatten() {
                return Some(job);
            }
        }
        None
    }
}

/// Cancellable FIFO job queue shared by producers and workers.
///
/// Created through [`JobQueue::create`] only; every user holds an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// let queue = JobQueue::create();
/// let a = queue.push(Job::new(|| compile_shader()));
/// let b = queue.push(Job::new(|| upload_texture()));
/// queue.cancel(a);
///
/// // `a` is skipped, `b` comes out.
/// queue.pop(false).unwrap().run();
/// ```
pub struct JobQueue {
    state: Mutex<QueueState>,
    condition: Condvar,
}

impl JobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn create() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState {
                job_order: VecDeque::new(),
                jobs: HashMap::new(),
                next_job_id: INVALID_JOB_ID,
                is_stopping: false,
            }),
            condition: Condvar::new(),
        })
    }

    /// Queues a job under a fresh id.
    ///
    /// Returns [`INVALID_JOB_ID`] once the queue is stopping.
    pub fn push(&self, job: Job) -> JobId {
        self.push_with_id(job, INVALID_JOB_ID)
    }

    /// Queues a job under an id obtained from [`JobQueue::issue_job_id`].
    ///
    /// With [`INVALID_JOB_ID`] this behaves like [`JobQueue::push`].
    /// Returns [`INVALID_JOB_ID`] if the queue is stopping or the id was
    /// cancelled in the meantime.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if a job was already pushed under this id.
    pub fn push_with_id(&self, job: Job, pre_issued: JobId) -> JobId {
        let mut state = self.state.lock();
        if state.is_stopping {
            tracing::trace!("job rejected, queue is stopping");
            return INVALID_JOB_ID;
        }

        let id = if pre_issued == INVALID_JOB_ID {
            let id = state.generate_id();
            state.jobs.insert(id, Some(job));
            id
        } else {
            let Some(slot) = state.jobs.get_mut(&pre_issued) else {
                tracing::trace!(id = pre_issued, "job rejected, id was cancelled");
                return INVALID_JOB_ID;
            };
            debug_assert!(slot.is_none(), "job {pre_issued} was already pushed");
            if slot.is_some() {
                tracing::error!(id = pre_issued, "job pushed twice under the same id");
                return INVALID_JOB_ID;
            }
            *slot = Some(job);
            pre_issued
        };

        state.job_order.push_back(id);
        self.condition.notify_one();
        id
    }

    /// Reserves an id without a job, so the caller can cancel work it has
    /// not built yet.
    pub fn issue_job_id(&self) -> JobId {
        let mut state = self.state.lock();
        let id = state.generate_id();
        state.jobs.insert(id, None);
        id
    }

    /// Removes a reserved or queued job. Returns whether anything was
    /// cancelled; a job already popped cannot be.
    pub fn cancel(&self, id: JobId) -> bool {
        self.state.lock().jobs.remove(&id).is_some()
    }

    /// Takes the oldest non-cancelled job.
    ///
    /// With `should_block`, waits until a job arrives or the queue stops.
    /// Returns `None` when there is nothing to run (non-blocking) or the
    /// queue stopped with nothing left.
    pub fn pop(&self, should_block: bool) -> Option<Job> {
        let mut state = self.state.lock();
        loop {
            if should_block {
                while state.job_order.is_empty() && !state.is_stopping {
                    self.condition.wait(&mut state);
                }
            }
            if let Some(job) = state.take_next() {
                return Some(job);
            }
            // Only cancelled ids were queued; keep waiting unless stopping.
            if !should_block || state.is_stopping {
                return None;
            }
        }
    }

    /// Takes up to `max_jobs` order entries (all of them for `None`) without
    /// blocking. Cancelled entries count against the limit but are dropped,
    /// so fewer jobs may come back.
    pub fn pop_batch(&self, max_jobs: Option<usize>) -> Vec<Job> {
        let mut state = self.state.lock();
        let available = state.job_order.len();
        let count = max_jobs.map_or(available, |max| max.min(available));

        let mut jobs = Vec::with_capacity(count);
        for _ in 0..count {
            let Some(id) = state.job_order.pop_front() else { break };
            if let Some(job) = state.jobs.remove(&id).flatten() {
                jobs.push(job);
            }
        }
        jobs
    }

    /// Rejects further pushes and wakes every blocked consumer.
    pub fn stop(&self) {
        self.state.lock().is_stopping = true;
        self.condition.notify_all();
    }

    /// True once [`JobQueue::stop`] was called.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.state.lock().is_stopping
    }

    /// Order entries still queued (cancelled ones included).
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().job_order.len()
    }

    /// True when no order entries are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().job_order.is_empty()
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("JobQueue")
            .field("queued", &state.job_order.len())
            .field("slots", &state.jobs.len())
            .field("is_stopping", &state.is_stopping)
            .finish()
    }
}
