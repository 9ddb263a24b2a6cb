//! # Background Jobs
//!
//! Cancellable work items and the workers that run them.
//!
//! ## Design Philosophy
//!
//! The queue knows nothing about who consumes it. Latency-sensitive work
//! gets a [`ThreadWorker`]; small per-frame work gets an
//! [`AmortizationWorker`] pumped from the frame loop with a job budget.

mod queue;
mod worker;

pub use queue::{Job, JobId, JobQueue, INVALID_JOB_ID};
pub use worker::{AmortizationWorker, JobWorker, ThreadWorker, ThreadWorkerConfig};
