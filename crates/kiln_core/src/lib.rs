//! # KILN Core
//!
//! Command submission core of the renderer:
//! - Circular command buffer shared by the app thread and the driver thread
//! - Back-pressure between recording and execution
//! - Cancellable background jobs, on a thread or amortized per frame
//!
//! ## Architecture Rules
//!
//! 1. **No heap allocations while recording** - the command buffer is mapped once
//! 2. **The driver never sees half a frame** - only flushed ranges cross threads
//! 3. **Cancelled work never runs** - consumers skip cancelled ids
//!
//! ## Example
//!
//! ```rust,ignore
//! use kiln_core::{CoreConfig, Job, JobQueue, AmortizationWorker};
//!
//! let config = CoreConfig::from_toml_file("engine.toml")?;
//! let (mut producer, consumer) = config.command_buffer_queue()?;
//!
//! let queue = JobQueue::create();
//! let mut cleanup = AmortizationWorker::create(queue.clone());
//! queue.push(Job::new(|| release_staging_buffers()));
//!
//! // once per frame
//! cleanup.process(Some(config.jobs_per_frame));
//! producer.flush();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod jobs;
pub mod memory;
pub mod sync;

pub use config::CoreConfig;
pub use error::{CoreError, CoreResult};
pub use jobs::{
    AmortizationWorker, Job, JobId, JobQueue, JobWorker, ThreadWorker, ThreadWorkerConfig,
    INVALID_JOB_ID,
};
pub use memory::{AllocationStrategy, BufferMode, BufferRange, CircularBuffer, PageSize};
pub use sync::{CommandBufferQueue, CommandConsumer, CommandProducer, CommandSlice};
