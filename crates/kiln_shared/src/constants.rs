//! # Engine Constants
//!
//! Defaults baked into the engine. Every one of them can be overridden at
//! startup through `kiln_core::CoreConfig`.

// =============================================================================
// COMMAND STREAM
// =============================================================================

/// Default capacity of the circular command buffer (3 MiB).
///
/// Sized for roughly three frames of recorded driver commands.
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 3 * 1024 * 1024;

/// Default amount of free space the producer needs before it may record
/// another frame (1 MiB).
pub const DEFAULT_MIN_COMMAND_BUFFER_SIZE: usize = 1024 * 1024;

// =============================================================================
// JOBS
// =============================================================================

/// Default number of jobs an amortization worker drains per frame.
pub const DEFAULT_JOBS_PER_FRAME: usize = 1;

/// Default name for background worker threads.
pub const DEFAULT_WORKER_THREAD_NAME: &str = "kiln::worker";
