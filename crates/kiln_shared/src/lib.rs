//! # KILN Shared
//!
//! Math types used by both the command core and the culling code.
//!
//! ## RULE
//!
//! This crate must NEVER depend on platform code (mapping, threads, windows).
//! If you need that, put it in `kiln_core`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{
    DEFAULT_COMMAND_BUFFER_SIZE, DEFAULT_JOBS_PER_FRAME, DEFAULT_MIN_COMMAND_BUFFER_SIZE,
    DEFAULT_WORKER_THREAD_NAME,
};
pub use math::{Mat4, Vec3, Vec4};
