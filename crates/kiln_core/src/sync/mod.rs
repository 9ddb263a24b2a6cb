//! # Producer / Driver Synchronization
//!
//! ## The Problem
//!
//! ```text
//! Thread 1 (App):     RECORD commands into the circular buffer
//! Thread 2 (Driver):  EXECUTE commands recorded last frame
//!
//! Without hand-off: driver reads half-written commands
//! Without back-pressure: app overwrites commands not yet executed
//! ```
//!
//! ## The Solution: Ranges + Free Space Accounting
//!
//! The app flushes whole ranges; the driver releases them after execution.
//! The app only blocks when less than one frame's worth of space is free.

mod command_queue;

pub use command_queue::{CommandBufferQueue, CommandConsumer, CommandProducer, CommandSlice};
