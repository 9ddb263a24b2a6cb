//! # Memory Management
//!
//! Address space for the command stream.
//!
//! ## Design Philosophy
//!
//! The command buffer is allocated once at startup. While recording:
//! - No heap allocations
//! - No copies at wraparound when the OS can alias pages
//! - Overflow past the shadow copy hits a guard page

mod circular_buffer;
mod page;
mod region;

pub use circular_buffer::{BufferRange, CircularBuffer};
pub use page::PageSize;
pub use region::{AllocationStrategy, BufferMode};

pub(crate) use region::Region;
