//! # Command Buffer Queue
//!
//! Hands ranges of a [`CircularBuffer`] from the recording thread to the
//! driver thread and hands their space back once executed.
//!
//! ```text
//!   Producer (app thread)                 Consumer (driver thread)
//!   allocate / write_pod                  wait_for_commands()
//!        │                                      │
//!   flush() ── CommandSlice ──► [to_execute] ───┘
//!        │                                      │ execute
//!   wait while free_space < required ◄── release_buffer(slice)
//! ```
//!
//! Flushed but unreleased bytes never exceed the buffer size, so the
//! producer never writes over bytes the driver has not read yet. This is
//! also what makes the soft-mode reset to offset zero safe.

#![allow(unsafe_code)]

use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::{Condvar, Mutex};

use crate::error::CoreResult;
use crate::memory::{AllocationStrategy, BufferRange, CircularBuffer, PageSize, Region};

/// A flushed range of commands, owned by the consumer until released.
pub struct CommandSlice {
    region: Arc<Region>,
    range: BufferRange,
}

impl CommandSlice {
    /// Range inside the circular buffer.
    #[inline]
    #[must_use]
    pub const fn range(&self) -> BufferRange {
        self.range
    }

    /// Size in bytes.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.range.len()
    }

    /// True when the slice holds no bytes.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// The recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the range came from `CircularBuffer::get_buffer` and lies
        // inside the mapping, which `region` keeps alive. The producer does
        // not write to it again until the slice is released.
        unsafe { std::slice::from_raw_parts(self.region.as_ptr().add(self.range.begin), self.range.len()) }
    }
}

impl std::fmt::Debug for CommandSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSlice").field("range", &self.range).finish()
    }
}

struct QueueState {
    to_execute: Vec<CommandSlice>,
    free_space: usize,
    high_watermark: usize,
    paused: bool,
    exit_requested: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    condition: Condvar,
    required_size: usize,
    buffer_size: usize,
}

impl Shared {
    fn request_exit(&self) {
        self.state.lock().exit_requested = true;
        self.condition.notify_all();
    }

    fn is_exit_requested(&self) -> bool {
        self.state.lock().exit_requested
    }
}

/// Factory for the producer/consumer pair.
pub struct CommandBufferQueue;

impl CommandBufferQueue {
    /// Creates the pair with the automatic allocation strategy.
    ///
    /// `required_size` is the free space the producer waits for after each
    /// flush, `buffer_size` the ring capacity (rounded up to pages).
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size < required_size` or no memory can be obtained.
    #[must_use]
    pub fn create(
        required_size: usize,
        buffer_size: usize,
        page_size: PageSize,
    ) -> (CommandProducer, CommandConsumer) {
        assert!(
            buffer_size >= required_size,
            "command buffer ({buffer_size} bytes) smaller than required size ({required_size} bytes)"
        );
        Self::with_buffer(required_size, CircularBuffer::new(buffer_size, page_size))
    }

    /// Creates the pair with an explicit allocation strategy.
    ///
    /// # Errors
    ///
    /// Propagates allocation failures of the circular buffer.
    ///
    /// # Panics
    ///
    /// Panics if `buffer_size < required_size`.
    pub fn try_create(
        required_size: usize,
        buffer_size: usize,
        page_size: PageSize,
        strategy: AllocationStrategy,
    ) -> CoreResult<(CommandProducer, CommandConsumer)> {
        assert!(
            buffer_size >= required_size,
            "command buffer ({buffer_size} bytes) smaller than required size ({required_size} bytes)"
        );
        let buffer = CircularBuffer::try_new(buffer_size, page_size, strategy)?;
        Ok(Self::with_buffer(required_size, buffer))
    }

    fn with_buffer(required_size: usize, buffer: CircularBuffer) -> (CommandProducer, CommandConsumer) {
        let buffer_size = buffer.size();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                to_execute: Vec::new(),
                free_space: buffer_size,
                high_watermark: 0,
                paused: false,
                exit_requested: false,
            }),
            condition: Condvar::new(),
            required_size,
            buffer_size,
        });

        let producer = CommandProducer {
            buffer,
            shared: Arc::clone(&shared),
            capacity: buffer_size,
        };
        (producer, CommandConsumer { shared })
    }
}

/// Recording side. Owns the circular buffer.
pub struct CommandProducer {
    buffer: CircularBuffer,
    shared: Arc<Shared>,
    /// Free space observed at the last flush. Only grows behind our back.
    capacity: usize,
}

impl CommandProducer {
    /// Claims `len` bytes for a command.
    ///
    /// # Panics
    ///
    /// Panics if more bytes are recorded between two flushes than the
    /// consumer has released.
    pub fn allocate(&mut self, len: usize) -> &mut [u8] {
        let pending = self.buffer.used();
        assert!(
            pending.checked_add(len).is_some_and(|total| total <= self.capacity),
            "command stream overflow: {pending} pending + {len} requested > {} free",
            self.capacity
        );
        self.buffer.allocate(len)
    }

    /// Records raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.allocate(bytes.len()).copy_from_slice(bytes);
    }

    /// Records a plain-old-data command.
    pub fn write_pod<T: Pod>(&mut self, command: &T) {
        self.write_bytes(bytemuck::bytes_of(command));
    }

    /// Bytes recorded since the last flush.
    #[inline]
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.buffer.used()
    }

    /// The underlying ring.
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &CircularBuffer {
        &self.buffer
    }

    /// Publishes everything recorded since the last flush, then blocks until
    /// the consumer has released at least the required free space.
    ///
    /// Does nothing when nothing was recorded.
    pub fn flush(&mut self) {
        if self.buffer.used() == 0 {
            return;
        }

        let range = self.buffer.get_buffer();
        let slice = CommandSlice { region: Arc::clone(self.buffer.region()), range };

        let mut state = self.shared.state.lock();
        debug_assert!(state.free_space >= range.len());
        state.free_space -= range.len();
        state.high_watermark = state.high_watermark.max(self.shared.buffer_size - state.free_space);
        state.to_execute.push(slice);
        self.shared.condition.notify_all();

        tracing::trace!(bytes = range.len(), free = state.free_space, "command buffer flushed");

        while state.free_space < self.shared.required_size && !state.exit_requested {
            self.shared.condition.wait(&mut state);
        }
        self.capacity = state.free_space;
    }

    /// Wakes both sides and makes every future wait return immediately.
    pub fn request_exit(&self) {
        self.shared.request_exit();
    }

    /// True once either side asked to exit.
    #[must_use]
    pub fn is_exit_requested(&self) -> bool {
        self.shared.is_exit_requested()
    }
}

/// Driver side.
#[derive(Clone)]
pub struct CommandConsumer {
    shared: Arc<Shared>,
}

impl CommandConsumer {
    /// Blocks until commands are available (and the queue is not paused) or
    /// exit is requested, then takes all pending slices.
    ///
    /// After exit is requested this returns whatever is still pending,
    /// possibly nothing.
    #[must_use]
    pub fn wait_for_commands(&self) -> Vec<CommandSlice> {
        let mut state = self.shared.state.lock();
        while (state.to_execute.is_empty() || state.paused) && !state.exit_requested {
            self.shared.condition.wait(&mut state);
        }
        std::mem::take(&mut state.to_execute)
    }

    /// Returns an executed slice's space to the producer.
    pub fn release_buffer(&self, slice: CommandSlice) {
        let mut state = self.shared.state.lock();
        state.free_space += slice.len();
        debug_assert!(state.free_space <= self.shared.buffer_size);
        drop(state);
        self.shared.condition.notify_all();
    }

    /// Holds back commands from [`CommandConsumer::wait_for_commands`].
    pub fn set_paused(&self, paused: bool) {
        self.shared.state.lock().paused = paused;
        if !paused {
            self.shared.condition.notify_all();
        }
    }

    /// Whether the consumer is paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.shared.state.lock().paused
    }

    /// Wakes both sides and makes every future wait return immediately.
    pub fn request_exit(&self) {
        self.shared.request_exit();
    }

    /// True once either side asked to exit.
    #[must_use]
    pub fn is_exit_requested(&self) -> bool {
        self.shared.is_exit_requested()
    }

    /// Bytes not currently held by flushed slices.
    #[must_use]
    pub fn free_space(&self) -> usize {
        self.shared.state.lock().free_space
    }

    /// Largest number of bytes that were in flight at once.
    #[must_use]
    pub fn high_watermark(&self) -> usize {
        self.shared.state.lock().high_watermark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> (CommandProducer, CommandConsumer) {
        CommandBufferQueue::create(1024, 8192, PageSize::query())
    }

    #[test]
    fn test_flush_hands_slice_to_consumer() {
        let (mut producer, consumer) = queue();
        producer.write_pod(&0xDEAD_BEEF_u32);
        producer.write_pod(&7_u32);
        producer.flush();

        let slices = consumer.wait_for_commands();
        assert_eq!(slices.len(), 1);
        let words: &[u32] = bytemuck::cast_slice(slices[0].as_bytes());
        assert_eq!(words, &[0xDEAD_BEEF, 7]);
    }

    #[test]
    fn test_empty_flush_is_noop() {
        let (mut producer, consumer) = queue();
        let before = consumer.free_space();
        producer.flush();
        assert_eq!(consumer.free_space(), before);
    }

    #[test]
    fn test_release_returns_space() {
        let (mut producer, consumer) = queue();
        let size = producer.buffer().size();
        producer.write_bytes(&[1; 64]);
        producer.flush();
        assert_eq!(consumer.free_space(), size - 64);
        assert_eq!(consumer.high_watermark(), 64);

        for slice in consumer.wait_for_commands() {
            consumer.release_buffer(slice);
        }
        assert_eq!(consumer.free_space(), size);
    }

    #[test]
    #[should_panic(expected = "command stream overflow")]
    fn test_recording_past_free_space_panics() {
        let (mut producer, _consumer) = queue();
        let size = producer.buffer().size();
        let _ = producer.allocate(size + 1);
    }

    #[test]
    #[should_panic(expected = "command stream overflow")]
    fn test_huge_record_panics_instead_of_wrapping() {
        let (mut producer, _consumer) = queue();
        producer.write_bytes(&[0; 8]);
        let _ = producer.allocate(usize::MAX - 7);
    }

    #[test]
    fn test_exit_wakes_consumer() {
        let (producer, consumer) = queue();
        producer.request_exit();
        assert!(consumer.wait_for_commands().is_empty());
        assert!(consumer.is_exit_requested());
    }
}
