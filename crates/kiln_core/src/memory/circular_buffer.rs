//! # Circular Command Buffer
//!
//! Fixed-capacity byte ring used as the backing store for recorded driver
//! commands. The producer claims bytes at `head`; `get_buffer()` hands out
//! everything written since the previous call and wraps `head`.
//!
//! ## Wraparound
//!
//! ```text
//!  0                 size               2*size
//!  ├──────────────────┼──────────────────┤
//!  │ primary          │ shadow           │
//!  │        tail ─────┼──► head          │   head ran past `size`
//!  │                  │                  │
//!  │  hard: head ← head - size  (shadow aliases primary, nothing lost)
//!  │  soft: head ← 0            (copies are independent, start over)
//! ```
//!
//! A single window may therefore grow up to `size` bytes past the end of
//! the primary copy without any special casing in the writer.

#![allow(unsafe_code)]

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::memory::region::{AllocationStrategy, BufferMode, Region};
use crate::memory::PageSize;

/// Byte range `[begin, end)` inside a circular buffer's mapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BufferRange {
    /// Offset of the first byte.
    pub begin: usize,
    /// Offset one past the last byte.
    pub end: usize,
}

impl BufferRange {
    /// Number of bytes in the range.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.begin
    }

    /// True when nothing was written.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

/// Ring buffer of raw command bytes.
///
/// # Thread Safety
///
/// One producer records through `&mut self`. Ranges returned by
/// [`CircularBuffer::get_buffer`] may be read on another thread through
/// [`crate::sync::CommandSlice`]; keeping the producer away from unread
/// bytes is the job of [`crate::sync::CommandBufferQueue`].
///
/// # Example
///
/// ```rust,ignore
/// let mut buffer = CircularBuffer::new(64 * 1024, PageSize::query());
///
/// buffer.allocate(16).copy_from_slice(&[0xAB; 16]);
/// let range = buffer.get_buffer();
/// assert_eq!(buffer.read(range), &[0xAB; 16]);
/// ```
pub struct CircularBuffer {
    region: Arc<Region>,
    /// Logical capacity (one copy), page aligned.
    size: usize,
    /// Next write offset.
    head: usize,
    /// Start of the current accumulation window.
    tail: usize,
}

impl CircularBuffer {
    /// Creates a circular buffer of at least `size` bytes, double-mapped when
    /// the OS allows it.
    ///
    /// # Panics
    ///
    /// Panics if no memory at all can be obtained. The command stream cannot
    /// run without it.
    #[must_use]
    pub fn new(size: usize, page_size: PageSize) -> Self {
        match Self::try_new(size, page_size, AllocationStrategy::Auto) {
            Ok(buffer) => buffer,
            Err(err) => panic!("circular buffer postcondition failed: {err}"),
        }
    }

    /// Creates a circular buffer with an explicit allocation strategy.
    ///
    /// `size` is rounded up to a whole number of pages.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidConfig`] for a zero size, [`CoreError::Allocation`]
    /// when the size does not fit the address space or the selected strategy
    /// cannot obtain memory.
    pub fn try_new(
        size: usize,
        page_size: PageSize,
        strategy: AllocationStrategy,
    ) -> CoreResult<Self> {
        if size == 0 {
            return Err(CoreError::InvalidConfig("circular buffer size must be non-zero".to_string()));
        }
        let size = page_size.round_up(size).ok_or_else(|| CoreError::Allocation {
            size,
            reason: "size overflows the address space".to_string(),
        })?;
        let region = Region::allocate(size, page_size, strategy)?;
        tracing::debug!(size, mode = ?region.mode(), "circular buffer allocated");

        Ok(Self {
            region: Arc::new(region),
            size,
            head: 0,
            tail: 0,
        })
    }

    /// Logical capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Layout actually obtained from the OS.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> BufferMode {
        self.region.mode()
    }

    /// True when writes into the shadow copy show up in the primary copy.
    ///
    /// Equivalent to "the shared memory descriptor is valid".
    #[inline]
    #[must_use]
    pub fn is_hard(&self) -> bool {
        self.region.fd() > 0
    }

    /// Next write offset.
    #[inline]
    #[must_use]
    pub const fn head(&self) -> usize {
        self.head
    }

    /// Start of the current window.
    #[inline]
    #[must_use]
    pub const fn tail(&self) -> usize {
        self.tail
    }

    /// Bytes written since the last [`CircularBuffer::get_buffer`].
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.head - self.tail
    }

    /// Claims `len` contiguous bytes at `head` and advances `head`.
    ///
    /// The slice may extend into the shadow copy.
    ///
    /// # Panics
    ///
    /// Panics if the window would run past the end of the shadow copy.
    pub fn allocate(&mut self, len: usize) -> &mut [u8] {
        let Some(end) = self.head.checked_add(len).filter(|&end| end <= self.region.usable_len()) else {
            panic!(
                "circular buffer overflow: {} bytes in window + {len} requested exceeds capacity {}",
                self.head - self.tail,
                self.size
            );
        };
        // SAFETY: head..end lies inside the primary + shadow mapping, and
        // `&mut self` keeps this the only writable view handed out.
        let bytes = unsafe { std::slice::from_raw_parts_mut(self.region.as_ptr().add(self.head), len) };
        self.head = end;
        bytes
    }

    /// Returns the bytes written since the previous call and starts a new
    /// window.
    ///
    /// If `head` ran past the primary copy it wraps: by `size` in hard mode,
    /// back to the start otherwise.
    pub fn get_buffer(&mut self) -> BufferRange {
        let range = BufferRange { begin: self.tail, end: self.head };

        if self.head >= self.size {
            let overflow = self.head - self.size;
            self.head = match self.mode() {
                BufferMode::Hard => overflow,
                BufferMode::Soft | BufferMode::Heap => 0,
            };
            tracing::trace!(overflow, head = self.head, "circular buffer wrapped");
        }

        self.tail = self.head;
        range
    }

    /// Read-only view of a range inside the mapping.
    ///
    /// # Panics
    ///
    /// Panics if the range lies outside the primary + shadow copies.
    #[must_use]
    pub fn read(&self, range: BufferRange) -> &[u8] {
        assert!(range.begin <= range.end && range.end <= self.region.usable_len());
        // SAFETY: bounds checked above; shared borrow of self excludes
        // concurrent `allocate`.
        unsafe { std::slice::from_raw_parts(self.region.as_ptr().add(range.begin), range.len()) }
    }

    /// Shared handle to the mapping, kept alive by outstanding slices.
    pub(crate) fn region(&self) -> &Arc<Region> {
        &self.region
    }
}

impl std::fmt::Debug for CircularBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("size", &self.size)
            .field("mode", &self.mode())
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: PageSize = PageSize::FALLBACK;

    fn page() -> PageSize {
        PageSize::query()
    }

    #[test]
    fn test_size_rounded_to_pages() {
        let buffer = CircularBuffer::try_new(100, PAGE, AllocationStrategy::Heap).unwrap();
        assert_eq!(buffer.size(), 4096);
        assert_eq!(buffer.mode(), BufferMode::Heap);
        assert!(!buffer.is_hard());
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = CircularBuffer::try_new(0, PAGE, AllocationStrategy::Auto).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_unrepresentable_size_is_allocation_error() {
        for strategy in [AllocationStrategy::Auto, AllocationStrategy::Soft, AllocationStrategy::Heap] {
            let err = CircularBuffer::try_new(usize::MAX - 10, PAGE, strategy).unwrap_err();
            assert!(matches!(err, CoreError::Allocation { .. }), "{strategy:?}: {err:?}");

            // Page aligned, but primary + shadow does not fit.
            let err = CircularBuffer::try_new(1 << (usize::BITS - 1), PAGE, strategy).unwrap_err();
            assert!(matches!(err, CoreError::Allocation { .. }), "{strategy:?}: {err:?}");
        }
    }

    #[test]
    #[should_panic(expected = "circular buffer postcondition failed")]
    fn test_new_panics_on_unrepresentable_size() {
        let _ = CircularBuffer::new(usize::MAX - 10, PAGE);
    }

    #[test]
    fn test_get_buffer_returns_written_window() {
        let mut buffer = CircularBuffer::new(4096, page());
        buffer.allocate(8).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        buffer.allocate(4).copy_from_slice(&[9, 9, 9, 9]);

        let range = buffer.get_buffer();
        assert_eq!(range, BufferRange { begin: 0, end: 12 });
        assert_eq!(buffer.read(range), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 9, 9, 9]);
        assert_eq!(buffer.tail(), buffer.head());
        assert_eq!(buffer.used(), 0);
    }

    #[test]
    fn test_empty_window() {
        let mut buffer = CircularBuffer::new(4096, page());
        let range = buffer.get_buffer();
        assert!(range.is_empty());
    }

    #[test]
    fn test_soft_wrap_restarts_at_zero() {
        let mut buffer = CircularBuffer::try_new(4096, page(), AllocationStrategy::Soft).unwrap();
        let size = buffer.size();
        let _ = buffer.allocate(size - 8);
        let _ = buffer.get_buffer();

        buffer.allocate(16).fill(0x5A);
        let range = buffer.get_buffer();
        assert_eq!(range, BufferRange { begin: size - 8, end: size + 8 });
        assert!(buffer.read(range).iter().all(|&b| b == 0x5A));
        assert_eq!(buffer.head(), 0);
        assert_eq!(buffer.tail(), 0);
    }

    #[test]
    fn test_hard_wrap_continues_at_overflow() {
        let mut buffer = CircularBuffer::new(4096, page());
        if !buffer.is_hard() {
            return;
        }
        let size = buffer.size();
        let _ = buffer.allocate(size - 8);
        let _ = buffer.get_buffer();
        let _ = buffer.allocate(16);
        let _ = buffer.get_buffer();
        assert_eq!(buffer.head(), 8);
        assert_eq!(buffer.tail(), 8);
    }

    #[test]
    #[should_panic(expected = "circular buffer overflow")]
    fn test_huge_allocation_panics_instead_of_wrapping() {
        let mut buffer = CircularBuffer::try_new(4096, PAGE, AllocationStrategy::Heap).unwrap();
        let _ = buffer.allocate(8);
        let _ = buffer.allocate(usize::MAX - 7);
    }

    #[test]
    #[should_panic(expected = "circular buffer overflow")]
    fn test_overrunning_shadow_panics() {
        let mut buffer = CircularBuffer::try_new(4096, PAGE, AllocationStrategy::Heap).unwrap();
        let size = buffer.size();
        let _ = buffer.allocate(size * 2 + 1);
    }
}
