//! # Mapped Regions
//!
//! Raw memory behind a circular buffer. Three layouts, tried in order:
//!
//! ```text
//! Hard (shared memory mapped twice):
//!   base            base+size          base+2*size
//!   ┌───────────────┬──────────────────┬───────┐
//!   │   primary     │ shadow (aliases) │ guard │
//!   └───────────────┴──────────────────┴───────┘
//!           └──── same physical pages ────┘
//!
//! Soft (two private copies, no aliasing):
//!   ┌───────────────┬──────────────────┬───────┐
//!   │   copy 0      │   copy 1         │ guard │
//!   └───────────────┴──────────────────┴───────┘
//!
//! Heap (no virtual memory primitives): 2*size bytes, no guard page.
//! ```
//!
//! ## Safety Note
//!
//! Everything here talks to the OS through raw pointers. The region only
//! owns address space; who reads and writes which bytes is decided by
//! `CircularBuffer` and `CommandBufferQueue`.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use crate::error::{CoreError, CoreResult};
use crate::memory::PageSize;

/// How the memory behind a circular buffer is laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferMode {
    /// Shared memory mapped twice back to back; writes past the end wrap
    /// around physically.
    Hard,
    /// Two independent copies followed by a guard page.
    Soft,
    /// Plain heap allocation, no guard page.
    Heap,
}

/// Which layouts a circular buffer may try.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AllocationStrategy {
    /// Hard, then soft, then heap, as the platform allows.
    #[default]
    Auto,
    /// Skip the double mapping.
    Soft,
    /// Skip virtual memory entirely.
    Heap,
}

/// An owned block of address space of `2 * size (+ guard)` bytes.
pub(crate) struct Region {
    base: NonNull<u8>,
    size: usize,
    block_size: usize,
    mode: BufferMode,
    /// Shared memory descriptor in hard mode, `-1` otherwise.
    fd: i32,
}

// SAFETY: the region is plain memory. Access discipline between the
// producer and the consumer is enforced by the owners.
unsafe impl Send for Region {}
// SAFETY: see above.
unsafe impl Sync for Region {}

impl Region {
    /// Maps a region whose logical size is `size` (already page aligned).
    ///
    /// Every later `2 * size + block` computation relies on the overflow
    /// check done here.
    pub(crate) fn allocate(
        size: usize,
        page_size: PageSize,
        strategy: AllocationStrategy,
    ) -> CoreResult<Self> {
        let block_size = page_size.get();
        if size.checked_mul(2).and_then(|both| both.checked_add(block_size)).is_none() {
            return Err(CoreError::Allocation {
                size,
                reason: "primary, shadow and guard page overflow the address space".to_string(),
            });
        }

        if strategy == AllocationStrategy::Auto {
            match sys::map_hard(size, block_size) {
                Ok((base, fd)) => {
                    return Ok(Self { base, size, block_size, mode: BufferMode::Hard, fd });
                }
                Err(reason) => {
                    tracing::debug!(size, %reason, "double mapping unavailable, using soft circular buffer");
                }
            }
        }

        if strategy != AllocationStrategy::Heap && sys::HAS_VIRTUAL_MEMORY {
            let base = sys::map_soft(size, block_size)
                .map_err(|reason| CoreError::Allocation { size, reason })?;
            return Ok(Self { base, size, block_size, mode: BufferMode::Soft, fd: -1 });
        }

        let base = heap::allocate(size, block_size)
            .ok_or_else(|| CoreError::Allocation { size, reason: "heap exhausted".to_string() })?;
        Ok(Self { base, size, block_size, mode: BufferMode::Heap, fd: -1 })
    }

    #[inline]
    pub(crate) fn mode(&self) -> BufferMode {
        self.mode
    }

    /// Shared memory descriptor (`> 0` only in hard mode).
    #[inline]
    pub(crate) fn fd(&self) -> i32 {
        self.fd
    }

    /// Usable bytes: primary plus shadow copy.
    #[inline]
    pub(crate) fn usable_len(&self) -> usize {
        self.size * 2
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        match self.mode {
            BufferMode::Hard | BufferMode::Soft => {
                sys::unmap(self.base, self.size * 2 + self.block_size, self.fd);
            }
            BufferMode::Heap => heap::free(self.base, self.size, self.block_size),
        }
    }
}

mod heap {
    use std::alloc::{alloc_zeroed, dealloc, Layout};
    use std::ptr::NonNull;

    fn layout(size: usize, align: usize) -> Option<Layout> {
        Layout::from_size_align(size * 2, align).ok()
    }

    pub(super) fn allocate(size: usize, align: usize) -> Option<NonNull<u8>> {
        let layout = layout(size, align)?;
        // SAFETY: size is non-zero (checked by CircularBuffer).
        NonNull::new(unsafe { alloc_zeroed(layout) })
    }

    pub(super) fn free(base: NonNull<u8>, size: usize, align: usize) {
        if let Some(layout) = layout(size, align) {
            // SAFETY: allocated in `allocate` with the same layout.
            unsafe { dealloc(base.as_ptr(), layout) };
        }
    }
}

#[cfg(unix)]
mod sys {
    use std::io;
    use std::ptr::{self, NonNull};

    pub(super) const HAS_VIRTUAL_MEMORY: bool = true;

    fn last_error(what: &str) -> String {
        format!("{what}: {}", io::Error::last_os_error())
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn create_shared_memory(len: usize) -> Result<i32, String> {
        let name = b"kiln::CircularBuffer\0";
        // SAFETY: name is NUL terminated.
        let fd = unsafe { libc::memfd_create(name.as_ptr().cast(), libc::MFD_CLOEXEC) };
        if fd < 0 {
            return Err(last_error("memfd_create"));
        }
        let len = libc::off_t::try_from(len).map_err(|_| "shared memory size overflow".to_string())?;
        // SAFETY: fd is a valid descriptor we own.
        if unsafe { libc::ftruncate(fd, len) } != 0 {
            let err = last_error("ftruncate");
            // SAFETY: fd is a valid descriptor we own.
            unsafe { libc::close(fd) };
            return Err(err);
        }
        Ok(fd)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn create_shared_memory(_len: usize) -> Result<i32, String> {
        Err("anonymous shared memory not supported on this platform".to_string())
    }

    /// Reserves `2*size + block` bytes and maps one shared descriptor twice.
    pub(super) fn map_hard(size: usize, block: usize) -> Result<(NonNull<u8>, i32), String> {
        let fd = create_shared_memory(size + block)?;
        let total = size * 2 + block;

        // SAFETY: fresh anonymous reservation, no existing mapping touched.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            let err = last_error("reserve");
            // SAFETY: fd is a valid descriptor we own.
            unsafe { libc::close(fd) };
            return Err(err);
        }

        let fail = |what: &str| {
            let err = last_error(what);
            // SAFETY: base/total is the reservation made above; fd is ours.
            unsafe {
                libc::munmap(base, total);
                libc::close(fd);
            }
            Err(err)
        };

        let rw = libc::PROT_READ | libc::PROT_WRITE;
        let flags = libc::MAP_SHARED | libc::MAP_FIXED;

        // SAFETY: MAP_FIXED replaces pages inside our own reservation.
        let primary = unsafe { libc::mmap(base, size, rw, flags, fd, 0) };
        if primary != base {
            return fail("map primary");
        }

        // SAFETY: base + size is still inside the reservation.
        let shadow_addr = unsafe { base.cast::<u8>().add(size) }.cast::<libc::c_void>();
        // SAFETY: as above.
        let shadow = unsafe { libc::mmap(shadow_addr, size, rw, flags, fd, 0) };
        if shadow != shadow_addr {
            return fail("map shadow");
        }

        // The last `block` bytes keep PROT_NONE from the reservation: guard page.
        NonNull::new(base.cast::<u8>()).map(|p| (p, fd)).ok_or_else(|| "null mapping".to_string())
    }

    /// Two private copies and a guard page.
    pub(super) fn map_soft(size: usize, block: usize) -> Result<NonNull<u8>, String> {
        let total = size * 2 + block;
        // SAFETY: fresh anonymous mapping.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                total,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(last_error("mmap"));
        }

        // SAFETY: base + 2*size is the last page of the mapping above.
        let guard = unsafe { base.cast::<u8>().add(size * 2) }.cast::<libc::c_void>();
        // SAFETY: guard..guard+block lies inside the mapping.
        if unsafe { libc::mprotect(guard, block, libc::PROT_NONE) } != 0 {
            tracing::warn!(reason = %last_error("mprotect"), "circular buffer has no guard page");
        }

        NonNull::new(base.cast::<u8>()).ok_or_else(|| "null mapping".to_string())
    }

    pub(super) fn unmap(base: NonNull<u8>, total: usize, fd: i32) {
        // SAFETY: base/total describe a mapping created by map_hard/map_soft.
        unsafe {
            libc::munmap(base.as_ptr().cast(), total);
            if fd >= 0 {
                libc::close(fd);
            }
        }
    }
}

#[cfg(not(unix))]
mod sys {
    use std::ptr::NonNull;

    pub(super) const HAS_VIRTUAL_MEMORY: bool = false;

    pub(super) fn map_hard(_size: usize, _block: usize) -> Result<(NonNull<u8>, i32), String> {
        Err("virtual memory aliasing not supported on this platform".to_string())
    }

    pub(super) fn map_soft(_size: usize, _block: usize) -> Result<NonNull<u8>, String> {
        Err("virtual memory not supported on this platform".to_string())
    }

    pub(super) fn unmap(_base: NonNull<u8>, _total: usize, _fd: i32) {}
}
