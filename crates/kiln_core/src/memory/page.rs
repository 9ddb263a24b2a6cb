//! # Page Size
//!
//! The OS page size is resolved once while the configuration is built and
//! then passed by value to everything that maps memory.

/// Size of a virtual memory page in bytes. Always a power of two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageSize(usize);

impl PageSize {
    /// Page size assumed when the OS cannot be asked.
    pub const FALLBACK: Self = Self(4096);

    /// Wraps an explicit page size.
    ///
    /// Returns `None` unless `bytes` is a non-zero power of two.
    #[must_use]
    pub const fn new(bytes: usize) -> Option<Self> {
        if bytes.is_power_of_two() {
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Asks the OS for its page size.
    #[must_use]
    pub fn query() -> Self {
        Self::new(os_page_size()).unwrap_or(Self::FALLBACK)
    }

    /// Page size in bytes.
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }

    /// Rounds `bytes` up to a whole number of pages. `None` if the result
    /// does not fit in `usize`.
    #[inline]
    #[must_use]
    pub const fn round_up(self, bytes: usize) -> Option<usize> {
        match bytes.checked_add(self.0 - 1) {
            Some(padded) => Some(padded & !(self.0 - 1)),
            None => None,
        }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::query()
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn os_page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    usize::try_from(size).unwrap_or(0)
}

#[cfg(not(unix))]
fn os_page_size() -> usize {
    PageSize::FALLBACK.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_is_power_of_two() {
        assert!(PageSize::query().get().is_power_of_two());
    }

    #[test]
    fn test_rejects_odd_sizes() {
        assert!(PageSize::new(0).is_none());
        assert!(PageSize::new(3000).is_none());
        assert_eq!(PageSize::new(16384).map(PageSize::get), Some(16384));
    }

    #[test]
    fn test_round_up() {
        let page = PageSize::FALLBACK;
        assert_eq!(page.round_up(1), Some(4096));
        assert_eq!(page.round_up(4096), Some(4096));
        assert_eq!(page.round_up(4097), Some(8192));
    }

    #[test]
    fn test_round_up_near_usize_max() {
        let page = PageSize::FALLBACK;
        assert_eq!(page.round_up(usize::MAX - 10), None);
        assert_eq!(page.round_up(usize::MAX - 4095), Some(usize::MAX - 4095));
    }
}
