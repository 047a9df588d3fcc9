//! The committed backing of the heap's reserved range. The committed
//! frontier only moves in page-aligned increments. Mutating operations must
//! run under the global heap lock (or at a safepoint); reads are atomic so
//! reporting paths never need the lock.

use crate::util::conversions;
use crate::util::memory;
use crate::util::Address;
use std::io::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct VirtualSpace {
    start: Address,
    reserved_bytes: usize,
    /// Committed bytes from `start`. Mutated only under the heap lock.
    committed_bytes: AtomicUsize,
    page_size: usize,
}

impl VirtualSpace {
    /// Reserves `reserved_bytes` of address space aligned to `align` with
    /// nothing committed yet.
    pub fn reserve(reserved_bytes: usize, align: usize) -> Result<VirtualSpace> {
        debug_assert!(conversions::raw_is_aligned(reserved_bytes, memory::page_size()));
        let start = memory::reserve_aligned(reserved_bytes, align)?;
        Ok(VirtualSpace {
            start,
            reserved_bytes,
            committed_bytes: AtomicUsize::new(0),
            page_size: memory::page_size(),
        })
    }

    pub fn low(&self) -> Address {
        self.start
    }

    /// The committed frontier.
    pub fn high(&self) -> Address {
        self.start + self.committed_size()
    }

    pub fn reserved_high(&self) -> Address {
        self.start + self.reserved_bytes
    }

    pub fn committed_size(&self) -> usize {
        self.committed_bytes.load(Ordering::Acquire)
    }

    pub fn reserved_size(&self) -> usize {
        self.reserved_bytes
    }

    /// Commits `bytes` (rounded up to pages) at the frontier. Returns false
    /// when the reservation is exhausted or the OS refuses the commit.
    /// Caller must hold the heap lock.
    pub fn expand_by(&self, bytes: usize) -> bool {
        let bytes = conversions::raw_align_up(bytes, self.page_size);
        let committed = self.committed_size();
        if committed + bytes > self.reserved_bytes {
            return false;
        }
        if bytes == 0 {
            return true;
        }
        if let Err(e) = memory::commit(self.start + committed, bytes) {
            warn!("Could not commit {} of heap memory: {}", conversions::formatted_size(bytes), e);
            return false;
        }
        self.committed_bytes.store(committed + bytes, Ordering::Release);
        trace!(
            "Expanded virtual space by {} to {} committed",
            conversions::formatted_size(bytes),
            conversions::formatted_size(committed + bytes)
        );
        true
    }

    /// Uncommits up to `bytes` from the tail. The amount is rounded down so
    /// a partially used page at the new frontier stays committed. Caller
    /// must hold the heap lock or run at a safepoint.
    pub fn shrink_by(&self, bytes: usize) {
        let committed = self.committed_size();
        debug_assert!(bytes <= committed);
        let new_committed = conversions::raw_align_up(committed - bytes, self.page_size);
        let uncommit_bytes = committed - new_committed;
        if uncommit_bytes == 0 {
            return;
        }
        if let Err(e) = memory::uncommit(self.start + new_committed, uncommit_bytes) {
            warn!("Could not uncommit {} of heap memory: {}", conversions::formatted_size(uncommit_bytes), e);
            return;
        }
        self.committed_bytes.store(new_committed, Ordering::Release);
        trace!(
            "Shrunk virtual space by {} to {} committed",
            conversions::formatted_size(uncommit_bytes),
            conversions::formatted_size(new_committed)
        );
    }
}

impl Drop for VirtualSpace {
    fn drop(&mut self) {
        let _ = memory::release(self.start, self.reserved_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_to_reservation() {
        let page = memory::page_size();
        let vs = VirtualSpace::reserve(4 * page, page).unwrap();
        assert_eq!(vs.committed_size(), 0);
        assert_eq!(vs.high(), vs.low());

        assert!(vs.expand_by(1));
        assert_eq!(vs.committed_size(), page);

        assert!(vs.expand_by(3 * page));
        assert_eq!(vs.committed_size(), 4 * page);
        assert_eq!(vs.high(), vs.reserved_high());

        // Reservation exhausted.
        assert!(!vs.expand_by(page));
    }

    #[test]
    fn test_committed_memory_is_usable() {
        let page = memory::page_size();
        let vs = VirtualSpace::reserve(2 * page, page).unwrap();
        assert!(vs.expand_by(page));
        unsafe {
            vs.low().store::<usize>(42);
            assert_eq!(vs.low().load::<usize>(), 42);
        }
    }

    #[test]
    fn test_shrink_rounds_to_page() {
        let page = memory::page_size();
        let vs = VirtualSpace::reserve(4 * page, page).unwrap();
        assert!(vs.expand_by(4 * page));

        // A shrink that would cross into a partially used page keeps it.
        vs.shrink_by(page / 2);
        assert_eq!(vs.committed_size(), 4 * page);

        vs.shrink_by(page + page / 2);
        assert_eq!(vs.committed_size(), 3 * page);

        vs.shrink_by(3 * page);
        assert_eq!(vs.committed_size(), 0);
    }
}
