//! Side marking bitmap: one bit per heap word over the whole reserved heap
//! range, so the bit for any object-aligned address is addressable without
//! knowing object boundaries. The backing pages are reserved up front but
//! only committed for the duration of a collection cycle; outside a cycle
//! the bitmap costs nothing resident.

use crate::util::constants::*;
use crate::util::conversions;
use crate::util::memory;
use crate::util::Address;
use std::io::Result;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct MarkBitmap {
    map: Address,
    map_bytes: usize,
    covered_start: Address,
    covered_bytes: usize,
    committed: AtomicBool,
}

impl MarkBitmap {
    /// Bytes of bitmap needed to cover `covered_bytes` of heap, page aligned.
    pub fn compute_size(covered_bytes: usize) -> usize {
        let bits = covered_bytes >> LOG_BYTES_IN_WORD;
        let bytes = conversions::raw_align_up(bits, BITS_IN_BYTE) / BITS_IN_BYTE;
        conversions::raw_align_up(bytes.max(BYTES_IN_WORD), memory::page_size())
    }

    /// Reserves (but does not commit) a bitmap covering
    /// `[covered_start, covered_start + covered_bytes)`.
    pub fn new(covered_start: Address, covered_bytes: usize) -> Result<MarkBitmap> {
        debug_assert!(covered_start.is_aligned_to(BYTES_IN_WORD));
        let alignment = memory::page_size().max(memory::allocation_granularity());
        let map_bytes = Self::compute_size(covered_bytes);
        let map = memory::reserve_aligned(map_bytes, alignment)?;
        Ok(MarkBitmap {
            map,
            map_bytes,
            covered_start,
            covered_bytes,
            committed: AtomicBool::new(false),
        })
    }

    /// Commits the backing pages. Committed pages arrive zeroed, so the
    /// bitmap starts with no bits set.
    pub fn commit(&self) -> Result<()> {
        memory::commit(self.map, self.map_bytes)?;
        self.committed.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the backing pages to the OS.
    pub fn uncommit(&self) -> Result<()> {
        self.committed.store(false, Ordering::Relaxed);
        memory::uncommit(self.map, self.map_bytes)
    }

    /// Zeroes every bit. The commit/uncommit cycle normally takes care of
    /// this; the verifier clears explicitly to re-mark mid-cycle.
    pub fn clear(&self) {
        debug_assert!(self.committed.load(Ordering::Relaxed));
        memory::zero(self.map, self.map_bytes);
    }

    #[inline(always)]
    fn bit_index(&self, addr: Address) -> usize {
        debug_assert!(addr >= self.covered_start);
        debug_assert!(addr.as_usize() < self.covered_start.as_usize() + self.covered_bytes);
        (addr - self.covered_start) >> LOG_BYTES_IN_WORD
    }

    #[inline(always)]
    fn word_slot(&self, bit: usize) -> Address {
        self.map + conversions::words_to_bytes(bit >> LOG_BITS_IN_WORD)
    }

    /// Sets the bit for `addr`. Non-atomic: bits are only written by the
    /// single-threaded collector.
    #[inline(always)]
    pub fn mark(&self, addr: Address) {
        debug_assert!(self.committed.load(Ordering::Relaxed));
        let bit = self.bit_index(addr);
        let slot = self.word_slot(bit);
        unsafe {
            let word = slot.load::<usize>();
            slot.store::<usize>(word | (1 << (bit & (BITS_IN_WORD - 1))));
        }
    }

    #[inline(always)]
    pub fn is_marked(&self, addr: Address) -> bool {
        debug_assert!(self.committed.load(Ordering::Relaxed));
        let bit = self.bit_index(addr);
        let word = unsafe { self.word_slot(bit).load::<usize>() };
        word & (1 << (bit & (BITS_IN_WORD - 1))) != 0
    }

    /// Finds the lowest marked address in `[start, limit)`, or `limit` when
    /// there is none. Scans word-at-a-time once past the first partial word.
    pub fn get_next_marked_addr(&self, start: Address, limit: Address) -> Address {
        debug_assert!(self.committed.load(Ordering::Relaxed));
        debug_assert!(start <= limit);
        if start == limit {
            return limit;
        }
        let limit_bit = self.bit_index(limit - BYTES_IN_WORD) + 1;
        let start_bit = self.bit_index(start);

        let mut word_index = start_bit >> LOG_BITS_IN_WORD;
        let mut word = unsafe { self.word_slot(start_bit).load::<usize>() };
        word &= usize::MAX << (start_bit & (BITS_IN_WORD - 1));

        loop {
            if word != 0 {
                let bit = (word_index << LOG_BITS_IN_WORD) + word.trailing_zeros() as usize;
                if bit >= limit_bit {
                    return limit;
                }
                return self.covered_start + conversions::words_to_bytes(bit);
            }
            word_index += 1;
            if (word_index << LOG_BITS_IN_WORD) >= limit_bit {
                return limit;
            }
            word = unsafe { (self.map + conversions::words_to_bytes(word_index)).load::<usize>() };
        }
    }
}

impl Drop for MarkBitmap {
    fn drop(&mut self) {
        let _ = memory::release(self.map, self.map_bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The covered range is never dereferenced by the bitmap, so any aligned
    // range works for tests.
    const COVERED_BASE: usize = 0x4000_0000;
    const COVERED_BYTES: usize = 1 << 20;

    fn bitmap() -> MarkBitmap {
        let base = unsafe { Address::from_usize(COVERED_BASE) };
        let map = MarkBitmap::new(base, COVERED_BYTES).unwrap();
        map.commit().unwrap();
        map
    }

    #[test]
    fn test_compute_size() {
        // One bit per heap word: one bitmap byte covers 64 heap bytes.
        let size = MarkBitmap::compute_size(1 << 30);
        assert_eq!(size, (1 << 30) / (BITS_IN_BYTE * BYTES_IN_WORD));
        assert!(conversions::raw_is_aligned(size, memory::page_size()));
    }

    #[test]
    fn test_mark_and_test() {
        let map = bitmap();
        let base = unsafe { Address::from_usize(COVERED_BASE) };
        let a = base + 16 * BYTES_IN_WORD;
        let b = base + 17 * BYTES_IN_WORD;

        assert!(!map.is_marked(a));
        map.mark(a);
        assert!(map.is_marked(a));
        assert!(!map.is_marked(b));
    }

    #[test]
    fn test_next_marked_scan() {
        let map = bitmap();
        let base = unsafe { Address::from_usize(COVERED_BASE) };
        let limit = base + 4096 * BYTES_IN_WORD;

        assert_eq!(map.get_next_marked_addr(base, limit), limit);

        let first = base + 100 * BYTES_IN_WORD;
        let second = base + 1000 * BYTES_IN_WORD;
        map.mark(first);
        map.mark(second);

        assert_eq!(map.get_next_marked_addr(base, limit), first);
        assert_eq!(map.get_next_marked_addr(first, limit), first);
        assert_eq!(map.get_next_marked_addr(first + BYTES_IN_WORD, limit), second);
        assert_eq!(map.get_next_marked_addr(second + BYTES_IN_WORD, limit), limit);
    }

    #[test]
    fn test_mark_beyond_limit_is_not_found() {
        let map = bitmap();
        let base = unsafe { Address::from_usize(COVERED_BASE) };
        let limit = base + 64 * BYTES_IN_WORD;
        map.mark(limit + 8 * BYTES_IN_WORD);
        assert_eq!(map.get_next_marked_addr(base, limit), limit);
    }

    #[test]
    fn test_clear() {
        let map = bitmap();
        let base = unsafe { Address::from_usize(COVERED_BASE) };
        map.mark(base);
        map.clear();
        assert!(!map.is_marked(base));
    }

    #[test]
    fn test_uncommit_then_commit_resets() {
        let map = bitmap();
        let base = unsafe { Address::from_usize(COVERED_BASE) };
        map.mark(base);
        map.uncommit().unwrap();
        map.commit().unwrap();
        assert!(!map.is_marked(base));
    }
}
