//! Page-granular virtual memory, wrapping the POSIX mmap family. Reserved
//! ranges start inaccessible and unaccounted (`PROT_NONE` + `MAP_NORESERVE`);
//! committing remaps pages read-write, which also hands back zeroed memory.

use crate::util::conversions;
use crate::util::Address;
use std::io::Result;

lazy_static! {
    static ref PAGE_SIZE: usize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
}

/// The OS page size in bytes.
pub fn page_size() -> usize {
    *PAGE_SIZE
}

/// The OS allocation granularity in bytes. On POSIX this equals the page
/// size; kept separate so reservation alignment reads as what it is.
pub fn allocation_granularity() -> usize {
    *PAGE_SIZE
}

pub fn wrap_libc_call<T: PartialEq>(f: &dyn Fn() -> T, expect: T) -> Result<()> {
    let ret = f();
    if ret == expect {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn mmap_fixed(start: Address, size: usize, prot: libc::c_int, flags: libc::c_int) -> Result<()> {
    let ptr = start.to_mut_ptr();
    wrap_libc_call(
        &|| unsafe { libc::mmap(start.to_mut_ptr(), size, prot, flags, -1, 0) },
        ptr,
    )
}

/// Reserves `size` bytes of address space aligned to `align`, accessible to
/// nobody and backed by nothing. Over-maps by the alignment and trims the
/// slack so the returned base is aligned.
pub fn reserve_aligned(size: usize, align: usize) -> Result<Address> {
    debug_assert!(align.is_power_of_two() && align >= page_size());
    debug_assert!(conversions::raw_is_aligned(size, page_size()));

    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
    let raw = unsafe { libc::mmap(std::ptr::null_mut(), size + align, libc::PROT_NONE, flags, -1, 0) };
    if raw == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }

    let base = Address::from_mut_ptr(raw).align_up(align);
    let head = base - Address::from_mut_ptr(raw);
    let tail = align - head;
    if head > 0 {
        release(Address::from_mut_ptr(raw), head)?;
    }
    if tail > 0 {
        release(base + size, tail)?;
    }
    Ok(base)
}

/// Commits `size` bytes at `start` within a reserved range. The pages come
/// back zeroed.
pub fn commit(start: Address, size: usize) -> Result<()> {
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED;
    mmap_fixed(start, size, libc::PROT_READ | libc::PROT_WRITE, flags)
}

/// Uncommits `size` bytes at `start`, returning the pages to the OS while
/// keeping the address range reserved.
pub fn uncommit(start: Address, size: usize) -> Result<()> {
    let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_FIXED | libc::MAP_NORESERVE;
    mmap_fixed(start, size, libc::PROT_NONE, flags)
}

/// Unmaps the range entirely.
pub fn release(start: Address, size: usize) -> Result<()> {
    wrap_libc_call(&|| unsafe { libc::munmap(start.to_mut_ptr(), size) }, 0)
}

/// Set a range of memory to 0.
pub fn zero(start: Address, len: usize) {
    set(start, 0, len);
}

/// Set a range of memory to the given value. Similar to memset.
pub fn set(start: Address, val: u8, len: usize) {
    unsafe {
        std::ptr::write_bytes(start.to_mut_ptr::<u8>(), val, len);
    }
}

/// Copies `words` heap words from `src` to `dst` in ascending address order.
/// The regions may overlap only when `dst <= src`, which the ascending copy
/// handles correctly.
pub fn copy_words(src: Address, dst: Address, words: usize) {
    debug_assert!(
        dst <= src || dst.as_usize() >= src.as_usize() + conversions::words_to_bytes(words),
        "overlapping copy requires dst <= src"
    );
    unsafe {
        let mut s = src.to_ptr::<usize>();
        let mut d = dst.to_mut_ptr::<usize>();
        for _ in 0..words {
            *d = *s;
            s = s.add(1);
            d = d.add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_commit_rw() {
        let size = page_size() * 4;
        let base = reserve_aligned(size, page_size()).unwrap();
        assert!(base.is_aligned_to(page_size()));

        commit(base, page_size()).unwrap();
        unsafe {
            base.store::<usize>(0xdead_beef);
            assert_eq!(base.load::<usize>(), 0xdead_beef);
        }

        // Recommitting hands back zeroed pages.
        uncommit(base, page_size()).unwrap();
        commit(base, page_size()).unwrap();
        assert_eq!(unsafe { base.load::<usize>() }, 0);

        release(base, size).unwrap();
    }

    #[test]
    fn test_copy_words_overlapping() {
        let mut buf = [1usize, 2, 3, 4, 5, 0, 0, 0];
        let base = Address::from_mut_ptr(buf.as_mut_ptr());
        // Slide left by two words, overlapping.
        copy_words(base + 2 * std::mem::size_of::<usize>(), base, 5);
        assert_eq!(&buf[0..5], &[3, 4, 5, 0, 0]);
    }

    #[test]
    fn test_zero_set() {
        let mut buf = [0xffu8; 16];
        let base = Address::from_mut_ptr(buf.as_mut_ptr());
        zero(base, 8);
        assert_eq!(&buf[0..8], &[0u8; 8]);
        assert_eq!(&buf[8..16], &[0xffu8; 8]);
    }
}
