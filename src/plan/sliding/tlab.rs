//! Per-thread TLAB ergonomics. Both fields are owned by their thread and
//! touched only on that thread's own TLAB allocations, so plain
//! thread-local cells suffice.

use std::cell::Cell;

thread_local! {
    /// Ergonomic TLAB size in words. Zero means "start small again".
    static ERGO_TLAB_SIZE: Cell<usize> = Cell::new(0);
    /// Monotonic timestamp of this thread's last successful TLAB
    /// allocation. Zero means the thread has never allocated a TLAB.
    static LAST_TLAB_TIME: Cell<u64> = Cell::new(0);
}

pub fn ergo_tlab_size() -> usize {
    ERGO_TLAB_SIZE.with(|s| s.get())
}

pub fn set_ergo_tlab_size(words: usize) {
    ERGO_TLAB_SIZE.with(|s| s.set(words));
}

pub fn last_tlab_time() -> u64 {
    LAST_TLAB_TIME.with(|t| t.get())
}

pub fn set_last_tlab_time(nanos: u64) {
    LAST_TLAB_TIME.with(|t| t.set(nanos));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_locality() {
        set_ergo_tlab_size(128);
        let other = std::thread::spawn(|| {
            assert_eq!(ergo_tlab_size(), 0);
            set_ergo_tlab_size(64);
            ergo_tlab_size()
        })
        .join()
        .unwrap();
        assert_eq!(other, 64);
        assert_eq!(ergo_tlab_size(), 128);
    }
}
