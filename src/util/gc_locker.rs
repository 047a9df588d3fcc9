//! The allocation pin lock. Mutators enter the critical section while they
//! expose raw interior pointers to foreign code; the collector refuses to
//! run while any thread is inside. `block`/`unblock` bracket the post-GC
//! allocation retry so pins arriving right after a cycle cannot race it.

use std::sync::{Condvar, Mutex};

#[derive(Default)]
struct LockerState {
    /// Number of threads currently holding pinned objects.
    depth: usize,
    /// When set, new entries stall until `unblock`.
    blocked: bool,
}

pub struct GcLocker {
    state: Mutex<LockerState>,
    cvar: Condvar,
}

impl GcLocker {
    pub fn new() -> Self {
        GcLocker {
            state: Mutex::new(LockerState::default()),
            cvar: Condvar::new(),
        }
    }

    /// Enter the critical section: one more thread holds raw pointers.
    /// Stalls while a `block` bracket is active.
    pub fn enter(&self) {
        let mut state = self.state.lock().unwrap();
        while state.blocked {
            state = self.cvar.wait(state).unwrap();
        }
        state.depth += 1;
    }

    /// Leave the critical section. Wakes anyone blocked waiting for the
    /// count to drain.
    pub fn exit(&self) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.depth > 0, "unbalanced GC locker exit");
        state.depth -= 1;
        if state.depth == 0 {
            self.cvar.notify_all();
        }
    }

    /// Is any thread inside the critical section?
    pub fn is_active(&self) -> bool {
        self.state.lock().unwrap().depth > 0
    }

    /// Stall new entries and wait for the current holders to drain.
    pub fn block(&self) {
        let mut state = self.state.lock().unwrap();
        state.blocked = true;
        while state.depth > 0 {
            state = self.cvar.wait(state).unwrap();
        }
    }

    /// Re-admit entries stalled by `block`.
    pub fn unblock(&self) {
        let mut state = self.state.lock().unwrap();
        state.blocked = false;
        self.cvar.notify_all();
    }
}

impl Default for GcLocker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_enter_exit() {
        let locker = GcLocker::new();
        assert!(!locker.is_active());
        locker.enter();
        locker.enter();
        assert!(locker.is_active());
        locker.exit();
        assert!(locker.is_active());
        locker.exit();
        assert!(!locker.is_active());
    }

    #[test]
    fn test_block_waits_for_drain() {
        let locker = Arc::new(GcLocker::new());
        locker.enter();

        let l = locker.clone();
        let unpinner = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            l.exit();
        });

        // Returns only after the holder has exited.
        let l = locker.clone();
        crate::util::test_util::panic_after(5000, move || {
            l.block();
            assert!(!l.is_active());
            l.unblock();
        });
        unpinner.join().unwrap();
    }

    #[test]
    fn test_block_stalls_new_entries() {
        let locker = Arc::new(GcLocker::new());
        locker.block();

        let l = locker.clone();
        let pinner = std::thread::spawn(move || {
            l.enter();
            l.exit();
        });

        std::thread::sleep(Duration::from_millis(50));
        assert!(!locker.is_active());
        locker.unblock();
        pinner.join().unwrap();
    }
}
