//! The single contiguous allocation space: `[bottom, top)` is the parsable
//! object sequence, `top` the bump pointer, `end` the committed limit.

use crate::util::conversions;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, VMBinding};
use atomic::{Atomic, Ordering};
use std::marker::PhantomData;

pub struct ContiguousSpace<VM: VMBinding> {
    bottom: Address,
    /// The bump pointer. Advanced lock-free by mutators.
    top: Atomic<Address>,
    /// The committed limit. Moved only under the heap lock or at a
    /// safepoint; allocators observe it through the lock's release/acquire
    /// pairing.
    end: Atomic<Address>,
    phantom: PhantomData<VM>,
}

impl<VM: VMBinding> ContiguousSpace<VM> {
    pub fn new(bottom: Address, end: Address) -> Self {
        debug_assert!(bottom <= end);
        ContiguousSpace {
            bottom,
            top: Atomic::new(bottom),
            end: Atomic::new(end),
            phantom: PhantomData,
        }
    }

    pub fn bottom(&self) -> Address {
        self.bottom
    }

    pub fn top(&self) -> Address {
        self.top.load(Ordering::Acquire)
    }

    pub fn end(&self) -> Address {
        self.end.load(Ordering::Acquire)
    }

    /// Bytes of the parsable prefix.
    pub fn used_bytes(&self) -> usize {
        self.top() - self.bottom
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.bottom <= addr && addr < self.top()
    }

    /// Atomically advances `top` by `words` if it still fits below `end`.
    /// Lock-free: concurrent calls linearize in CAS-success order, and no
    /// two successful calls can return overlapping ranges.
    pub fn par_allocate(&self, words: usize) -> Option<Address> {
        let bytes = conversions::words_to_bytes(words);
        let mut old = self.top.load(Ordering::Relaxed);
        loop {
            let end = self.end.load(Ordering::Acquire);
            if old + bytes > end {
                return None;
            }
            match self
                .top
                .compare_exchange_weak(old, old + bytes, Ordering::SeqCst, Ordering::Relaxed)
            {
                Ok(_) => return Some(old),
                Err(current) => old = current,
            }
        }
    }

    /// Moves the bump pointer. Only legal while mutators are stopped.
    pub fn set_top(&self, top: Address) {
        debug_assert!(self.bottom <= top && top <= self.end());
        self.top.store(top, Ordering::Release);
    }

    /// Moves the committed limit. Only legal under the heap lock or while
    /// mutators are stopped.
    pub fn set_end(&self, end: Address) {
        debug_assert!(self.top() <= end);
        self.end.store(end, Ordering::Release);
    }

    /// Walks the parsable prefix object by object, in address order.
    pub fn object_iterate(&self, visitor: &mut impl FnMut(ObjectReference)) {
        let top = self.top();
        let mut addr = self.bottom;
        while addr < top {
            let object = unsafe { addr.to_object_reference() };
            let size = VM::ObjectModel::get_size(object);
            debug_assert!(size > 0, "object at {} has zero size", addr);
            visitor(object);
            addr += conversions::words_to_bytes(size);
        }
        debug_assert_eq!(addr, top, "object sizes must tile the space exactly");
    }
}
