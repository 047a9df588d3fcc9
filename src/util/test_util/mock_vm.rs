//! A minimal VM binding for exercising the heap without a host runtime.
//!
//! Mock objects are laid out as:
//!
//! ```text
//! word 0: mark word
//! word 1: info word - size in words (low half) | number of refs (high half)
//! word 2..2+nrefs: reference slots (full-width, null as zero)
//! remaining words: opaque payload
//! ```
//!
//! Roots are plain word cells owned by the test, registered per thread.
//! Safepoint operations execute inline on the requesting thread, which is
//! a legal host: a world with one mutator that stops itself.

use crate::plan::sliding::SlidingHeap;
use crate::util::constants::*;
use crate::util::{Address, ObjectReference};
use crate::vm::{
    Collection, MetaspaceStats, ObjectModel, Scanning, SimpleSlot, Slot, SlotVisitor, VMBinding,
};
use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

pub struct MockVM;

impl VMBinding for MockVM {
    type Slot = SimpleSlot;
    type ObjectModel = MockObjectModel;
    type Scanning = MockScanning;
    type Collection = MockCollection;
}

/// The mark word of a freshly allocated mock object. Low bits deliberately
/// avoid the forwarding pattern `0b11`.
pub const DEFAULT_MARK_WORD: usize = 0b01;

const INFO_OFFSET: usize = BYTES_IN_WORD;
const REFS_OFFSET: usize = 2 * BYTES_IN_WORD;
const SIZE_MASK: usize = u32::MAX as usize;

pub struct MockObjectModel;

impl MockObjectModel {
    fn info_word(object: ObjectReference) -> usize {
        unsafe { (object.to_address() + INFO_OFFSET).load::<usize>() }
    }

    fn num_refs(object: ObjectReference) -> usize {
        Self::info_word(object) >> 32
    }
}

impl ObjectModel<MockVM> for MockObjectModel {
    fn get_size(object: ObjectReference) -> usize {
        Self::info_word(object) & SIZE_MASK
    }

    fn scan_object<SV: SlotVisitor<SimpleSlot>>(object: ObjectReference, visitor: &mut SV) {
        let base = object.to_address() + REFS_OFFSET;
        for i in 0..Self::num_refs(object) {
            visitor.visit_slot(SimpleSlot::from_address(base + i * BYTES_IN_WORD));
        }
    }

    fn mark_word(object: ObjectReference) -> usize {
        unsafe { object.to_address().load::<usize>() }
    }

    fn set_mark_word(object: ObjectReference, word: usize) {
        unsafe { object.to_address().store::<usize>(word) }
    }

    fn init_mark(object: ObjectReference) {
        Self::set_mark_word(object, DEFAULT_MARK_WORD);
    }

    fn must_preserve_mark(word: usize) -> bool {
        word != DEFAULT_MARK_WORD
    }

    fn is_well_formed(object: ObjectReference) -> bool {
        let size = Self::get_size(object);
        size >= 2 && Self::num_refs(object) + 2 <= size
    }
}

/// Writes a mock object header at `addr` and returns the reference.
pub fn format_object(addr: Address, size_words: usize, num_refs: usize) -> ObjectReference {
    assert!(size_words >= 2 + num_refs);
    unsafe {
        addr.store::<usize>(DEFAULT_MARK_WORD);
        (addr + INFO_OFFSET).store::<usize>(size_words | (num_refs << 32));
        for i in 0..num_refs {
            (addr + REFS_OFFSET + i * BYTES_IN_WORD).store::<usize>(0);
        }
        addr.to_object_reference()
    }
}

/// Allocates and formats a mock object of `size_words` with `num_refs`
/// reference slots.
pub fn alloc_object(
    heap: &SlidingHeap<MockVM>,
    size_words: usize,
    num_refs: usize,
) -> ObjectReference {
    let addr = heap.allocate(size_words).expect("mock allocation failed");
    format_object(addr, size_words, num_refs)
}

pub fn ref_slot(object: ObjectReference, index: usize) -> SimpleSlot {
    assert!(index < MockObjectModel::num_refs(object));
    SimpleSlot::from_address(object.to_address() + REFS_OFFSET + index * BYTES_IN_WORD)
}

pub fn set_ref(object: ObjectReference, index: usize, target: ObjectReference) {
    ref_slot(object, index).store(target);
}

pub fn clear_ref(object: ObjectReference, index: usize) {
    unsafe {
        ref_slot(object, index).as_address().store::<usize>(0);
    }
}

pub fn get_ref(object: ObjectReference, index: usize) -> Option<ObjectReference> {
    ref_slot(object, index).load()
}

thread_local! {
    static STRONG_ROOTS: RefCell<Vec<Address>> = RefCell::new(Vec::new());
    static WEAK_ROOTS: RefCell<Vec<Address>> = RefCell::new(Vec::new());
    static TOKEN_CLAIMED: Cell<bool> = Cell::new(false);
}

/// Registers a word cell as a strong root slot for the current thread.
pub fn add_root(slot: Address) {
    STRONG_ROOTS.with(|r| r.borrow_mut().push(slot));
}

/// Registers a word cell as a weak root slot for the current thread. The
/// collector scans these as strong: they are never cleared.
pub fn add_weak_root(slot: Address) {
    WEAK_ROOTS.with(|r| r.borrow_mut().push(slot));
}

pub fn clear_roots() {
    STRONG_ROOTS.with(|r| r.borrow_mut().clear());
    WEAK_ROOTS.with(|r| r.borrow_mut().clear());
}

pub struct MockScanning;

impl Scanning<MockVM> for MockScanning {
    fn claim_root_scan_token() {
        TOKEN_CLAIMED.with(|t| {
            assert!(!t.get(), "root scan token already claimed");
            t.set(true);
        });
    }

    fn release_root_scan_token() {
        TOKEN_CLAIMED.with(|t| {
            assert!(t.get(), "root scan token not claimed");
            t.set(false);
        });
    }

    fn scan_strong_roots<SV: SlotVisitor<SimpleSlot>>(visitor: &mut SV) {
        STRONG_ROOTS.with(|r| {
            for addr in r.borrow().iter() {
                visitor.visit_slot(SimpleSlot::from_address(*addr));
            }
        });
    }

    fn scan_class_loader_roots<SV: SlotVisitor<SimpleSlot>>(_visitor: &mut SV) {}

    fn scan_thread_roots<SV: SlotVisitor<SimpleSlot>>(_visitor: &mut SV) {}

    fn scan_code_roots<SV: SlotVisitor<SimpleSlot>>(_visitor: &mut SV, _update: bool) {}

    fn scan_weak_roots<SV: SlotVisitor<SimpleSlot>>(visitor: &mut SV) {
        WEAK_ROOTS.with(|r| {
            for addr in r.borrow().iter() {
                visitor.visit_slot(SimpleSlot::from_address(*addr));
            }
        });
    }
}

thread_local! {
    static AT_SAFEPOINT: Cell<bool> = Cell::new(false);
    static MOCK_NANOS: Cell<u64> = Cell::new(0);
}

lazy_static! {
    static ref BOOT_TIME: Instant = Instant::now();
}

static COUNTER_UPDATES: AtomicUsize = AtomicUsize::new(0);
static SAFEPOINT_DELAY_MS: AtomicUsize = AtomicUsize::new(0);

/// Makes every safepoint operation take at least `ms` before running, to
/// widen the window in which concurrent collection requests pile up.
pub fn set_safepoint_delay_ms(ms: usize) {
    SAFEPOINT_DELAY_MS.store(ms, Ordering::Relaxed);
}

/// Pins the mock monotonic clock of the current thread to `nanos`. Zero
/// reverts to real time.
pub fn set_nanos(nanos: u64) {
    MOCK_NANOS.with(|t| t.set(nanos));
}

pub fn counter_updates() -> usize {
    COUNTER_UPDATES.load(Ordering::Relaxed)
}

pub struct MockCollection;

impl Collection<MockVM> for MockCollection {
    fn execute_at_safepoint(op: &mut (dyn FnMut() + Send)) {
        let delay = SAFEPOINT_DELAY_MS.load(Ordering::Relaxed);
        if delay > 0 {
            std::thread::sleep(std::time::Duration::from_millis(delay as u64));
        }
        AT_SAFEPOINT.with(|s| s.set(true));
        op();
        AT_SAFEPOINT.with(|s| s.set(false));
    }

    fn is_at_safepoint() -> bool {
        AT_SAFEPOINT.with(|s| s.get())
    }

    fn nanos() -> u64 {
        let pinned = MOCK_NANOS.with(|t| t.get());
        if pinned != 0 {
            pinned
        } else {
            BOOT_TIME.elapsed().as_nanos() as u64 + 1
        }
    }

    fn make_tlabs_parsable() {}

    fn update_counters() {
        COUNTER_UPDATES.fetch_add(1, Ordering::Relaxed);
    }

    fn metaspace_stats() -> Option<MetaspaceStats> {
        None
    }
}
