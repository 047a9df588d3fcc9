//! The Lisp2-style sliding mark-compact cycle:
//!
//!   1. mark reachable objects through a side bitmap,
//!   2. compute forwarding addresses with a running compact point,
//!   3. rewrite every reference slot (heap, roots, preserved marks),
//!   4. slide objects left with an overlap-safe forward copy,
//!   5. restore displaced marks, optionally verify, release the bitmap.
//!
//! Runs single-threaded with all mutators stopped. There is no recovery
//! path past the prologue: a failed bitmap commit abandons the cycle, and
//! every later phase succeeds by construction.

use crate::plan::sliding::forwarding;
use crate::plan::sliding::global::SlidingHeap;
use crate::plan::sliding::preserved_marks::PreservedMarks;
use crate::plan::GcCause;
use crate::policy::space::ContiguousSpace;
use crate::util::constants::BYTES_IN_WORD;
use crate::util::conversions::{self, percent_of};
use crate::util::heap::mark_bitmap::MarkBitmap;
use crate::util::memory;
use crate::util::ObjectReference;
use crate::vm::{Collection, ObjectModel, Scanning, Slot, SlotVisitor, VMBinding};
use std::marker::PhantomData;
use std::time::Instant;

/// Logs the wall time of one collection step when dropped.
struct GcTraceTime {
    title: &'static str,
    start: Instant,
}

impl GcTraceTime {
    fn new(title: &'static str) -> Self {
        GcTraceTime {
            title,
            start: Instant::now(),
        }
    }
}

impl Drop for GcTraceTime {
    fn drop(&mut self) {
        let micros = self.start.elapsed().as_micros();
        info!(target: "gc", "{} {}.{:03}ms", self.title, micros / 1000, micros % 1000);
    }
}

/// Invokes the host's root walks, in a fixed order, with a single visitor.
/// Weak storages are scanned as strong: this collector never clears
/// references. When `update` is set, the code-cache walker additionally
/// rewrites the pointers embedded in compiled code.
fn process_roots<VM: VMBinding, SV: SlotVisitor<VM::Slot>>(visitor: &mut SV, update: bool) {
    // Tell the host a single thread is about to walk all roots.
    VM::Scanning::claim_root_scan_token();

    VM::Scanning::scan_strong_roots(visitor);
    VM::Scanning::scan_class_loader_roots(visitor);
    VM::Scanning::scan_thread_roots(visitor);
    VM::Scanning::scan_code_roots(visitor, update);
    VM::Scanning::scan_weak_roots(visitor);

    VM::Scanning::release_root_scan_token();
}

/// Walks the marking bitmap and calls `visitor` on every marked object.
/// This is much faster than walking a (very sparse) parsable heap, but it
/// takes up to 1/64th of the heap size for the bitmap.
fn walk_bitmap<VM: VMBinding>(
    space: &ContiguousSpace<VM>,
    bitmap: &MarkBitmap,
    visitor: &mut impl FnMut(ObjectReference),
) {
    let limit = space.top();
    let mut addr = bitmap.get_next_marked_addr(space.bottom(), limit);
    while addr < limit {
        debug_assert!(bitmap.is_marked(addr));
        let object = unsafe { addr.to_object_reference() };
        visitor(object);
        addr += BYTES_IN_WORD;
        if addr < limit {
            addr = bitmap.get_next_marked_addr(addr, limit);
        }
    }
}

/// Marking closure: loads the reference from each visited slot, and marks
/// and stacks objects seen for the first time. Single-threaded, so the
/// non-atomic bitmap check-and-set is enough.
struct MarkVisitor<'a, VM: VMBinding> {
    stack: Vec<ObjectReference>,
    bitmap: &'a MarkBitmap,
    phantom: PhantomData<VM>,
}

impl<'a, VM: VMBinding> SlotVisitor<VM::Slot> for MarkVisitor<'a, VM> {
    fn visit_slot(&mut self, slot: VM::Slot) {
        if let Some(object) = slot.load() {
            if !self.bitmap.is_marked(object.to_address()) {
                // Lazily materialized stack chunks must be transformed as
                // the marker first reaches them.
                VM::ObjectModel::transform_stack_chunk(object);

                self.bitmap.mark(object.to_address());
                self.stack.push(object);
            }
        }
    }
}

/// Adjustment closure: rewrites each visited slot that points at a
/// forwarded object with the forwardee address.
struct AdjustVisitor<VM: VMBinding> {
    phantom: PhantomData<VM>,
}

impl<VM: VMBinding> SlotVisitor<VM::Slot> for AdjustVisitor<VM> {
    fn visit_slot(&mut self, slot: VM::Slot) {
        if let Some(object) = slot.load() {
            if forwarding::is_forwarded::<VM>(object) {
                slot.store(forwarding::forwardee::<VM>(object));
            }
        }
    }
}

/// Verification closure: re-marks the graph from the roots and checks every
/// reference lands inside the heap, on a well-formed object whose mark word
/// carries no leftover forwarding record.
struct VerifyVisitor<'a, VM: VMBinding> {
    heap: &'a SlidingHeap<VM>,
    stack: Vec<ObjectReference>,
    bitmap: &'a MarkBitmap,
}

impl<'a, VM: VMBinding> SlotVisitor<VM::Slot> for VerifyVisitor<'a, VM> {
    fn visit_slot(&mut self, slot: VM::Slot) {
        if let Some(object) = slot.load() {
            if !self.bitmap.is_marked(object.to_address()) {
                self.bitmap.mark(object.to_address());

                assert!(self.heap.is_in(object.to_address()), "Is in heap: {}", object);
                assert!(VM::ObjectModel::is_well_formed(object), "Is an object: {}", object);
                assert!(
                    !forwarding::is_forwarded::<VM>(object),
                    "Mark is gone: {}",
                    object
                );

                self.stack.push(object);
            }
        }
    }
}

impl<VM: VMBinding> SlidingHeap<VM> {
    /// One full collection cycle. Preconditions: called at a safepoint, and
    /// either directly by the host's safepoint operation or through
    /// `vmentry_collect`.
    pub(crate) fn entry_collect(&self, cause: GcCause) {
        if self.gc_locker().is_active() {
            // Some thread holds raw interior pointers; moving objects now
            // would invalidate them. Callers see a no-op collection.
            return;
        }

        let bitmap = match self.bitmap() {
            Some(bitmap) => bitmap,
            None => return,
        };

        info!(target: "gc", "Lisp2-style Mark-Compact ({})", cause);
        let _cycle_time = GcTraceTime::new("Lisp2-style Mark-Compact");

        // Some statistics, for fun and profit:
        let stat_reachable_roots;
        let mut stat_reachable_heap = 0usize;
        let mut stat_moved = 0usize;
        let stat_preserved_marks;

        {
            let _time = GcTraceTime::new("Step 0: Prologue");

            // Commit the marking bitmap memory. Doing this per cycle keeps
            // the bitmap off the resident set while no GC is happening, and
            // freshly committed pages arrive zeroed, so there are no stale
            // bits to clear.
            if let Err(e) = bitmap.commit() {
                warn!(target: "gc", "Could not commit native memory for marking bitmap, GC failed: {}", e);
                return;
            }

            // The heap does not have to be parsable for this algorithm, but
            // threads have to give up their TLABs.
            VM::Collection::make_tlabs_parsable();
        }

        {
            let _time = GcTraceTime::new("Step 1: Mark");

            // The marking stack and the closure that does most of the work.
            // The closure scans outgoing references, marks newly discovered
            // objects, and stacks them for further processing.
            let mut cl = MarkVisitor::<VM> {
                stack: Vec::new(),
                bitmap,
                phantom: PhantomData,
            };

            // Seed the marking with roots.
            process_roots::<VM, _>(&mut cl, false);
            stat_reachable_roots = cl.stack.len();

            // Scan the rest of the heap until we run out of objects.
            // Termination is guaranteed: every object is pushed exactly
            // once, cycles included, because the bitmap check filters
            // already-marked objects.
            while let Some(object) = cl.stack.pop() {
                VM::ObjectModel::scan_object(object, &mut cl);
                stat_reachable_heap += 1;
            }
        }

        // Forwarding information (where the new copy will reside) goes into
        // mark words. Mark words that cannot be rebuilt afterwards are kept
        // on this side list.
        let mut preserved_marks = PreservedMarks::new();

        // New top of the allocated space, after Step 2.
        let new_top;

        {
            let _time = GcTraceTime::new("Step 2: Calculate new locations");

            // Walk all live objects in address order and assign each the
            // current compact point. Objects already in place (the dense
            // prefix) are not recorded as moves, letting downstream steps
            // skip them.
            let mut compact_point = self.space().bottom();
            walk_bitmap(self.space(), bitmap, &mut |object| {
                if object.to_address() != compact_point {
                    let mark = VM::ObjectModel::mark_word(object);
                    preserved_marks.push_if_necessary::<VM>(object, mark);
                    forwarding::forward_to::<VM>(object, compact_point);
                }
                compact_point += conversions::words_to_bytes(VM::ObjectModel::get_size(object));
            });

            // The final compact point is the new top. It cannot be
            // installed yet: later steps still check "is in heap" against
            // the current top.
            new_top = compact_point;
            debug_assert!(new_top <= self.space().top());

            stat_preserved_marks = preserved_marks.len();
        }

        {
            let _time = GcTraceTime::new("Step 3: Adjust pointers");

            let mut cl = AdjustVisitor::<VM> { phantom: PhantomData };

            // Rewrite the reference fields of every live object with the
            // forwardee addresses taken from the mark words.
            walk_bitmap(self.space(), bitmap, &mut |object| {
                VM::ObjectModel::scan_object(object, &mut cl)
            });

            // The roots reference objects on their own: rewrite them the
            // same way, and have the code cache rewrite embedded pointers.
            process_roots::<VM, _>(&mut cl, true);

            // Finally, make sure preserved marks follow the moves.
            preserved_marks.adjust_during_gc::<VM>();
        }

        {
            let _time = GcTraceTime::new("Step 4: Move objects");

            // All references are adjusted; slide every forwarded object to
            // its new location. Forwardees are always to the left, so the
            // ascending-order word copy is safe even when source and
            // destination overlap. The destination mark word is
            // reinitialized, dropping the forwarding record.
            walk_bitmap(self.space(), bitmap, &mut |object| {
                if forwarding::is_forwarded::<VM>(object) {
                    let forwardee = forwarding::forwardee::<VM>(object);
                    memory::copy_words(
                        object.to_address(),
                        forwardee.to_address(),
                        VM::ObjectModel::get_size(object),
                    );
                    VM::ObjectModel::init_mark(forwardee);
                    stat_moved += 1;
                }
            });

            // Everything now lives in the compacted prefix; retract the top.
            self.space().set_top(new_top);
        }

        {
            let _time = GcTraceTime::new("Step 5: Epilogue");

            // Restore all special mark words.
            preserved_marks.restore::<VM>();

            if *self.options().verify {
                self.verify(bitmap, stat_reachable_roots, stat_reachable_heap);
            }

            // Marking bitmap is not needed anymore.
            if let Err(e) = bitmap.uncommit() {
                warn!(target: "gc", "Could not uncommit native memory for marking bitmap: {}", e);
            }

            // Return the freed tail to the OS if so requested. On large
            // heaps, this can take a while.
            if *self.options().uncommit {
                self.virt_space().shrink_by(self.space().end() - new_top);
                self.space().set_end(self.virt_space().high());
            }
        }

        self.note_cycle_completed();

        let stat_reachable = stat_reachable_roots + stat_reachable_heap;
        info!(
            target: "gc",
            "GC Stats: {} ({:.2}%) reachable from roots, {} ({:.2}%) reachable from heap, \
             {} ({:.2}%) moved, {} ({:.2}%) markwords preserved",
            stat_reachable_roots,
            percent_of(stat_reachable_roots, stat_reachable),
            stat_reachable_heap,
            percent_of(stat_reachable_heap, stat_reachable),
            stat_moved,
            percent_of(stat_moved, stat_reachable),
            stat_preserved_marks,
            percent_of(stat_preserved_marks, stat_reachable)
        );

        self.print_heap_info(self.used());
        self.print_metaspace_info();
    }

    /// Re-marks the object graph from the roots and cross-checks the counts
    /// against the just-finished cycle. Marking again, instead of walking
    /// the now-compacted prefix, keeps verification honest even if a future
    /// change leaves dead objects with dead outgoing references behind.
    fn verify(&self, bitmap: &MarkBitmap, expected_roots: usize, expected_heap: usize) {
        bitmap.clear();

        let mut cl = VerifyVisitor::<VM> {
            heap: self,
            stack: Vec::new(),
            bitmap,
        };

        // All roots must still be correct, and as many of them as the mark
        // phase discovered.
        process_roots::<VM, _>(&mut cl, false);
        let verified_roots = cl.stack.len();
        assert!(
            verified_roots == expected_roots,
            "Verification discovered {} roots out of {}",
            verified_roots,
            expected_roots
        );

        // Same for the rest of the reachable heap.
        let mut verified_heap = 0usize;
        while let Some(object) = cl.stack.pop() {
            VM::ObjectModel::scan_object(object, &mut cl);
            verified_heap += 1;
        }
        assert!(
            verified_heap == expected_heap,
            "Verification discovered {} heap objects out of {}",
            verified_heap,
            expected_heap
        );
    }
}
