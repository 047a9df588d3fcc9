use crate::plan::sliding::tlab;
use crate::plan::GcCause;
use crate::policy::space::ContiguousSpace;
use crate::util::constants::*;
use crate::util::conversions::{self, formatted_size, percent_of};
use crate::util::gc_locker::GcLocker;
use crate::util::heap::mark_bitmap::MarkBitmap;
use crate::util::heap::virt_space::VirtualSpace;
use crate::util::memory;
use crate::util::options::Options;
use crate::util::{Address, ObjectReference, VMThread};
use crate::vm::{Collection, VMBinding};
use std::cmp;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// The heap: a single contiguous bump-allocated space that never reclaims
/// unless the sliding collector is enabled and asked to run.
///
/// Allocation is lock-free; expanding the committed region, and everything
/// else that moves `end`, happens under `heap_lock`. The same lock
/// serializes collection requests, which is what makes request coalescing
/// work (see `vmentry_collect`).
pub struct SlidingHeap<VM: VMBinding> {
    options: Options,
    space: ContiguousSpace<VM>,
    virt_space: VirtualSpace,
    bitmap: Option<MarkBitmap>,
    gc_locker: GcLocker,
    heap_lock: Mutex<()>,

    // Hot fields precomputed at initialization
    max_tlab_words: usize,
    step_counter_update: usize,
    step_heap_print: usize,
    decay_time_ns: u64,

    last_counter_update: AtomicUsize,
    last_heap_print: AtomicUsize,
    /// Collection request id, bumped per accepted request. Kept on the heap
    /// instance rather than in a process-wide static.
    req_id: AtomicUsize,
    gc_cycles: AtomicUsize,
}

impl<VM: VMBinding> SlidingHeap<VM> {
    pub fn new(options: Options) -> io::Result<SlidingHeap<VM>> {
        debug_assert!(VM::MIN_ALIGNMENT.is_power_of_two() && VM::MIN_ALIGNMENT >= BYTES_IN_WORD);

        let align = memory::page_size().max(memory::allocation_granularity());
        let max_byte_size = {
            let max = if *options.max_heap_size == 0 {
                *options.heap_size
            } else {
                *options.max_heap_size
            };
            conversions::raw_align_up(max, align)
        };
        let init_byte_size = cmp::min(conversions::raw_align_up(*options.heap_size, align), max_byte_size);

        let virt_space = VirtualSpace::reserve(max_byte_size, align)?;
        if !virt_space.expand_by(init_byte_size) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "could not commit the initial heap",
            ));
        }
        let space = ContiguousSpace::new(virt_space.low(), virt_space.high());

        let max_tlab_words = cmp::min(
            conversions::raw_align_up(
                conversions::bytes_to_words_up(*options.max_tlab_size),
                Self::min_alignment_words(),
            ),
            max_byte_size >> LOG_BYTES_IN_WORD,
        );
        let step_counter_update = cmp::min(max_byte_size / 16, *options.update_counters_step);
        let step_heap_print = if *options.print_heap_steps == 0 {
            usize::MAX
        } else {
            max_byte_size / *options.print_heap_steps
        };
        let decay_time_ns = *options.tlab_decay_time * 1_000_000;

        let bitmap = if *options.sliding_gc {
            // Reserve the marking bitmap, but do not commit it yet. The
            // pages only become resident for the duration of a cycle.
            Some(MarkBitmap::new(virt_space.low(), max_byte_size)?)
        } else {
            None
        };

        debug!(
            target: "gc",
            "Initialized heap: {} reserved, {} committed, sliding GC {}",
            formatted_size(max_byte_size),
            formatted_size(init_byte_size),
            if *options.sliding_gc { "enabled" } else { "disabled" }
        );

        Ok(SlidingHeap {
            options,
            space,
            virt_space,
            bitmap,
            gc_locker: GcLocker::new(),
            heap_lock: Mutex::new(()),
            max_tlab_words,
            step_counter_update,
            step_heap_print,
            decay_time_ns,
            last_counter_update: AtomicUsize::new(0),
            last_heap_print: AtomicUsize::new(0),
            req_id: AtomicUsize::new(0),
            gc_cycles: AtomicUsize::new(0),
        })
    }

    const fn min_alignment_words() -> usize {
        VM::MIN_ALIGNMENT >> LOG_BYTES_IN_WORD
    }

    /// Bytes currently held by allocated objects.
    pub fn used(&self) -> usize {
        self.space.used_bytes()
    }

    /// Bytes of committed heap.
    pub fn capacity(&self) -> usize {
        self.virt_space.committed_size()
    }

    /// Bytes of reserved heap.
    pub fn max_capacity(&self) -> usize {
        self.virt_space.reserved_size()
    }

    /// Upper bound for a single TLAB, in bytes.
    pub fn max_tlab_size(&self) -> usize {
        conversions::words_to_bytes(self.max_tlab_words)
    }

    pub fn is_in(&self, addr: Address) -> bool {
        self.space.contains(addr)
    }

    /// Completed collection cycles. Skipped requests (pinned heap, bitmap
    /// commit failure, coalesced duplicates) do not count.
    pub fn gc_cycles(&self) -> usize {
        self.gc_cycles.load(Ordering::Relaxed)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub(crate) fn space(&self) -> &ContiguousSpace<VM> {
        &self.space
    }

    pub(crate) fn bitmap(&self) -> Option<&MarkBitmap> {
        self.bitmap.as_ref()
    }

    pub(crate) fn virt_space(&self) -> &VirtualSpace {
        &self.virt_space
    }

    pub(crate) fn gc_locker(&self) -> &GcLocker {
        &self.gc_locker
    }

    pub(crate) fn note_cycle_completed(&self) {
        self.gc_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// The allocation slow path shared by every entry point: lock-free bump
    /// first, then expansion under the heap lock, looping until the
    /// allocation fits or the reservation is exhausted.
    pub(crate) fn allocate_work(&self, size: usize, verbose: bool) -> Option<Address> {
        debug_assert!(
            conversions::raw_is_aligned(size, Self::min_alignment_words()),
            "Allocation size should be aligned: {}",
            size
        );

        let res = loop {
            // Try to allocate, assume space is available
            if let Some(res) = self.space.par_allocate(size) {
                break res;
            }

            // Allocation failed, attempt expansion, and retry:
            {
                let _heap_lock = self.heap_lock.lock().unwrap();

                // Try to allocate under the lock, assume another thread was
                // able to expand
                if let Some(res) = self.space.par_allocate(size) {
                    break res;
                }

                // Expand and loop back if space is available
                let size_in_bytes = conversions::words_to_bytes(size);
                let uncommitted_space = self.max_capacity() - self.capacity();
                let unused_space = self.max_capacity() - self.used();
                let want_space = cmp::max(size_in_bytes, *self.options.min_heap_expand);
                debug_assert!(
                    unused_space >= uncommitted_space,
                    "Unused ({}) >= uncommitted ({})",
                    unused_space,
                    uncommitted_space
                );

                if want_space <= uncommitted_space {
                    // Enough space to expand in bulk:
                    if !self.virt_space.expand_by(want_space) {
                        return None;
                    }
                } else if size_in_bytes <= unused_space {
                    // No space to expand in bulk, and this allocation is
                    // still possible, take all the remaining space:
                    if !self.virt_space.expand_by(uncommitted_space) {
                        return None;
                    }
                } else {
                    // No space left:
                    return None;
                }

                self.space.set_end(self.virt_space.high());
            }
        };

        // Allocation successful, update counters
        if verbose {
            let used = self.used();
            let last = self.last_counter_update.load(Ordering::Relaxed);
            if used.wrapping_sub(last) >= self.step_counter_update
                && self
                    .last_counter_update
                    .compare_exchange(last, used, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
            {
                VM::Collection::update_counters();
            }

            // ...and print the occupancy line, if needed
            let last = self.last_heap_print.load(Ordering::Relaxed);
            if used.wrapping_sub(last) >= self.step_heap_print
                && self
                    .last_heap_print
                    .compare_exchange(last, used, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
            {
                self.print_heap_info(used);
                self.print_metaspace_info();
            }
        }

        debug_assert!(res.is_aligned_to(VM::MIN_ALIGNMENT), "Object should be aligned: {}", res);
        Some(res)
    }

    fn allocate_or_collect_work(&self, size: usize) -> Option<Address> {
        let mut res = self.allocate_work(size, true);
        if res.is_none() && *self.options.sliding_gc && *self.options.implicit_gc {
            self.vmentry_collect(GcCause::AllocationFailure);
            // Keep newly arriving pins from racing the just-completed cycle
            // while we retry.
            self.gc_locker.block();
            res = self.allocate_work(size, true);
            self.gc_locker.unblock();
        }
        res
    }

    /// Allocates `size` words for a regular object. May trigger a
    /// collection on failure when the sliding collector is enabled.
    pub fn allocate(&self, size: usize) -> Option<Address> {
        self.allocate_or_collect_work(size)
    }

    /// Allocates archive space. Skips counter updates and occupancy
    /// reporting, which may not be usable this early in startup.
    pub fn allocate_archive(&self, size: usize) -> Option<Address> {
        self.allocate_work(size, false)
    }

    /// Allocates a new TLAB of at least `min_size` words, sized by the
    /// calling thread's ergonomics. Returns the buffer and its actual size.
    pub fn allocate_tlab(&self, min_size: usize, requested_size: usize) -> Option<(Address, usize)> {
        debug_assert!(min_size <= self.max_tlab_words);

        // Defaults in case elastic paths are not taken
        let mut fits = true;
        let mut size = requested_size;
        let mut ergo_tlab = requested_size;
        let mut time = 0u64;

        if *self.options.elastic_tlab {
            ergo_tlab = tlab::ergo_tlab_size();

            if *self.options.elastic_tlab_decay {
                let last_time = tlab::last_tlab_time();
                time = VM::Collection::nanos();

                debug_assert!(last_time <= time, "time should be monotonic");

                // If the thread had not allocated recently, retract the
                // ergonomic size. This conserves memory when the thread had
                // an initial burst of allocations, and then started
                // allocating only sporadically.
                if last_time != 0 && time - last_time > self.decay_time_ns {
                    ergo_tlab = 0;
                    tlab::set_ergo_tlab_size(0);
                }
            }

            // If we can fit the allocation under current TLAB size, do so.
            // Otherwise, we want to elastically increase the TLAB size.
            fits = requested_size <= ergo_tlab;
            if !fits {
                size = (ergo_tlab as f64 * *self.options.tlab_elasticity) as usize;
            }
        }

        // Always honor boundaries
        size = cmp::min(cmp::max(size, min_size), self.max_tlab_words);

        // Always honor alignment
        size = conversions::raw_align_up(size, Self::min_alignment_words());

        // Check that adjustments did not break local and global invariants
        debug_assert!(
            conversions::raw_is_aligned(size, Self::min_alignment_words()),
            "Size honors object alignment: {}",
            size
        );
        debug_assert!(min_size <= size, "Size honors min size: {} <= {}", min_size, size);
        debug_assert!(
            size <= self.max_tlab_words,
            "Size honors max size: {} <= {}",
            size,
            self.max_tlab_words
        );

        trace!(
            target: "gc",
            "TLAB size for {:?} (Requested: {}K, Min: {}K, Max: {}K, Ergo: {}K) -> {}K",
            std::thread::current().id(),
            conversions::words_to_bytes(requested_size) / BYTES_IN_KBYTE,
            conversions::words_to_bytes(min_size) / BYTES_IN_KBYTE,
            conversions::words_to_bytes(self.max_tlab_words) / BYTES_IN_KBYTE,
            conversions::words_to_bytes(ergo_tlab) / BYTES_IN_KBYTE,
            conversions::words_to_bytes(size) / BYTES_IN_KBYTE,
        );

        // All prepared, let's do it!
        match self.allocate_or_collect_work(size) {
            Some(res) => {
                // Allocation successful
                if *self.options.elastic_tlab_decay {
                    tlab::set_last_tlab_time(time);
                }
                if *self.options.elastic_tlab && !fits {
                    // If we requested expansion, this is our new ergonomic
                    // TLAB size
                    tlab::set_ergo_tlab_size(size);
                }
                Some((res, size))
            }
            None => {
                // Allocation failed, reset ergonomics to try and fit
                // smaller TLABs
                if *self.options.elastic_tlab {
                    tlab::set_ergo_tlab_size(0);
                }
                None
            }
        }
    }

    /// Entry point for collection requests. Metadata-pressure causes only
    /// adjust the metaspace sizing; everything else runs the sliding
    /// collector when enabled, and is ignored otherwise.
    pub fn collect(&self, cause: GcCause) {
        match cause {
            GcCause::MetadataThreshold | GcCause::MetadataClearSoftRefs => {
                // The host entered the safepoint for a metadata collection.
                // This heap does not collect metadata, but it has to perform
                // sizing adjustments, otherwise the host would re-enter the
                // safepoint again very soon.
                debug_assert!(VM::Collection::is_at_safepoint(), "Expected at safepoint");
                info!(target: "gc", "GC request for \"{}\" is handled", cause);
                VM::Collection::compute_metaspace_size();
                self.print_metaspace_info();
            }
            _ => {
                if *self.options.sliding_gc {
                    if VM::Collection::is_at_safepoint() {
                        self.entry_collect(cause);
                    } else {
                        self.vmentry_collect(cause);
                    }
                } else {
                    info!(target: "gc", "GC request for \"{}\" is ignored", cause);
                }
            }
        }
        VM::Collection::update_counters();
    }

    /// Routes a collection request through the host's VM-operation queue.
    /// The heap lock naturally serializes requests and lets back-to-back
    /// requests from many threads coalesce: a request that started waiting
    /// while another was being handled is dropped, so a burst of N requests
    /// around one running cycle produces at most one extra cycle.
    pub(crate) fn vmentry_collect(&self, cause: GcCause) {
        let id = self.req_id.load(Ordering::Acquire);

        let _heap_lock = self.heap_lock.lock().unwrap();

        if id < self.req_id.load(Ordering::Acquire) {
            // Another collection has already satisfied this request.
            return;
        }

        // No contenders. Start handling a new GC request.
        self.req_id.fetch_add(1, Ordering::SeqCst);

        let mut op = || self.entry_collect(cause);
        VM::Collection::execute_at_safepoint(&mut op);
    }

    /// Pins `object` so foreign code may hold raw interior pointers; the
    /// collector will not run while any pin is outstanding.
    pub fn pin_object(&self, _thread: VMThread, _object: ObjectReference) {
        if *self.options.sliding_gc {
            self.gc_locker.enter();
        }
    }

    pub fn unpin_object(&self, _thread: VMThread, _object: ObjectReference) {
        if *self.options.sliding_gc {
            self.gc_locker.exit();
        }
    }

    /// Walks the parsable object sequence in address order.
    pub fn object_iterate(&self, visitor: &mut impl FnMut(ObjectReference)) {
        self.space.object_iterate(visitor);
    }

    pub fn print_heap_on(&self, st: &mut dyn io::Write) -> io::Result<()> {
        writeln!(st, "Sliding Heap")?;
        writeln!(
            st,
            "  virtual space: {} reserved, {} committed, base {}",
            formatted_size(self.max_capacity()),
            formatted_size(self.capacity()),
            self.space.bottom()
        )?;
        writeln!(
            st,
            "  allocation space: [{}, {}, {})",
            self.space.bottom(),
            self.space.top(),
            self.space.end()
        )
    }

    pub fn print_tracing_info(&self) {
        self.print_heap_info(self.used());
        self.print_metaspace_info();
    }

    pub(crate) fn print_heap_info(&self, used: usize) {
        let reserved = self.max_capacity();
        let committed = self.capacity();

        if reserved != 0 {
            info!(
                target: "gc",
                "Heap: {} reserved, {} ({:.2}%) committed, {} ({:.2}%) used",
                formatted_size(reserved),
                formatted_size(committed),
                percent_of(committed, reserved),
                formatted_size(used),
                percent_of(used, reserved)
            );
        } else {
            info!(target: "gc", "Heap: no reliable data");
        }
    }

    pub(crate) fn print_metaspace_info(&self) {
        match VM::Collection::metaspace_stats() {
            Some(stats) if stats.reserved != 0 => {
                info!(
                    target: "gc,metaspace",
                    "Metaspace: {} reserved, {} ({:.2}%) committed, {} ({:.2}%) used",
                    formatted_size(stats.reserved),
                    formatted_size(stats.committed),
                    percent_of(stats.committed, stats.reserved),
                    formatted_size(stats.used),
                    percent_of(stats.used, stats.reserved)
                );
            }
            _ => info!(target: "gc,metaspace", "Metaspace: no reliable data"),
        }
    }
}
