extern crate slidegc;

use slidegc::plan::sliding::SlidingHeap;
use slidegc::plan::GcCause;
use slidegc::util::constants::*;
use slidegc::util::memory;
use slidegc::util::options::Options;
use slidegc::util::test_util::mock_vm::{self, MockVM};

fn new_heap(init: usize, max: usize) -> SlidingHeap<MockVM> {
    let mut options = Options::default();
    options.set_from_command_line("heap_size", &init.to_string());
    options.set_from_command_line("max_heap_size", &max.to_string());
    options.set_from_command_line("sliding_gc", "false");
    SlidingHeap::new(options).unwrap()
}

const KB_WORDS: usize = BYTES_IN_KBYTE / BYTES_IN_WORD;

#[test]
fn bump_only_allocation_with_one_expansion() {
    let page = memory::page_size();
    let heap = new_heap(page, BYTES_IN_MBYTE);
    assert_eq!(heap.capacity(), page);
    assert_eq!(heap.max_capacity(), BYTES_IN_MBYTE);

    let mut last = None;
    for _ in 0..100 {
        let addr = heap.allocate(KB_WORDS).expect("bump allocation failed");
        assert!(addr.is_aligned_to(BYTES_IN_WORD));
        // Single-threaded bump allocation tiles the space contiguously.
        if let Some(prev) = last {
            assert_eq!(addr, prev + BYTES_IN_KBYTE);
        }
        last = Some(addr);
    }

    assert_eq!(heap.used(), 100 * BYTES_IN_KBYTE);
    // The first failing bump expanded once, taking the whole remaining
    // reservation (the configured expansion chunk exceeds it).
    assert_eq!(heap.capacity(), BYTES_IN_MBYTE);
    assert_eq!(heap.gc_cycles(), 0);
}

#[test]
fn oom_without_gc() {
    let heap = new_heap(64 * BYTES_IN_KBYTE, 64 * BYTES_IN_KBYTE);

    let mut allocations = 0;
    while heap.allocate(KB_WORDS).is_some() {
        allocations += 1;
        assert!(allocations <= 64, "allocated past the reservation");
    }

    assert_eq!(allocations, 64);
    assert!(heap.used() <= 64 * BYTES_IN_KBYTE);
    assert_eq!(heap.gc_cycles(), 0);

    // With the collector disabled, explicit requests are ignored.
    heap.collect(GcCause::RequestedGc);
    assert_eq!(heap.gc_cycles(), 0);
}

#[test]
fn exact_fit_of_remaining_committed_space() {
    let heap = new_heap(64 * BYTES_IN_KBYTE, 64 * BYTES_IN_KBYTE);
    let all_words = 64 * BYTES_IN_KBYTE / BYTES_IN_WORD;

    assert!(heap.allocate(all_words).is_some());
    assert_eq!(heap.used(), 64 * BYTES_IN_KBYTE);
    assert!(heap.allocate(1).is_none());
}

#[test]
fn parallel_allocations_do_not_overlap() {
    let heap = new_heap(BYTES_IN_MBYTE, 4 * BYTES_IN_MBYTE);

    let results: Vec<Vec<(usize, usize)>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let mut local = Vec::new();
                    for i in 0..1000 {
                        let words = 2 + (i % 7);
                        let addr = heap.allocate(words).expect("heap should not fill up");
                        assert!(addr.is_aligned_to(BYTES_IN_WORD));
                        local.push((addr.as_usize(), words * BYTES_IN_WORD));
                    }
                    local
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut spans: Vec<(usize, usize)> = results.concat();
    assert_eq!(spans.len(), 8000);
    spans.sort();
    for pair in spans.windows(2) {
        assert!(
            pair[0].0 + pair[0].1 <= pair[1].0,
            "allocations overlap: {:x}+{:x} vs {:x}",
            pair[0].0,
            pair[0].1,
            pair[1].0
        );
    }
}

#[test]
fn object_iterate_walks_the_parsable_prefix() {
    let heap = new_heap(BYTES_IN_MBYTE, BYTES_IN_MBYTE);
    let sizes = [2usize, 5, 3, 8, 2];
    let objects: Vec<_> = sizes
        .iter()
        .map(|&words| mock_vm::alloc_object(&heap, words, 0))
        .collect();

    let mut seen = Vec::new();
    heap.object_iterate(&mut |object| seen.push(object));
    assert_eq!(seen, objects);
}

#[test]
fn counter_updates_follow_allocation_steps() {
    // The update step for a 1M heap is max/16 = 64K.
    let heap = new_heap(BYTES_IN_MBYTE, BYTES_IN_MBYTE);
    let before = mock_vm::counter_updates();
    for _ in 0..129 {
        heap.allocate(64).unwrap();
    }
    assert!(mock_vm::counter_updates() > before);
}

#[test]
fn archive_allocation_works_before_monitoring() {
    let heap = new_heap(BYTES_IN_MBYTE, BYTES_IN_MBYTE);
    assert!(heap.allocate_archive(KB_WORDS).is_some());
    assert_eq!(heap.used(), BYTES_IN_KBYTE);
}

#[test]
fn print_heap_on_reports_occupancy() {
    let heap = new_heap(BYTES_IN_MBYTE, BYTES_IN_MBYTE);
    let mut out = Vec::new();
    heap.print_heap_on(&mut out).unwrap();
    let report = String::from_utf8(out).unwrap();
    assert!(report.contains("reserved"));
    assert!(report.contains("allocation space"));
}
