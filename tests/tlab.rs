extern crate slidegc;

use slidegc::plan::sliding::SlidingHeap;
use slidegc::util::constants::*;
use slidegc::util::options::Options;
use slidegc::util::test_util::mock_vm::{self, MockVM};

fn tlab_heap(size: usize, configure: impl FnOnce(&mut Options)) -> SlidingHeap<MockVM> {
    let mut options = Options::default();
    options.set_from_command_line("heap_size", &size.to_string());
    options.set_from_command_line("max_heap_size", &size.to_string());
    options.set_from_command_line("sliding_gc", "false");
    configure(&mut options);
    SlidingHeap::new(options).unwrap()
}

#[test]
fn first_tlab_gets_the_minimum() {
    let heap = tlab_heap(BYTES_IN_MBYTE, |_| {});

    // A fresh thread has no ergonomic size yet: the first TLAB is clamped
    // up to the requested minimum, nothing more.
    let (_, size) = heap.allocate_tlab(128, 256).unwrap();
    assert_eq!(size, 128);

    // That size became the thread's ergonomic size, so a request that
    // fits it is taken literally.
    let (_, size) = heap.allocate_tlab(64, 128).unwrap();
    assert_eq!(size, 128);
}

#[test]
fn elasticity_grows_the_ergonomic_size() {
    let heap = tlab_heap(BYTES_IN_MBYTE, |options| {
        options.set_from_command_line("tlab_elasticity", "2.0");
    });

    let (_, size) = heap.allocate_tlab(128, 128).unwrap();
    assert_eq!(size, 128);

    // 200 does not fit the ergonomic 128: grow to 128 * 2.
    let (_, size) = heap.allocate_tlab(64, 200).unwrap();
    assert_eq!(size, 256);

    // 300 does not fit 256 either: grow again.
    let (_, size) = heap.allocate_tlab(64, 300).unwrap();
    assert_eq!(size, 512);
}

#[test]
fn elasticity_overflow_is_clamped_to_max_tlab() {
    let heap = tlab_heap(BYTES_IN_MBYTE, |options| {
        options.set_from_command_line("max_tlab_size", "4096");
        options.set_from_command_line("tlab_elasticity", "100.0");
    });
    let max_words = heap.max_tlab_size() / BYTES_IN_WORD;
    assert_eq!(max_words, 512);

    let (_, size) = heap.allocate_tlab(256, 256).unwrap();
    assert_eq!(size, 256);

    // 256 * 100 overflows the bound and is clamped.
    let (_, size) = heap.allocate_tlab(64, 300).unwrap();
    assert_eq!(size, max_words);

    // A request for exactly the maximum is honored as-is.
    let (_, size) = heap.allocate_tlab(max_words, max_words).unwrap();
    assert_eq!(size, max_words);
}

#[test]
fn decay_retracts_idle_threads() {
    let heap = tlab_heap(BYTES_IN_MBYTE, |_| {});

    mock_vm::set_nanos(1_000);
    let (_, size) = heap.allocate_tlab(128, 128).unwrap();
    assert_eq!(size, 128);

    // Still within the decay window: the ergonomic size holds.
    mock_vm::set_nanos(2_000);
    let (_, size) = heap.allocate_tlab(64, 128).unwrap();
    assert_eq!(size, 128);

    // Idle past the decay time (1s by default): the ergonomic size is
    // retracted and the next TLAB starts small again.
    mock_vm::set_nanos(2_000 + 1_000_000_000 + 1_000);
    let (_, size) = heap.allocate_tlab(64, 128).unwrap();
    assert_eq!(size, 64);
}

#[test]
fn never_allocated_thread_does_not_decay() {
    let heap = tlab_heap(BYTES_IN_MBYTE, |_| {});

    // A huge clock reading with last-allocation-time still at zero must
    // not be treated as "idle for ages".
    mock_vm::set_nanos(u64::MAX / 2);
    let (_, size) = heap.allocate_tlab(128, 256).unwrap();
    assert_eq!(size, 128);
}

#[test]
fn failed_tlab_resets_ergonomics() {
    let heap = tlab_heap(64 * BYTES_IN_KBYTE, |_| {});

    let (_, size) = heap.allocate_tlab(512, 512).unwrap();
    assert_eq!(size, 512);

    // The ergonomic size is now 512: a smaller request rides on it.
    let (_, size) = heap.allocate_tlab(64, 512).unwrap();
    assert_eq!(size, 512);

    // This cannot fit the remaining heap: the failure must reset the
    // ergonomics.
    let all_words = 64 * BYTES_IN_KBYTE / BYTES_IN_WORD;
    assert!(heap.allocate_tlab(all_words, all_words).is_none());

    // Back to minimum-sized TLABs.
    let (_, size) = heap.allocate_tlab(64, 512).unwrap();
    assert_eq!(size, 64);
}

#[test]
fn disabled_elasticity_uses_the_request() {
    let heap = tlab_heap(BYTES_IN_MBYTE, |options| {
        options.set_from_command_line("elastic_tlab", "false");
    });

    let (_, size) = heap.allocate_tlab(64, 300).unwrap();
    assert_eq!(size, 300);

    let (_, size) = heap.allocate_tlab(64, 300).unwrap();
    assert_eq!(size, 300);
}

#[test]
fn tlabs_come_from_the_heap() {
    let heap = tlab_heap(BYTES_IN_MBYTE, |_| {});
    let before = heap.used();
    let (addr, size) = heap.allocate_tlab(128, 128).unwrap();
    assert!(addr.is_aligned_to(BYTES_IN_WORD));
    assert_eq!(heap.used(), before + size * BYTES_IN_WORD);
}
