extern crate slidegc;

use slidegc::plan::sliding::SlidingHeap;
use slidegc::plan::GcCause;
use slidegc::util::constants::*;
use slidegc::util::options::Options;
use slidegc::util::test_util::mock_vm::{self, MockVM};
use std::sync::Barrier;

// This test lives in its own binary: it slows every safepoint operation
// down process-wide to widen the window in which concurrent requests pile
// up behind the running cycle.
#[test]
fn concurrent_requests_coalesce() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut options = Options::default();
    options.set_from_command_line("heap_size", &BYTES_IN_MBYTE.to_string());
    options.set_from_command_line("max_heap_size", &BYTES_IN_MBYTE.to_string());
    options.set_from_command_line("sliding_gc", "true");
    let heap: SlidingHeap<MockVM> = SlidingHeap::new(options).unwrap();

    mock_vm::set_safepoint_delay_ms(200);

    let barrier = Barrier::new(8);
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                barrier.wait();
                heap.collect(GcCause::RequestedGc);
            });
        }
    });

    mock_vm::set_safepoint_delay_ms(0);

    // All eight requests read the request id within moments of each other,
    // then serialized on the heap lock while the first cycle (stretched by
    // the safepoint delay) ran: one cycle for the first requester, at most
    // one more covering everyone who asked after it started.
    let cycles = heap.gc_cycles();
    assert!(
        (1..=2).contains(&cycles),
        "8 concurrent requests produced {} cycles",
        cycles
    );
}
