//! Test support: a mock VM binding and small helpers shared by unit and
//! integration tests. Not part of the heap API.

pub mod mock_vm;

use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

lazy_static! {
    static ref SERIAL_TEST_LOCK: Mutex<()> = Mutex::new(());
}

/// Runs a test that touches process-wide state (environment variables,
/// the mock VM registries) without interference from parallel tests.
pub fn serial_test<F>(f: F)
where
    F: FnOnce(),
{
    // A poisoned lock from an earlier failed test must not hide this
    // test's own result.
    let _guard = SERIAL_TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    f();
}

/// Fails the test if `f` has not completed within `millis`. Used by tests
/// that would otherwise deadlock on a regression.
pub fn panic_after<T, F>(millis: u64, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T,
    F: Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let val = f();
        done_tx.send(()).expect("Unable to send completion signal");
        val
    });

    match done_rx.recv_timeout(Duration::from_millis(millis)) {
        Ok(_) => handle.join().expect("Thread panicked"),
        Err(_) => panic!("Thread took too long"),
    }
}
