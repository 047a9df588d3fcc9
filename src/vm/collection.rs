use crate::vm::VMBinding;

/// Reserved/committed/used byte counts of the host's class-metadata space,
/// for occupancy reporting.
#[derive(Copy, Clone, Debug, Default)]
pub struct MetaspaceStats {
    pub reserved: usize,
    pub committed: usize,
    pub used: usize,
}

/// Host runtime services the heap depends on: the safepoint machinery, a
/// monotonic clock, TLAB retirement, and the monitoring/metaspace hooks.
pub trait Collection<VM: VMBinding> {
    /// Runs `op` with every mutator thread stopped at a safepoint. The
    /// request is serialized through the host's VM-operation queue; the
    /// calling thread parks until the operation has completed.
    fn execute_at_safepoint(op: &mut (dyn FnMut() + Send));

    /// Is the current thread already inside a safepoint operation?
    fn is_at_safepoint() -> bool;

    /// Monotonic nanosecond clock.
    fn nanos() -> u64;

    /// Asks every mutator to retire its TLAB so the heap has no outstanding
    /// allocation holes. Called at a safepoint.
    fn make_tlabs_parsable();

    /// Monitoring hook, fired when allocation crosses a counter-update step
    /// and after every collection request.
    fn update_counters() {}

    /// Nudges the host's class-metadata sizing policy. Fired for
    /// metadata-pressure collection causes.
    fn compute_metaspace_size() {}

    /// Metaspace occupancy for reporting, if the host tracks one.
    fn metaspace_stats() -> Option<MetaspaceStats> {
        None
    }
}
