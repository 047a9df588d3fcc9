pub mod sliding;

use std::fmt;

/// Why a collection was requested. Metadata causes never run a heap
/// collection; they only trigger metaspace sizing adjustments.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GcCause {
    /// An allocation could not be satisfied even after expansion.
    AllocationFailure,
    /// The program asked for a collection explicitly.
    RequestedGc,
    /// The host hit its class-metadata allocation threshold.
    MetadataThreshold,
    /// Metadata pressure with a request to clear soft references (which
    /// this collector never does; sizing still runs).
    MetadataClearSoftRefs,
}

impl fmt::Display for GcCause {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            GcCause::AllocationFailure => "Allocation Failure",
            GcCause::RequestedGc => "Requested GC",
            GcCause::MetadataThreshold => "Metadata GC Threshold",
            GcCause::MetadataClearSoftRefs => "Metadata GC Clear Soft References",
        };
        f.write_str(s)
    }
}
