//! A bump-pointer managed heap with an optional Lisp2-style sliding
//! mark-compact collector.
//!
//! By default the heap only bump-allocates out of one contiguous space,
//! never reclaims, and never moves objects: maximum allocation simplicity
//! and fully predictable latency, at the cost of running out of memory
//! eventually. With the `sliding_gc` option enabled, the heap can run a
//! single-threaded, stop-the-world sliding compaction on request to recover
//! space while preserving object identity.
//!
//! The heap is embedded into a host runtime through the [`vm::VMBinding`]
//! trait family, which supplies the object model, root enumeration, the
//! safepoint machinery, and clocks. See [`plan::sliding::SlidingHeap`] for
//! the heap API.

extern crate libc;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;

pub mod plan;
pub mod policy;
pub mod util;
pub mod vm;
