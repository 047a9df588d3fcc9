//! The sliding plan: bump-pointer allocation with an optional Lisp2-style
//! sliding mark-compact collector.

mod collect;
mod forwarding;
mod global;
mod preserved_marks;
mod tlab;

pub use self::global::SlidingHeap;
