use crate::vm::slot::SlotVisitor;
use crate::vm::VMBinding;

/// Host-side root enumeration. The collector drives these walks in a fixed
/// order, single-threaded, with one visitor per pass (see
/// `plan::sliding::collect::process_roots`).
///
/// Weak roots are visited with the same visitor as strong roots: this
/// collector never clears references, so weak storages are traced as if
/// they were strong.
pub trait Scanning<VM: VMBinding> {
    /// Claims the host's single-threaded root-scan token. Balanced by
    /// `release_root_scan_token` after the walks complete.
    fn claim_root_scan_token();

    fn release_root_scan_token();

    /// Roots registered in the host's strong reference storages.
    fn scan_strong_roots<SV: SlotVisitor<VM::Slot>>(visitor: &mut SV);

    /// The class-loader data graph.
    fn scan_class_loader_roots<SV: SlotVisitor<VM::Slot>>(visitor: &mut SV);

    /// References held in mutator thread stacks.
    fn scan_thread_roots<SV: SlotVisitor<VM::Slot>>(visitor: &mut SV);

    /// References embedded in compiled code. When `update` is set the
    /// walker must rewrite the embedded pointers in place, not just visit
    /// them.
    fn scan_code_roots<SV: SlotVisitor<VM::Slot>>(visitor: &mut SV, update: bool);

    /// Weak reference storages, scanned as strong.
    fn scan_weak_roots<SV: SlotVisitor<VM::Slot>>(visitor: &mut SV);
}
