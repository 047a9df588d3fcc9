use crate::util::ObjectReference;
use crate::vm::slot::SlotVisitor;
use crate::vm::VMBinding;

/// Host-specific knowledge about object layout. The heap treats objects as
/// opaque spans of words and reaches them only through this trait.
///
/// The collector temporarily repurposes the mark word as forwarding storage
/// during compaction, so `get_size` and `scan_object` must not consult the
/// mark word, and the low two bits of any mark word the host installs must
/// never read `0b11`.
pub trait ObjectModel<VM: VMBinding> {
    /// Object size in heap words. Must stay readable while the mark word
    /// holds a forwarding record.
    fn get_size(object: ObjectReference) -> usize;

    /// Visits every reference slot of the object.
    fn scan_object<SV: SlotVisitor<VM::Slot>>(object: ObjectReference, visitor: &mut SV);

    /// Reads the raw mark word.
    fn mark_word(object: ObjectReference) -> usize;

    /// Overwrites the raw mark word.
    fn set_mark_word(object: ObjectReference, word: usize);

    /// Reinstalls the default mark word, as for a freshly allocated object.
    fn init_mark(object: ObjectReference);

    /// Does this mark word carry state that cannot be recomputed from class
    /// metadata alone (identity hash, lock state, ...)? Such words are
    /// spilled to the preserved-marks list before being overwritten.
    fn must_preserve_mark(word: usize) -> bool;

    /// Hook invoked when the marker first discovers an object. Hosts with
    /// lazily materialized stack-chunk objects transform them here.
    fn transform_stack_chunk(_object: ObjectReference) {}

    /// Verifier hook: does this address hold a structurally sound object?
    fn is_well_formed(_object: ObjectReference) -> bool {
        true
    }
}
