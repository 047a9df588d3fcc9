//! The side list of mark words displaced by forwarding records. Only marks
//! that cannot be rebuilt from class metadata are kept; everything else is
//! reinstalled as the default mark after the move.

use crate::plan::sliding::forwarding;
use crate::util::ObjectReference;
use crate::vm::{ObjectModel, VMBinding};

pub struct PreservedMarks {
    marks: Vec<(ObjectReference, usize)>,
}

impl PreservedMarks {
    pub fn new() -> Self {
        PreservedMarks { marks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Saves `mark` for `object` if the host reports it non-reconstructible.
    pub fn push_if_necessary<VM: VMBinding>(&mut self, object: ObjectReference, mark: usize) {
        debug_assert!(!forwarding::word_is_forwarded(mark));
        if VM::ObjectModel::must_preserve_mark(mark) {
            self.marks.push((object, mark));
        }
    }

    /// Redirects each entry to the object's forwardee, so restoration after
    /// the move phase targets the new copies.
    pub fn adjust_during_gc<VM: VMBinding>(&mut self) {
        for entry in self.marks.iter_mut() {
            if forwarding::is_forwarded::<VM>(entry.0) {
                entry.0 = forwarding::forwardee::<VM>(entry.0);
            }
        }
    }

    /// Writes every saved mark back onto its (possibly moved) object.
    pub fn restore<VM: VMBinding>(self) {
        for (object, mark) in self.marks {
            VM::ObjectModel::set_mark_word(object, mark);
        }
    }
}

impl Default for PreservedMarks {
    fn default() -> Self {
        Self::new()
    }
}
