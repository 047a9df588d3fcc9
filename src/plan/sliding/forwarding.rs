//! Forwarding records, stored inline in the mark word during compaction. A
//! word whose low two bits read `0b11` is a forwarding record; the rest of
//! the word is the forwardee address. Hosts guarantee that no ordinary mark
//! word carries that pattern (see `vm::ObjectModel`).

use crate::util::constants::BYTES_IN_WORD;
use crate::util::{Address, ObjectReference};
use crate::vm::{ObjectModel, VMBinding};

const FORWARDING_MASK: usize = 0b11;
const FORWARDED: usize = 0b11;

/// Records that `object` will move to `new_addr`, overwriting the mark word.
pub fn forward_to<VM: VMBinding>(object: ObjectReference, new_addr: Address) {
    debug_assert!(new_addr.is_aligned_to(BYTES_IN_WORD));
    debug_assert!(new_addr < object.to_address());
    VM::ObjectModel::set_mark_word(object, new_addr.as_usize() | FORWARDED);
}

pub fn is_forwarded<VM: VMBinding>(object: ObjectReference) -> bool {
    word_is_forwarded(VM::ObjectModel::mark_word(object))
}

pub fn word_is_forwarded(word: usize) -> bool {
    word & FORWARDING_MASK == FORWARDED
}

/// The address `object` will move to. Only valid while `is_forwarded` holds.
pub fn forwardee<VM: VMBinding>(object: ObjectReference) -> ObjectReference {
    let word = VM::ObjectModel::mark_word(object);
    debug_assert!(word_is_forwarded(word));
    unsafe { Address::from_usize(word & !FORWARDING_MASK).to_object_reference() }
}
