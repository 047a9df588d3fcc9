use crate::util::{Address, ObjectReference};
use std::fmt::Debug;

/// An abstract reference slot: a memory location holding a (possibly
/// encoded) reference. The collector only ever loads and rewrites slots
/// through this trait, so the host decides the representation. A host with
/// both full-width and half-width compressed slots implements `Slot` on a
/// tagged enum over the two and dispatches in `load`/`store`.
pub trait Slot: Copy + PartialEq + Debug {
    /// Loads and decodes the reference; `None` for a null slot.
    fn load(&self) -> Option<ObjectReference>;

    /// Encodes and stores `object` into the slot.
    fn store(&self, object: ObjectReference);
}

/// A full-word slot holding an uncompressed reference, null encoded as zero.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SimpleSlot {
    slot_addr: Address,
}

impl SimpleSlot {
    pub fn from_address(address: Address) -> Self {
        SimpleSlot { slot_addr: address }
    }

    pub fn as_address(&self) -> Address {
        self.slot_addr
    }
}

impl Slot for SimpleSlot {
    fn load(&self) -> Option<ObjectReference> {
        let value = unsafe { self.slot_addr.load::<Address>() };
        if value.is_zero() {
            None
        } else {
            Some(unsafe { value.to_object_reference() })
        }
    }

    fn store(&self, object: ObjectReference) {
        unsafe { self.slot_addr.store(object.to_address()) }
    }
}

impl Debug for SimpleSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SimpleSlot({})", self.slot_addr)
    }
}

/// Callback capability handed to every root walk and object scan. One
/// visitor type serves marking, pointer adjustment, and verification.
pub trait SlotVisitor<SL: Slot> {
    fn visit_slot(&mut self, slot: SL);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_slot_roundtrip() {
        let mut cell: usize = 0;
        let slot = SimpleSlot::from_address(Address::from_mut_ptr(&mut cell));
        assert_eq!(slot.load(), None);

        let fake = unsafe { Address::from_usize(0x1000).to_object_reference() };
        slot.store(fake);
        assert_eq!(slot.load(), Some(fake));
        assert_eq!(cell, 0x1000);
    }
}
