//! The interface between the heap and the host runtime. A host embeds the
//! heap by providing one type that implements [`VMBinding`], bundling its
//! object model, root scanning, and runtime services.

mod collection;
mod object_model;
mod scanning;
pub mod slot;

pub use self::collection::{Collection, MetaspaceStats};
pub use self::object_model::ObjectModel;
pub use self::scanning::Scanning;
pub use self::slot::{SimpleSlot, Slot, SlotVisitor};

use crate::util::constants::BYTES_IN_WORD;

/// The umbrella trait a host implements to bind the heap into its runtime.
pub trait VMBinding: 'static + Sized + Send + Sync {
    type Slot: Slot;
    type ObjectModel: ObjectModel<Self>;
    type Scanning: Scanning<Self>;
    type Collection: Collection<Self>;

    /// Object alignment granule in bytes. Allocation sizes and TLAB sizes
    /// are rounded up to this. Must be a power-of-two multiple of the word
    /// size.
    const MIN_ALIGNMENT: usize = BYTES_IN_WORD;
}
