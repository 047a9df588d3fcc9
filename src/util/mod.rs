pub mod address;
pub mod constants;
pub mod conversions;
pub mod gc_locker;
pub mod heap;
pub mod memory;
pub mod opaque_pointer;
pub mod options;
pub mod test_util;

pub use self::address::{Address, ObjectReference};
pub use self::opaque_pointer::{OpaquePointer, VMThread};
