use std::marker::PhantomData;

/// An opaque pointer to host-side data the heap never dereferences, such as
/// a thread handle. Carried through the API and handed back to the host.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OpaquePointer(*mut std::ffi::c_void, PhantomData<()>);

// The heap only passes these values around.
unsafe impl Send for OpaquePointer {}
unsafe impl Sync for OpaquePointer {}

impl OpaquePointer {
    pub const UNINITIALIZED: Self = OpaquePointer(std::ptr::null_mut(), PhantomData);

    pub fn from_address(addr: crate::util::Address) -> Self {
        OpaquePointer(addr.to_mut_ptr(), PhantomData)
    }
}

/// A host mutator thread, as an opaque handle.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VMThread(pub OpaquePointer);

impl VMThread {
    pub const UNINITIALIZED: Self = VMThread(OpaquePointer::UNINITIALIZED);
}
