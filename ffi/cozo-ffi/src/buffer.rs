///
/// Engine-owned string buffers.
///
/// Every non-null `char *` returned by the engine is wrapped in a
/// `ForeignStr` immediately after the call. The buffer is handed back to
/// `cozo_free_str` when the wrapper drops, which covers early returns,
/// decode failures and unwinding alike. Contents are copied out through
/// `to_bytes`/`into_bytes` before that happens.
///

use std::ffi::{CStr, c_char};
use std::ptr::NonNull;

use crate::abi::FreeStrFn;

pub struct ForeignStr {
    ptr: NonNull<c_char>,
    free: FreeStrFn,
}

impl ForeignStr {
    /// Take ownership of an engine-allocated string.
    ///
    /// Returns `None` for a null pointer, in which case there is nothing to
    /// free.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a NUL-terminated string allocated by the engine
    /// that `free` belongs to, not yet freed and not owned by anyone else.
    pub unsafe fn from_raw(ptr: *mut c_char, free: FreeStrFn) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr, free })
    }

    /// Borrow the contents without the trailing NUL.
    pub fn to_bytes(&self) -> &[u8] {
        unsafe { CStr::from_ptr(self.ptr.as_ptr()) }.to_bytes()
    }

    /// Copy the contents into host memory and free the engine buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    pub fn into_string_lossy(self) -> String {
        String::from_utf8_lossy(self.to_bytes()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.to_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ForeignStr {
    fn drop(&mut self) {
        tracing::trace!(ptr = ?self.ptr, "releasing engine buffer");
        unsafe { (self.free)(self.ptr.as_ptr()) }
    }
}

impl std::fmt::Debug for ForeignStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignStr")
            .field("ptr", &self.ptr)
            .field("len", &self.len())
            .finish()
    }
}
