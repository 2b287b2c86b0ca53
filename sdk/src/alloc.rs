/// Raw memory source for every struct, array buffer and wire buffer the
/// runtime hands out.
///
/// # Safety
/// Implementations must behave like the C allocator: `malloc` returns null or
/// a block valid for `size` bytes and aligned for any scalar, a failing
/// `realloc` leaves the old block untouched, and `free` accepts null.
pub unsafe trait Allocator: Send + Sync {
    fn malloc(&self, size: usize) -> *mut u8;

    /// # Safety
    /// `ptr` must be null or a live block from this allocator.
    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8;

    /// # Safety
    /// `ptr` must be null or a live block from this allocator.
    unsafe fn free(&self, ptr: *mut u8);
}

/// The process allocator, through `libc`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

unsafe impl Allocator for SystemAllocator {
    fn malloc(&self, size: usize) -> *mut u8 {
        unsafe { libc::malloc(size) as *mut u8 }
    }

    unsafe fn realloc(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        libc::realloc(ptr as *mut libc::c_void, size) as *mut u8
    }

    unsafe fn free(&self, ptr: *mut u8) {
        libc::free(ptr as *mut libc::c_void)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_allocator_round_trip() {
        let a = SystemAllocator;
        unsafe {
            let p = a.malloc(4);
            assert!(!p.is_null());
            p.write_bytes(7, 4);
            let q = a.realloc(p, 64);
            assert!(!q.is_null());
            assert_eq!(*q.add(3), 7);
            a.free(q);
            a.free(std::ptr::null_mut());
        }
    }
}
