use std::fmt;

/// Divide, rounding up
pub const fn divroundup(num: usize, divisor: usize) -> usize {
    (num + divisor - 1) / divisor
}

/// Round `num` up to the next multiple of `multiple`
pub const fn roundto(num: usize, multiple: usize) -> usize {
    divroundup(num, multiple) * multiple
}

/// Pointer that prints as hex in `tracing` fields and `Debug` output
/// (and that can be sent between threads, unlike a raw pointer)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsizePtr(usize);

impl UsizePtr {
    pub fn addr(self) -> usize {
        self.0
    }
}

impl<T: ?Sized> From<*const T> for UsizePtr {
    fn from(value: *const T) -> Self {
        Self(value as *const () as usize)
    }
}
impl<T: ?Sized> From<*mut T> for UsizePtr {
    fn from(value: *mut T) -> Self {
        Self(value as *const () as usize)
    }
}
impl<T: ?Sized> From<&T> for UsizePtr {
    fn from(value: &T) -> Self {
        Self(value as *const T as *const () as usize)
    }
}

impl fmt::Debug for UsizePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Hint that the cache line at `p` is about to be read
///
/// Never faults, so `p` does not have to be dereferenceable.
#[inline(always)]
pub fn prefetch_read(p: *const u8) {
    #[cfg(target_arch = "x86_64")]
    unsafe {
        // safety: prefetch is only a hint and doesn't access memory architecturally
        use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
        _mm_prefetch::<_MM_HINT_T0>(p as *const i8);
    }
    #[cfg(not(target_arch = "x86_64"))]
    let _ = p;
}
