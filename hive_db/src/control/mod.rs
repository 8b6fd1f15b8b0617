//! Per-slot control blocks
//!
//! Every slot in a page has one of these, stored in an array next to the
//! slots themselves (they are never heap allocated individually).
//!
//! The strong count and the slot generation share one AtomicU64,
//! bit packed as follows:
//! - `bits[31:0]` = strong count
//! - `bits[63:32]` = generation
//!
//! The generation is bumped every time an object is constructed in the slot
//! (and when a hive is torn down with objects still in it). A weak reference
//! remembers the generation it was created from, and upgrading compares it
//! in the same CAS that increments the strong count. That way a weak
//! reference can never be upgraded into whatever object later reuses the slot,
//! and it can never resurrect an object whose strong count has already hit zero
//! (there is no transition out of zero other than constructing a new object,
//! which changes the generation).
//!
//! NOTE: generations wrap after 2^32 objects have gone through the same slot.

use std::{fmt::Debug, ptr, sync::atomic::Ordering};

use crate::{loom_testing::*, util::UsizePtr};

const CB_STRONG_MASK: u64 = 0xFFFF_FFFF;
const CB_GEN_SHIFT: u32 = 32;
/// Strong counts above this abort the process, like `Arc` does
const CB_MAX_STRONG: u32 = u32::MAX / 2;

/// Extract the strong count
pub const fn cb_strong(x: u64) -> u32 {
    (x & CB_STRONG_MASK) as u32
}
/// Extract the generation
pub const fn cb_gen(x: u64) -> u32 {
    (x >> CB_GEN_SHIFT) as u32
}
const fn cb_pack(gen: u32, strong: u32) -> u64 {
    ((gen as u64) << CB_GEN_SHIFT) | strong as u64
}

#[cold]
fn refcount_overflow() -> ! {
    std::process::abort()
}

#[cold]
fn refcount_underflow() -> ! {
    debug_assert!(false, "strong count dropped below zero");
    std::process::abort()
}

#[repr(C)]
pub struct ControlBlock {
    /// Strong count and generation
    pub(crate) strong_and_gen: AtomicU64,
    /// Number of weak handles pointing at this slot
    ///
    /// This counts handles to any generation, since stale weak handles
    /// still point at the slot after it has been reused.
    pub(crate) weak: AtomicU32,
    /// The object, non-null iff the slot is Active or Zombie
    pub(crate) obj: AtomicPtr<u8>,
}

impl Debug for ControlBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let x = self.strong_and_gen.load(Ordering::Relaxed);
        f.debug_struct("ControlBlock")
            .field("@addr", &UsizePtr::from(self))
            .field("strong", &cb_strong(x))
            .field("gen", &cb_gen(x))
            .field("weak", &self.weak.load(Ordering::Relaxed))
            .field("obj", &UsizePtr::from(self.obj.load(Ordering::Relaxed)))
            .finish()
    }
}

impl ControlBlock {
    /// A block for an empty slot that has never held anything
    pub fn new() -> Self {
        Self {
            strong_and_gen: AtomicU64::new(0),
            weak: AtomicU32::new(0),
            obj: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn strong_count(&self) -> u32 {
        cb_strong(self.strong_and_gen.load(Ordering::Acquire))
    }

    pub fn generation(&self) -> u32 {
        cb_gen(self.strong_and_gen.load(Ordering::Acquire))
    }

    pub fn weak_count(&self) -> u32 {
        self.weak.load(Ordering::Acquire)
    }

    /// The object, or null if the slot is Free
    pub fn obj(&self) -> *mut u8 {
        self.obj.load(Ordering::Acquire)
    }

    /// Install a freshly constructed object, starting with `initial_strong` references
    ///
    /// Only valid on a block with a zero strong count (i.e. a Free slot).
    /// Returns the generation of the new object.
    pub(crate) fn activate(&self, obj: *mut u8, initial_strong: u32) -> u32 {
        let old = self.strong_and_gen.load(Ordering::Relaxed);
        debug_assert_eq!(cb_strong(old), 0);
        debug_assert!(!obj.is_null());
        let gen = cb_gen(old).wrapping_add(1);
        self.obj.store(obj, Ordering::Relaxed);
        // order: release so that anyone who upgrades (acquire) sees
        // the constructed object and the pointer to it
        self.strong_and_gen
            .store(cb_pack(gen, initial_strong), Ordering::Release);
        gen
    }

    /// Add a strong reference, given that the caller already holds one
    pub(crate) fn acquire_strong(&self) {
        // order: the caller's existing reference keeps the object alive,
        // so nothing needs to be synchronized here (same as Arc::clone)
        let prev = self.strong_and_gen.fetch_add(1, Ordering::Relaxed);
        if cb_strong(prev) >= CB_MAX_STRONG {
            refcount_overflow();
        }
    }

    /// Drop `n` strong references at once
    ///
    /// Returns `true` if that brought the count to zero, in which case the
    /// caller is now responsible for destroying the object.
    pub(crate) fn release_strong(&self, n: u32) -> bool {
        // order: release so that every use of the object through these references
        // happens-before the destruction, whichever thread ends up doing it
        let prev = self
            .strong_and_gen
            .fetch_sub(n as u64, Ordering::Release);
        let prev_strong = cb_strong(prev);
        if prev_strong < n {
            refcount_underflow();
        }
        if prev_strong != n {
            return false;
        }
        // order: synchronize-with all of the other releases (they are all RmW
        // operations on the same atomic and thus part of one release sequence)
        fence(Ordering::Acquire);
        true
    }

    /// Try to turn a weak reference from generation `gen` into a strong one
    ///
    /// Fails if the object has already hit a zero strong count, or if the slot
    /// now holds a different object.
    pub(crate) fn try_upgrade(&self, gen: u32) -> bool {
        let mut cur = self.strong_and_gen.load(Ordering::Relaxed);
        loop {
            if cb_gen(cur) != gen || cb_strong(cur) == 0 {
                return false;
            }
            if cb_strong(cur) >= CB_MAX_STRONG {
                refcount_overflow();
            }
            // order: acquire on success so the object contents published
            // by activate are visible to the new strong reference
            match self.strong_and_gen.compare_exchange_weak(
                cur,
                cur + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(x) => cur = x,
            }
        }
    }

    /// Take the object pointer out of a block whose strong count just hit zero
    pub(crate) fn retire(&self) -> *mut u8 {
        debug_assert_eq!(self.strong_count(), 0);
        self.obj.swap(ptr::null_mut(), Ordering::Relaxed)
    }

    /// Forcibly invalidate the object regardless of outstanding strong references
    ///
    /// Used when a hive is torn down. Bumps the generation so that nothing can
    /// upgrade into the (about to be destroyed) object, and returns its pointer.
    pub(crate) fn kill(&self) -> *mut u8 {
        let cur = self.strong_and_gen.load(Ordering::Relaxed);
        self.strong_and_gen
            .store(cb_pack(cb_gen(cur).wrapping_add(1), 0), Ordering::Release);
        self.obj.swap(ptr::null_mut(), Ordering::Relaxed)
    }

    pub(crate) fn acquire_weak(&self) {
        self.weak.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn release_weak(&self) {
        let prev = self.weak.fetch_sub(1, Ordering::Release);
        debug_assert!(prev > 0, "weak count dropped below zero");
    }
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
