//! Strong and weak handles to pooled objects
//!
//! [ObjRef] is a counted strong reference. It borrows the hive that the object
//! lives in, so a hive can never be dropped while (non-leaked) strong
//! references into it exist. Strong references can be cloned, dropped and sent
//! to other threads. Dropping the last strong reference to an object that has
//! already been removed from its hive destroys the object on the spot, from
//! whichever thread that happens to be.
//!
//! [WeakRef] does not borrow anything. It keeps the *page* the object lives in
//! allocated (even past the end of the hive), but not the object itself.
//! Turning it back into an [ObjRef] requires the hive.

use std::{
    any::TypeId,
    fmt::Debug,
    marker::PhantomData,
    mem::ManuallyDrop,
    ops::Deref,
};

use crate::{
    class::{ClassInfo, Pooled},
    control::ControlBlock,
    hive::RawHive,
    page::{Page, SlotState},
    util::UsizePtr,
};

/// Type parameter of handles whose class is only known at runtime
pub enum Opaque {}

/// Strong reference to an object in a hive
pub struct ObjRef<'hive, T = Opaque> {
    page: Page,
    slot: u32,
    _p: PhantomData<(&'hive RawHive, *const T)>,
}
// safety: the reference counts are atomic, and a strong reference only
// hands out shared access to the object (so T must be Sync to send it)
unsafe impl<'hive, T: Send + Sync> Send for ObjRef<'hive, T> {}
// safety: as above
unsafe impl<'hive, T: Send + Sync> Sync for ObjRef<'hive, T> {}

impl<'hive, T> ObjRef<'hive, T> {
    /// Take over a strong reference that has already been counted
    pub(crate) unsafe fn from_counted(page: Page, slot: u32) -> Self {
        Self {
            page,
            slot,
            _p: PhantomData,
        }
    }

    /// Give up the handle without releasing its strong reference
    pub(crate) fn into_counted(this: Self) -> (Page, u32) {
        let this = ManuallyDrop::new(this);
        (this.page, this.slot)
    }

    #[inline]
    fn cb(&self) -> &ControlBlock {
        self.page.cb(self.slot)
    }

    /// Address of the object
    #[inline]
    pub fn as_ptr(this: &Self) -> *const u8 {
        this.page.slot_ptr(this.slot)
    }

    pub fn ptr_eq(this: &Self, other: &ObjRef<'_, impl Sized>) -> bool {
        Self::as_ptr(this) == ObjRef::as_ptr(other)
    }

    pub fn strong_count(this: &Self) -> u32 {
        this.cb().strong_count()
    }

    pub fn weak_count(this: &Self) -> u32 {
        this.cb().weak_count()
    }

    /// Generation of the slot that this object was constructed with
    pub fn generation(this: &Self) -> u32 {
        this.cb().generation()
    }

    /// Index of the slot within its page
    pub fn slot_index(this: &Self) -> u32 {
        this.slot
    }

    /// Is the object still in its hive (as opposed to removed but alive)?
    pub fn is_active(this: &Self) -> bool {
        this.page.state(this.slot) == SlotState::Active
    }

    pub fn class_info(this: &Self) -> &ClassInfo {
        // safety: we borrow the hive, so its factory is alive
        unsafe { this.page.factory().class_info() }
    }

    pub fn downgrade(this: &Self) -> WeakRef<T> {
        let gen = Self::generation(this);
        this.cb().acquire_weak();
        this.page.acquire_weak();
        WeakRef {
            page: this.page,
            slot: this.slot,
            gen,
            _p: PhantomData,
        }
    }

    /// Forget the Rust type of the object
    pub fn erase(this: Self) -> ObjRef<'hive, Opaque> {
        let (page, slot) = Self::into_counted(this);
        // safety: the reference we just released from `this` moves over
        unsafe { ObjRef::from_counted(page, slot) }
    }
}

impl<'hive> ObjRef<'hive, Opaque> {
    /// Recover the Rust type of the object, if it is a `U`
    pub fn downcast<U: Pooled>(this: Self) -> Result<ObjRef<'hive, U>, Self> {
        // safety: we borrow the hive, so its factory is alive
        let ty = unsafe { this.page.factory().instance_type() };
        if ty != Some(TypeId::of::<U>()) {
            return Err(this);
        }
        let (page, slot) = Self::into_counted(this);
        // safety: the factory promises that its instances are `U`s
        Ok(unsafe { ObjRef::from_counted(page, slot) })
    }
}

impl<'hive, T> Clone for ObjRef<'hive, T> {
    fn clone(&self) -> Self {
        self.cb().acquire_strong();
        Self {
            page: self.page,
            slot: self.slot,
            _p: PhantomData,
        }
    }
}

impl<'hive, T> Drop for ObjRef<'hive, T> {
    fn drop(&mut self) {
        // an Active object is also referenced by its hive,
        // so if this is the last reference the object must be a zombie
        if self.cb().release_strong(1) {
            self.page.reclaim_remote(self.slot);
        }
    }
}

impl<'hive, T: Pooled> Deref for ObjRef<'hive, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // safety: we hold a strong reference so the object is alive,
        // and the type was checked when this handle was made
        unsafe { &*(self.page.slot_ptr(self.slot) as *const T) }
    }
}

impl<'hive, T> Debug for ObjRef<'hive, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjRef")
            .field("@addr", &UsizePtr::from(Self::as_ptr(self)))
            .field("slot", &self.slot)
            .field("cb", self.cb())
            .finish()
    }
}

/// Weak reference to an object in a hive
///
/// Remembers the generation of the object, so it can never be upgraded into
/// whatever object later reuses the same slot.
pub struct WeakRef<T = Opaque> {
    page: Page,
    slot: u32,
    gen: u32,
    _p: PhantomData<*const T>,
}
// safety: all access goes through atomics, and upgrading needs the hive
unsafe impl<T: Send + Sync> Send for WeakRef<T> {}
// safety: as above
unsafe impl<T: Send + Sync> Sync for WeakRef<T> {}

impl<T> WeakRef<T> {
    #[inline]
    fn cb(&self) -> &ControlBlock {
        self.page.cb(self.slot)
    }

    /// Generation of the object this refers to
    pub fn generation(&self) -> u32 {
        self.gen
    }

    pub fn slot_index(&self) -> u32 {
        self.slot
    }

    /// Does the object still exist?
    ///
    /// Only a hint if other threads are dropping strong references at the same time.
    pub fn is_alive(&self) -> bool {
        let cb = self.cb();
        cb.generation() == self.gen && cb.strong_count() != 0
    }

    /// Get a strong reference, if the object still exists
    ///
    /// `hive` must be the hive the object was created in, or this returns `None`.
    pub fn upgrade<'hive, H: AsRef<RawHive> + ?Sized>(
        &self,
        hive: &'hive H,
    ) -> Option<ObjRef<'hive, T>> {
        if !hive.as_ref().owns_page(self.page) {
            return None;
        }
        if !self.cb().try_upgrade(self.gen) {
            return None;
        }
        // safety: try_upgrade counted the reference
        Some(unsafe { ObjRef::from_counted(self.page, self.slot) })
    }
}

impl<T> Clone for WeakRef<T> {
    fn clone(&self) -> Self {
        self.cb().acquire_weak();
        self.page.acquire_weak();
        Self {
            page: self.page,
            slot: self.slot,
            gen: self.gen,
            _p: PhantomData,
        }
    }
}

impl<T> Drop for WeakRef<T> {
    fn drop(&mut self) {
        self.cb().release_weak();
        // safety: nothing touches the page after this
        unsafe {
            self.page.release_weak();
        }
    }
}

impl<T> Debug for WeakRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakRef")
            .field("page", &self.page.addr())
            .field("slot", &self.slot)
            .field("gen", &self.gen)
            .finish()
    }
}
