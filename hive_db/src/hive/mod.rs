//! Hives: growable pools of same-class objects
//!
//! [RawHive] stores objects of whatever class its [ObjectFactory] constructs
//! and hands out type-erased handles. [Hive] is a zero-cost typed view of a
//! `RawHive` whose factory is known to produce `T`s.
//!
//! Structural operations (adding, removing, iterating) take `&self` and can only
//! happen on the thread that currently has the hive, since hives are `Send` but
//! not `Sync`. Strong and weak handles can go anywhere.

use std::{
    any::{type_name, TypeId},
    cell::{Cell, RefCell},
    fmt::Debug,
    marker::PhantomData,
    ops::Deref,
    sync::{atomic, Arc},
};

use tracing::Level;

use crate::{
    class::{ClassInfo, DefaultFactory, FnFactory, ObjectFactory, Pooled},
    config::HiveConfig,
    error::{HiveError, Result},
    handle::{ObjRef, Opaque},
    page::{Page, SlotLayout, SlotState},
    util::UsizePtr,
};

/// Hive ids are never reused, so a page can always tell which hive made it
static NEXT_HIVE_ID: atomic::AtomicU64 = atomic::AtomicU64::new(1);

/// Location of an object inside a hive
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId {
    /// Index of the page, in the order the pages were created
    pub page: usize,
    /// Index of the slot within that page
    pub slot: u32,
}

/// Marks a hive as being iterated, which rules out removing objects
struct IterGuard<'a>(&'a Cell<u32>);

impl<'a> IterGuard<'a> {
    fn new(depth: &'a Cell<u32>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl<'a> Drop for IterGuard<'a> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Pool of objects of one class, with the class only known at runtime
pub struct RawHive {
    id: u64,
    factory: Arc<dyn ObjectFactory>,
    info: ClassInfo,
    slot: SlotLayout,
    config: HiveConfig,
    /// Pages in creation order (never removed until the hive is dropped)
    pages: RefCell<Vec<Page>>,
    /// Index of the page that the last allocation came from
    current: Cell<usize>,
    total_capacity: Cell<usize>,
    iter_depth: Cell<u32>,
}

impl Debug for RawHive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHive")
            .field("@addr", &UsizePtr::from(self))
            .field("id", &self.id)
            .field("class", &self.info)
            .field("slot", &self.slot)
            .field("pages", &self.pages.borrow())
            .field("current", &self.current.get())
            .field("total_capacity", &self.total_capacity.get())
            .finish()
    }
}

impl AsRef<RawHive> for RawHive {
    fn as_ref(&self) -> &RawHive {
        self
    }
}

impl RawHive {
    pub fn new(factory: Arc<dyn ObjectFactory>) -> Self {
        Self::with_config(factory, HiveConfig::default())
    }

    pub fn with_config(factory: Arc<dyn ObjectFactory>, config: HiveConfig) -> Self {
        let info = *factory.class_info();
        let slot = SlotLayout::for_class(info.layout);
        let id = NEXT_HIVE_ID.fetch_add(1, atomic::Ordering::Relaxed);
        tracing::event!(
            Level::DEBUG,
            id,
            class = info.name,
            uid = %info.uid,
            slot_size = slot.size,
            slot_align = slot.align,
            "new hive"
        );
        Self {
            id,
            factory,
            info,
            slot,
            config,
            pages: RefCell::new(Vec::new()),
            current: Cell::new(0),
            total_capacity: Cell::new(0),
            iter_depth: Cell::new(0),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class_info(&self) -> &ClassInfo {
        &self.info
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    pub fn factory(&self) -> &Arc<dyn ObjectFactory> {
        &self.factory
    }

    pub fn slot_layout(&self) -> SlotLayout {
        self.slot
    }

    /// Rust type of the objects, if the factory reports one
    pub fn instance_type(&self) -> Option<TypeId> {
        self.factory.instance_type()
    }

    pub(crate) fn owns_page(&self, page: Page) -> bool {
        page.owner() == self.id
    }

    fn assert_not_iterating(&self) {
        assert!(
            self.iter_depth.get() == 0,
            "cannot remove objects from a hive while iterating over it"
        );
    }

    /// Allocate a new page and take its first slot
    fn grow(&self) -> (Page, u32) {
        let capacity = self.config.next_page_capacity(self.total_capacity.get());
        let page = Page::new(capacity, self.slot, Arc::as_ptr(&self.factory), self.id);
        let mut pages = self.pages.borrow_mut();
        pages.push(page);
        self.current.set(pages.len() - 1);
        self.total_capacity
            .set(self.total_capacity.get() + capacity);
        tracing::event!(
            Level::DEBUG,
            hive = self.id,
            page = ?page.addr(),
            page_i = pages.len() - 1,
            capacity,
            total_capacity = self.total_capacity.get(),
            "grew hive"
        );
        match page.pop_free() {
            Some(slot) => (page, slot),
            None => unreachable!("fresh page has no free slots"),
        }
    }

    /// Find a free slot, growing if there isn't one
    fn take_slot(&self) -> (Page, u32) {
        {
            let pages = self.pages.borrow();
            let current = self.current.get();
            if let Some(&page) = pages.get(current) {
                if let Some(slot) = page.pop_free() {
                    return (page, slot);
                }
            }
            for (page_i, &page) in pages.iter().enumerate() {
                if page_i == current {
                    continue;
                }
                if let Some(slot) = page.pop_free() {
                    self.current.set(page_i);
                    return (page, slot);
                }
            }
        }
        self.grow()
    }

    /// Construct a new object with the factory
    pub fn add_raw(&self) -> ObjRef<'_, Opaque> {
        let trace_span = tracing::span!(Level::TRACE, "hive::add", hive = self.id);
        let _span_enter = trace_span.enter();

        let (page, slot) = self.take_slot();
        // one reference for the hive, one for the returned handle
        let gen = page.construct(slot, 2);
        tracing::event!(
            Level::TRACE,
            ptr = ?UsizePtr::from(page.slot_ptr(slot)),
            slot,
            gen
        );
        // safety: construct counted the handle's reference
        unsafe { ObjRef::from_counted(page, slot) }
    }

    /// Find the page and slot starting exactly at `ptr`
    fn locate(&self, ptr: *const u8) -> Option<(usize, Page, u32)> {
        let addr = ptr as usize;
        self.pages
            .borrow()
            .iter()
            .enumerate()
            .find(|(_, page)| page.contains_addr(addr))
            .and_then(|(page_i, &page)| page.slot_index_of(addr).map(|slot| (page_i, page, slot)))
    }

    /// Which page and slot does the object at `ptr` live in?
    ///
    /// Only succeeds for the exact start of a slot. Free slots are found too.
    pub fn find_slot(&self, ptr: *const u8) -> Option<SlotId> {
        self.locate(ptr)
            .map(|(page, _, slot)| SlotId { page, slot })
    }

    /// State of the slot at `ptr`, if it belongs to this hive
    pub fn slot_state(&self, ptr: *const u8) -> Option<SlotState> {
        self.locate(ptr).map(|(_, page, slot)| page.state(slot))
    }

    /// Is `ptr` a live (Active or Zombie) object of this hive?
    pub fn contains(&self, ptr: *const u8) -> bool {
        matches!(
            self.slot_state(ptr),
            Some(SlotState::Active | SlotState::Zombie)
        )
    }

    /// Is `ptr` an object of this hive that has not been removed?
    pub fn is_active(&self, ptr: *const u8) -> bool {
        self.slot_state(ptr) == Some(SlotState::Active)
    }

    /// Take an Active object out of the hive, dropping `n` references to it
    fn retire_slot(&self, page: Page, slot: u32, n: u32) {
        page.make_zombie(slot);
        if page.cb(slot).release_strong(n) {
            page.reclaim_local(slot);
            tracing::event!(Level::TRACE, slot, "destroyed");
        } else {
            tracing::event!(
                Level::TRACE,
                slot,
                strong = page.cb(slot).strong_count(),
                "zombie"
            );
        }
    }

    /// Remove an object, consuming a handle to it
    ///
    /// If other strong references still exist, the object stays alive
    /// (but is no longer iterated) until the last one is dropped.
    ///
    /// Panics if called while iterating over the hive.
    pub fn remove<T>(&self, obj: ObjRef<'_, T>) -> Result<()> {
        self.assert_not_iterating();
        let trace_span = tracing::span!(
            Level::TRACE,
            "hive::remove",
            hive = self.id,
            ptr = ?UsizePtr::from(ObjRef::as_ptr(&obj))
        );
        let _span_enter = trace_span.enter();

        let Some((_, page, slot)) = self.locate(ObjRef::as_ptr(&obj)) else {
            return Err(HiveError::NotFound);
        };
        if page.state(slot) != SlotState::Active {
            return Err(HiveError::NotActive);
        }
        let _ = ObjRef::into_counted(obj);
        // the hive's reference and the one from the handle
        self.retire_slot(page, slot, 2);
        Ok(())
    }

    /// Remove the object at `ptr`
    ///
    /// Like [remove](Self::remove), except only the hive's own reference is dropped.
    pub fn remove_ptr(&self, ptr: *const u8) -> Result<()> {
        self.assert_not_iterating();
        let trace_span = tracing::span!(
            Level::TRACE,
            "hive::remove_ptr",
            hive = self.id,
            ptr = ?UsizePtr::from(ptr)
        );
        let _span_enter = trace_span.enter();

        let Some((_, page, slot)) = self.locate(ptr) else {
            return Err(HiveError::NotFound);
        };
        if page.state(slot) != SlotState::Active {
            return Err(HiveError::NotActive);
        }
        self.retire_slot(page, slot, 1);
        Ok(())
    }

    /// Get a new strong reference to the Active object at `ptr`
    pub fn handle_of_raw(&self, ptr: *const u8) -> Option<ObjRef<'_, Opaque>> {
        let (_, page, slot) = self.locate(ptr)?;
        if page.state(slot) != SlotState::Active {
            return None;
        }
        // the hive's own reference keeps the object alive while we do this
        page.cb(slot).acquire_strong();
        // safety: we just counted the reference
        Some(unsafe { ObjRef::from_counted(page, slot) })
    }

    /// Remove every Active object
    ///
    /// Objects that are still strongly referenced become zombies.
    pub fn clear(&self) {
        self.assert_not_iterating();
        let trace_span = tracing::span!(Level::TRACE, "hive::clear", hive = self.id);
        let _span_enter = trace_span.enter();

        // destructors may add to or remove from this hive,
        // so nothing can stay borrowed while they run
        let mut victims = Vec::with_capacity(self.active_count());
        for &page in self.pages.borrow().iter() {
            page.for_each_active(0, |slot, _| {
                victims.push((page, slot, page.cb(slot).generation()))
            });
        }
        for (page, slot, gen) in victims {
            // skip anything a destructor already removed (or replaced)
            if page.state(slot) == SlotState::Active && page.cb(slot).generation() == gen {
                self.retire_slot(page, slot, 1);
            }
        }
        self.current.set(0);
    }

    /// Number of live (Active or Zombie) objects
    pub fn size(&self) -> usize {
        self.pages.borrow().iter().map(|page| page.live_count()).sum()
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    /// Number of Active objects
    pub fn active_count(&self) -> usize {
        self.pages
            .borrow()
            .iter()
            .map(|page| page.active_count())
            .sum()
    }

    /// Total number of slots across every page
    pub fn capacity(&self) -> usize {
        self.total_capacity.get()
    }

    pub fn page_count(&self) -> usize {
        self.pages.borrow().len()
    }

    /// Call `f` with the address of every Active object
    ///
    /// Objects may be added while iterating (and may or may not be visited),
    /// but removing objects panics.
    pub fn for_each_raw(&self, mut f: impl FnMut(*mut u8)) {
        let _guard = IterGuard::new(&self.iter_depth);
        let prefetch_distance = self.config.prefetch_distance;
        let mut page_i = 0;
        loop {
            // re-borrow every page, since `f` is allowed to grow the hive
            let Some(page) = self.pages.borrow().get(page_i).copied() else {
                break;
            };
            page.for_each_active(prefetch_distance, |_, obj| f(obj));
            page_i += 1;
        }
    }

    /// Call `f` with the address of the field at `offset` inside every Active object
    ///
    /// # Safety
    ///
    /// `offset` must be inside the object, and whatever `f` does with the
    /// pointer must be allowed by the class
    pub unsafe fn for_each_state_raw(&self, offset: usize, mut f: impl FnMut(*mut u8)) {
        assert!(offset < self.slot.size, "state offset outside of the object");
        self.for_each_raw(|obj| f(obj.add(offset)));
    }

    /// Panic if any page is inconsistent, or if pages overlap
    ///
    /// Only valid when no other thread holds handles into the hive.
    pub fn _debug_check_invariants(&self) {
        let pages = self.pages.borrow();
        let mut total_capacity = 0;
        let mut ranges = Vec::with_capacity(pages.len());
        for &page in pages.iter() {
            page._debug_check_invariants();
            assert_eq!(page.owner(), self.id, "page {:?} is not ours", page);
            assert_eq!(page.slot_layout(), self.slot);
            total_capacity += page.capacity();
            let start = page.slot_ptr(0) as usize;
            ranges.push((start, start + page.capacity() * self.slot.size));
        }
        assert_eq!(total_capacity, self.total_capacity.get());
        assert!(pages.is_empty() || self.current.get() < pages.len());

        ranges.sort();
        for w in ranges.windows(2) {
            assert!(w[0].1 <= w[1].0, "pages overlap");
        }
    }
}

impl Drop for RawHive {
    fn drop(&mut self) {
        let trace_span = tracing::span!(Level::TRACE, "hive::drop", hive = self.id);
        let _span_enter = trace_span.enter();

        let mut orphaned = 0;
        for page in self.pages.get_mut().drain(..) {
            // safety: we own the page and never touch it again
            if !unsafe { page.teardown() } {
                orphaned += 1;
            }
        }
        tracing::event!(
            Level::DEBUG,
            hive = self.id,
            class = self.info.name,
            orphaned,
            "dropped hive"
        );
    }
}

/// Pool of `T`s
///
/// This is a [RawHive] which has been checked to construct `T`s, and it
/// dereferences to one for everything that doesn't care about the type.
#[repr(transparent)]
pub struct Hive<T: Pooled> {
    raw: RawHive,
    _p: PhantomData<fn() -> T>,
}

impl<T: Pooled> Debug for Hive<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Hive").field(&self.raw).finish()
    }
}

impl<T: Pooled> Deref for Hive<T> {
    type Target = RawHive;

    fn deref(&self) -> &RawHive {
        &self.raw
    }
}

impl<T: Pooled> AsRef<RawHive> for Hive<T> {
    fn as_ref(&self) -> &RawHive {
        &self.raw
    }
}

impl<T: Pooled + Default> Default for Hive<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_type<T: Pooled>(raw: &RawHive) -> Result<()> {
    if raw.instance_type() == Some(TypeId::of::<T>()) {
        Ok(())
    } else {
        Err(HiveError::ClassMismatch {
            uid: raw.class_info().uid,
            expected: type_name::<T>(),
            found: raw.class_info().name,
        })
    }
}

impl<T: Pooled + Default> Hive<T> {
    pub fn new() -> Self {
        Self::with_config(HiveConfig::default())
    }

    pub fn with_config(config: HiveConfig) -> Self {
        Self {
            raw: RawHive::with_config(Arc::new(DefaultFactory::<T>::new()), config),
            _p: PhantomData,
        }
    }
}

impl<T: Pooled> Hive<T> {
    /// Hive whose objects are constructed by calling `init`
    pub fn with_initializer(
        init: impl Fn() -> T + Send + Sync + 'static,
        config: HiveConfig,
    ) -> Self {
        Self {
            raw: RawHive::with_config(Arc::new(FnFactory::new(init)), config),
            _p: PhantomData,
        }
    }

    /// Take over a raw hive, if its factory constructs `T`s
    pub fn try_from_raw(raw: RawHive) -> std::result::Result<Self, (RawHive, HiveError)> {
        match check_type::<T>(&raw) {
            Ok(()) => Ok(Self {
                raw,
                _p: PhantomData,
            }),
            Err(e) => Err((raw, e)),
        }
    }

    pub fn from_raw(raw: &RawHive) -> Result<&Self> {
        check_type::<T>(raw)?;
        // safety: repr(transparent), and we just checked the type
        Ok(unsafe { &*(raw as *const RawHive as *const Self) })
    }

    pub fn from_raw_mut(raw: &mut RawHive) -> Result<&mut Self> {
        check_type::<T>(raw)?;
        // safety: repr(transparent), and we just checked the type
        Ok(unsafe { &mut *(raw as *mut RawHive as *mut Self) })
    }

    pub fn into_raw(self) -> RawHive {
        self.raw
    }

    pub fn as_raw(&self) -> &RawHive {
        &self.raw
    }

    /// Construct a new `T` in the hive
    pub fn add(&self) -> ObjRef<'_, T> {
        let obj = self.raw.add_raw();
        match ObjRef::downcast::<T>(obj) {
            Ok(obj) => obj,
            Err(_) => unreachable!("typed hive produced an object of another type"),
        }
    }

    /// Get a new strong reference to `obj`, if it is an Active object of this hive
    pub fn handle_of(&self, obj: &T) -> Option<ObjRef<'_, T>> {
        let obj = self.raw.handle_of_raw(obj as *const T as *const u8)?;
        ObjRef::downcast::<T>(obj).ok()
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        self.raw.for_each_raw(|obj| {
            // safety: every Active object is a T, and only shared references exist
            f(unsafe { &*(obj as *const T) })
        });
    }

    /// Like [for_each](Self::for_each), but with exclusive access
    ///
    /// Having `&mut self` means no handles into the hive exist.
    pub fn for_each_mut(&mut self, mut f: impl FnMut(&mut T)) {
        self.raw.for_each_raw(|obj| {
            // safety: every Active object is a T, and no other references
            // can exist while we hold &mut self
            f(unsafe { &mut *(obj as *mut T) })
        });
    }

    /// Call `f` with the `S` at byte offset `offset` inside every Active `T`
    ///
    /// # Safety
    ///
    /// There must be a field of type `S` at `offset` in `T`
    pub unsafe fn for_each_state<S>(&self, offset: usize, mut f: impl FnMut(&S)) {
        self.raw
            .for_each_state_raw(offset, |state| f(&*(state as *const S)));
    }

    /// Like [for_each_state](Self::for_each_state), but with exclusive access
    ///
    /// # Safety
    ///
    /// There must be a field of type `S` at `offset` in `T`
    pub unsafe fn for_each_state_mut<S>(&mut self, offset: usize, mut f: impl FnMut(&mut S)) {
        self.raw
            .for_each_state_raw(offset, |state| f(&mut *(state as *mut S)));
    }
}
