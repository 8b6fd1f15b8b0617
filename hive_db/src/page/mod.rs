//! Pages of slots
//!
//! A page is a single aligned allocation laid out as follows:
//!
//! ```text
//! [PageHeader][ControlBlock; cap][u64 active mask; ceil(cap / 64)][AtomicU8 state; cap][slots]
//! ```
//!
//! Free slots are threaded into two intrusive lists of slot indices
//! (stored in the slot memory itself, see [FreeSlot]):
//! * the local free list, which only the thread owning the hive touches
//! * the reclaim list, onto which any thread may push a slot after it drops
//!   the last strong reference to a removed ("zombie") object
//!
//! When the local free list runs dry, the owner takes the entire reclaim list
//! in one atomic swap. This is the same split as mimalloc's local and remote
//! free lists, except that slots are named by index rather than by pointer.
//!
//! The active bitmask has bit `i` set iff slot `i` is Active. It is only ever
//! touched by the owning thread (by the time another thread can reclaim a slot,
//! its bit has already been cleared by `remove`).
//!
//! Pages can outlive the hive that created them. If weak references into a
//! page are still outstanding when the hive is dropped, the page is marked
//! orphaned in [PageHeader::ownership] and the last weak reference to be
//! released frees it.

use std::{
    alloc::{self, Layout},
    cell::Cell,
    cmp,
    collections::HashSet,
    fmt::Debug,
    mem::{self, align_of, size_of},
    ptr::{self, NonNull},
    sync::atomic::Ordering,
};

use tracing::Level;

use crate::{
    class::ObjectFactory,
    control::ControlBlock,
    loom_testing::*,
    util::{divroundup, prefetch_read, roundto, UsizePtr},
};

/// Terminates the intrusive free lists
pub const FREE_LIST_END: u32 = u32::MAX;
/// Largest number of slots a single page can hold
///
/// Well below [FREE_LIST_END] so that slot indices never collide with it.
pub const MAX_SLOTS_PER_PAGE: usize = 1 << 24;
const _: () = assert!(MAX_SLOTS_PER_PAGE < FREE_LIST_END as usize);

/// Lifecycle state of one slot
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Nothing constructed, on one of the free lists
    Free = 0,
    /// Constructed, visible to iteration
    Active = 1,
    /// Constructed and removed from the hive, but still strongly referenced
    Zombie = 2,
}

impl SlotState {
    fn from_u8(x: u8) -> Self {
        match x {
            0 => SlotState::Free,
            1 => SlotState::Active,
            2 => SlotState::Zombie,
            _ => panic!("Illegal slot state {} encountered", x),
        }
    }
}

/// Top bit of [PageHeader::ownership]; the remaining bits count weak references
const OWNERSHIP_ORPHANED: usize = 1 << (usize::BITS - 1);
const OWNERSHIP_WEAK_MASK: usize = !OWNERSHIP_ORPHANED;

/// Who is responsible for freeing a page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageOwnership {
    /// The page belongs to a live hive, which will free it
    Owned { weak: usize },
    /// The hive is gone, and the last of `pending_weak` weak references frees the page
    Orphaned { pending_weak: usize },
}

impl PageOwnership {
    pub fn decode(x: usize) -> Self {
        let weak = x & OWNERSHIP_WEAK_MASK;
        if x & OWNERSHIP_ORPHANED != 0 {
            PageOwnership::Orphaned { pending_weak: weak }
        } else {
            PageOwnership::Owned { weak }
        }
    }
}

/// Contents of a slot when it is free
#[repr(C)]
struct FreeSlot {
    /// Index of the next free slot, or [FREE_LIST_END]
    ///
    /// Atomic because slots on the reclaim list are linked by other threads.
    /// The push onto the list head publishes the link.
    next: AtomicU32,
}

/// Size and alignment of each slot of a hive
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotLayout {
    pub size: usize,
    pub align: usize,
}

impl SlotLayout {
    /// Slots need to be able to hold either an object or a free list link
    pub fn for_class(layout: Layout) -> Self {
        let align = cmp::max(layout.align(), align_of::<FreeSlot>());
        let size = roundto(cmp::max(layout.size(), size_of::<FreeSlot>()), align);
        Self { size, align }
    }
}

#[cold]
fn page_too_large() -> ! {
    panic!("page layout overflows the address space")
}

/// Byte offsets of everything inside a page allocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLayout {
    /// Layout of the entire allocation
    pub layout: Layout,
    pub capacity: usize,
    pub mask_words: usize,
    pub cbs_offs: usize,
    pub mask_offs: usize,
    pub states_offs: usize,
    pub slots_offs: usize,
}

impl PageLayout {
    pub fn new(capacity: usize, slot: SlotLayout) -> Self {
        assert!(capacity > 0, "page capacity must be greater than zero");
        assert!(capacity <= MAX_SLOTS_PER_PAGE, "page capacity too large");

        let mask_words = divroundup(capacity, 64);
        let hdr = Layout::new::<PageHeader>();
        let cbs = Layout::array::<ControlBlock>(capacity).unwrap_or_else(|_| page_too_large());
        let mask = Layout::array::<u64>(mask_words).unwrap_or_else(|_| page_too_large());
        let states = Layout::array::<AtomicU8>(capacity).unwrap_or_else(|_| page_too_large());
        let slots = slot
            .size
            .checked_mul(capacity)
            .and_then(|sz| Layout::from_size_align(sz, slot.align).ok())
            .unwrap_or_else(|| page_too_large());

        let (layout, cbs_offs) = hdr.extend(cbs).unwrap_or_else(|_| page_too_large());
        let (layout, mask_offs) = layout.extend(mask).unwrap_or_else(|_| page_too_large());
        let (layout, states_offs) = layout.extend(states).unwrap_or_else(|_| page_too_large());
        let (layout, slots_offs) = layout.extend(slots).unwrap_or_else(|_| page_too_large());

        Self {
            layout: layout.pad_to_align(),
            capacity,
            mask_words,
            cbs_offs,
            mask_offs,
            states_offs,
            slots_offs,
        }
    }
}

/// Header at the start of every page allocation
#[repr(C)]
pub struct PageHeader {
    layout: PageLayout,
    slot: SlotLayout,
    /// Head of the local free list (owner only)
    free_head: Cell<u32>,
    /// Head of the list that any thread reclaims zombie slots onto
    reclaim_head: AtomicU32,
    /// Number of Active plus Zombie slots
    live_count: AtomicUsize,
    /// Packed [PageOwnership]
    ownership: AtomicUsize,
    /// Id of the hive that created the page
    owner: u64,
    /// Only dereferenced while the owning hive (which keeps it alive) exists
    factory: *const dyn ObjectFactory,
}

/// Handle to one page allocation
///
/// This is a plain pointer. Methods may only be called while the page is
/// allocated, and the methods documented as owner-only may only be called by
/// whichever thread currently has the owning hive.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Page(NonNull<PageHeader>);
// safety: shared state in the page is atomic, and owner-only state is
// protected by the hive not being Sync
unsafe impl Send for Page {}

/// Puts a slot back on the free list if constructing into it panics
struct SlotReturnGuard {
    page: Page,
    slot: u32,
}

impl Drop for SlotReturnGuard {
    fn drop(&mut self) {
        self.page.push_free(self.slot);
    }
}

impl Page {
    /// Allocate a new page with every slot free
    pub fn new(
        capacity: usize,
        slot: SlotLayout,
        factory: *const dyn ObjectFactory,
        owner: u64,
    ) -> Self {
        let layout = PageLayout::new(capacity, slot);
        let base = unsafe { alloc::alloc(layout.layout) };
        let Some(hdr) = NonNull::new(base as *mut PageHeader) else {
            alloc::handle_alloc_error(layout.layout)
        };

        unsafe {
            // safety: everything written here is within the allocation we just made,
            // at offsets computed by Layout::extend (and thus aligned)
            ptr::write(
                hdr.as_ptr(),
                PageHeader {
                    layout,
                    slot,
                    free_head: Cell::new(FREE_LIST_END),
                    reclaim_head: AtomicU32::new(FREE_LIST_END),
                    live_count: AtomicUsize::new(0),
                    ownership: AtomicUsize::new(0),
                    owner,
                    factory,
                },
            );

            let cbs = base.add(layout.cbs_offs) as *mut ControlBlock;
            let mask = base.add(layout.mask_offs) as *mut u64;
            let states = base.add(layout.states_offs) as *mut AtomicU8;
            for i in 0..capacity {
                ptr::write(cbs.add(i), ControlBlock::new());
                ptr::write(states.add(i), AtomicU8::new(SlotState::Free as u8));
            }
            for w in 0..layout.mask_words {
                ptr::write(mask.add(w), 0);
            }
        }

        let page = Page(hdr);
        // thread every slot onto the local free list, in address order
        for i in (0..capacity as u32).rev() {
            page.push_free(i);
        }

        tracing::event!(
            Level::DEBUG,
            page = ?UsizePtr::from(base),
            capacity,
            bytes = layout.layout.size(),
            "allocated page"
        );
        page
    }

    #[inline]
    fn hdr(&self) -> &PageHeader {
        // safety: the page is allocated for as long as anyone calls methods on it
        unsafe { self.0.as_ref() }
    }

    #[inline]
    fn base(self) -> *mut u8 {
        self.0.as_ptr() as *mut u8
    }

    pub fn addr(self) -> UsizePtr {
        UsizePtr::from(self.base())
    }

    #[inline]
    pub fn capacity(self) -> usize {
        self.hdr().layout.capacity
    }

    #[inline]
    pub fn slot_layout(self) -> SlotLayout {
        self.hdr().slot
    }

    #[inline]
    pub fn live_count(self) -> usize {
        // order: acquire pairs with the decrement at the end of reclaim_remote
        self.hdr().live_count.load(Ordering::Acquire)
    }

    /// Id of the hive that created this page
    #[inline]
    pub fn owner(self) -> u64 {
        self.hdr().owner
    }

    /// The factory of the owning hive
    ///
    /// Only valid while that hive is alive.
    #[inline]
    pub unsafe fn factory<'a>(self) -> &'a dyn ObjectFactory {
        &*self.hdr().factory
    }

    #[inline]
    pub fn cb(&self, i: u32) -> &ControlBlock {
        debug_assert!((i as usize) < self.capacity());
        // safety: index is in bounds, and control blocks live as long as the page
        unsafe {
            let cbs = self.base().add(self.hdr().layout.cbs_offs) as *const ControlBlock;
            &*cbs.add(i as usize)
        }
    }

    #[inline]
    fn state_atomic(&self, i: u32) -> &AtomicU8 {
        debug_assert!((i as usize) < self.capacity());
        // safety: index is in bounds
        unsafe {
            let states = self.base().add(self.hdr().layout.states_offs) as *const AtomicU8;
            &*states.add(i as usize)
        }
    }

    #[inline]
    pub fn state(self, i: u32) -> SlotState {
        SlotState::from_u8(self.state_atomic(i).load(Ordering::Acquire))
    }

    #[inline]
    fn set_state(self, i: u32, state: SlotState) {
        self.state_atomic(i).store(state as u8, Ordering::Release);
    }

    /// Start of slot `i`
    #[inline]
    pub fn slot_ptr(self, i: u32) -> *mut u8 {
        debug_assert!((i as usize) < self.capacity());
        let hdr = self.hdr();
        // safety: index is in bounds of the slot array
        unsafe {
            self.base()
                .add(hdr.layout.slots_offs + i as usize * hdr.slot.size)
        }
    }

    #[inline]
    fn mask_ptr(self) -> *mut u64 {
        // safety: mask array is in the allocation
        unsafe { self.base().add(self.hdr().layout.mask_offs) as *mut u64 }
    }

    /// Owner only
    #[inline]
    pub fn mask_word(self, w: usize) -> u64 {
        debug_assert!(w < self.hdr().layout.mask_words);
        unsafe { *self.mask_ptr().add(w) }
    }

    /// Owner only
    #[inline]
    pub fn bit(self, i: u32) -> bool {
        self.mask_word(i as usize / 64) & (1 << (i % 64)) != 0
    }

    #[inline]
    fn set_bit(self, i: u32) {
        unsafe { *self.mask_ptr().add(i as usize / 64) |= 1 << (i % 64) }
    }

    #[inline]
    fn clear_bit(self, i: u32) {
        unsafe { *self.mask_ptr().add(i as usize / 64) &= !(1 << (i % 64)) }
    }

    #[inline]
    fn free_slot(self, i: u32) -> *mut FreeSlot {
        self.slot_ptr(i) as *mut FreeSlot
    }

    /// Take a free slot, refilling the local free list from the reclaim list if needed
    ///
    /// Owner only
    pub fn pop_free(self) -> Option<u32> {
        let hdr = self.hdr();
        let mut head = hdr.free_head.get();
        if head == FREE_LIST_END {
            // order: on success, we need to see *all* of the next links
            // written by other threads when they pushed, so order is acquire.
            // every push is a RmW on reclaim_head, so they are all part of one
            // release sequence and this synchronizes-with all of them
            head = hdr.reclaim_head.swap(FREE_LIST_END, Ordering::Acquire);
            if head == FREE_LIST_END {
                return None;
            }
            tracing::event!(Level::TRACE, page = ?self.addr(), head, "took reclaim list");
        }
        debug_assert_eq!(self.state(head), SlotState::Free);
        // safety: free slots always contain a FreeSlot
        let next = unsafe { (*self.free_slot(head)).next.load(Ordering::Relaxed) };
        hdr.free_head.set(next);
        Some(head)
    }

    /// Put a free slot on the local free list
    ///
    /// Owner only
    pub fn push_free(self, i: u32) {
        let hdr = self.hdr();
        unsafe {
            // safety: the slot holds nothing, so we can overwrite it
            ptr::write(
                self.free_slot(i),
                FreeSlot {
                    next: AtomicU32::new(hdr.free_head.get()),
                },
            );
        }
        hdr.free_head.set(i);
    }

    /// Put a free slot on the reclaim list
    ///
    /// Any thread
    fn push_reclaimed(self, i: u32) {
        let hdr = self.hdr();
        let slot = self.free_slot(i);
        let mut head = hdr.reclaim_head.load(Ordering::Relaxed);
        unsafe {
            // safety: the slot holds nothing, and nobody else can see it yet
            ptr::write(
                slot,
                FreeSlot {
                    next: AtomicU32::new(head),
                },
            );
        }
        loop {
            // order: on success, we are currently the most recent
            // modification to reclaim_head. we use release ordering
            // so that the write to the next link (and the destruction of whatever
            // used to be in the slot) happens-before the owner reusing it
            match hdr.reclaim_head.compare_exchange_weak(
                head,
                i,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => {
                    head = x;
                    unsafe { (*slot).next.store(head, Ordering::Relaxed) };
                }
            }
        }
    }

    /// Construct an object in free slot `i` (just taken with [pop_free](Self::pop_free))
    /// and make it Active with `initial_strong` references
    ///
    /// Returns the new generation of the slot. If the factory panics,
    /// the slot goes back on the free list.
    ///
    /// Owner only
    pub fn construct(self, i: u32, initial_strong: u32) -> u32 {
        debug_assert_eq!(self.state(i), SlotState::Free);
        let obj = self.slot_ptr(i);

        let guard = SlotReturnGuard {
            page: self,
            slot: i,
        };
        unsafe {
            // safety: the slot is free, sized and aligned for the factory's class,
            // and the factory outlives every page of its hive
            (*self.hdr().factory).create_instance(obj);
        }
        mem::forget(guard);

        let gen = self.cb(i).activate(obj, initial_strong);
        self.set_state(i, SlotState::Active);
        self.set_bit(i);
        self.hdr().live_count.fetch_add(1, Ordering::Relaxed);
        gen
    }

    /// Take an Active slot out of iteration
    ///
    /// Owner only
    pub fn make_zombie(self, i: u32) {
        debug_assert_eq!(self.state(i), SlotState::Active);
        self.clear_bit(i);
        self.set_state(i, SlotState::Zombie);
    }

    /// Destroy the object in a slot whose strong count just hit zero,
    /// and put the slot back on the local free list
    ///
    /// Owner only
    pub fn reclaim_local(self, i: u32) {
        debug_assert_eq!(self.state(i), SlotState::Zombie);
        let obj = self.cb(i).retire();
        unsafe {
            // safety: strong count is zero, so we are the last user of the object
            (*self.hdr().factory).destroy_instance(obj);
        }
        self.set_state(i, SlotState::Free);
        self.push_free(i);
        self.hdr().live_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Destroy the object in a zombie slot whose strong count just hit zero,
    /// and put the slot on the reclaim list
    ///
    /// Any thread (while the hive is alive)
    pub fn reclaim_remote(self, i: u32) {
        debug_assert_eq!(self.state(i), SlotState::Zombie);
        let obj = self.cb(i).retire();
        unsafe {
            // safety: strong count is zero, so we are the last user of the object
            (*self.hdr().factory).destroy_instance(obj);
        }
        self.set_state(i, SlotState::Free);
        self.push_reclaimed(i);
        // order: the slot must already be findable on the reclaim list by the time
        // anyone observes the lower count, so this goes last and is release
        self.hdr().live_count.fetch_sub(1, Ordering::Release);
    }

    /// Call `f(slot index, object)` for every Active slot, in address order
    ///
    /// Owner only
    #[inline]
    pub fn for_each_active(self, prefetch_distance: usize, mut f: impl FnMut(u32, *mut u8)) {
        let capacity = self.capacity();
        for w in 0..self.hdr().layout.mask_words {
            let mut word = self.mask_word(w);
            while word != 0 {
                let i = (w * 64) as u32 + word.trailing_zeros();
                word &= word - 1;
                if prefetch_distance != 0 && (i as usize) + prefetch_distance < capacity {
                    prefetch_read(self.slot_ptr(i + prefetch_distance as u32));
                }
                f(i, self.slot_ptr(i));
            }
        }
    }

    /// Number of Active slots, counted from the bitmask
    ///
    /// Owner only
    pub fn active_count(self) -> usize {
        (0..self.hdr().layout.mask_words)
            .map(|w| self.mask_word(w).count_ones() as usize)
            .sum()
    }

    /// Does the slot storage of this page contain `addr` (anywhere inside a slot)?
    pub fn contains_addr(self, addr: usize) -> bool {
        let start = self.slot_ptr(0) as usize;
        let end = start + self.capacity() * self.hdr().slot.size;
        addr >= start && addr < end
    }

    /// Index of the slot starting exactly at `addr`
    pub fn slot_index_of(self, addr: usize) -> Option<u32> {
        if !self.contains_addr(addr) {
            return None;
        }
        let offs = addr - self.slot_ptr(0) as usize;
        let size = self.hdr().slot.size;
        if offs % size != 0 {
            return None;
        }
        Some((offs / size) as u32)
    }

    pub fn ownership(self) -> PageOwnership {
        PageOwnership::decode(self.hdr().ownership.load(Ordering::Acquire))
    }

    /// Register a weak reference into this page
    ///
    /// Any thread, as long as the caller already holds a strong or weak
    /// reference into the page
    pub fn acquire_weak(self) {
        let prev = self.hdr().ownership.fetch_add(1, Ordering::Relaxed);
        if prev & OWNERSHIP_WEAK_MASK == OWNERSHIP_WEAK_MASK {
            std::process::abort();
        }
    }

    /// Drop a weak reference into this page
    ///
    /// If the page is orphaned and this was the last weak reference, frees the
    /// page and returns `true`. The page must not be touched after that.
    ///
    /// Any thread
    pub unsafe fn release_weak(self) -> bool {
        // order: release so that everything this thread did with the page
        // happens-before whoever frees it
        let prev = self.hdr().ownership.fetch_sub(1, Ordering::Release);
        debug_assert!(prev & OWNERSHIP_WEAK_MASK != 0, "page weak count dropped below zero");
        if prev != OWNERSHIP_ORPHANED | 1 {
            return false;
        }
        // order: synchronize-with the orphaning and every other weak release
        fence(Ordering::Acquire);
        tracing::event!(Level::DEBUG, page = ?self.addr(), "last weak reference freed orphaned page");
        self.dealloc();
        true
    }

    /// Destroy every remaining object and either free the page or orphan it
    ///
    /// Objects are destroyed even if they are still strongly referenced, and
    /// their generations are bumped so that no weak reference can reach them.
    /// Returns `true` if the page was freed. The page must not be touched
    /// by the caller after this returns.
    ///
    /// Owner only
    pub unsafe fn teardown(self) -> bool {
        let hdr = self.hdr();
        let mut destroyed = 0usize;
        for i in 0..self.capacity() as u32 {
            match self.state(i) {
                SlotState::Free => {}
                SlotState::Active | SlotState::Zombie => {
                    let obj = self.cb(i).kill();
                    if !obj.is_null() {
                        // safety: the hive is going away, so nothing may use the object
                        (*hdr.factory).destroy_instance(obj);
                        destroyed += 1;
                    }
                    self.clear_bit(i);
                    self.set_state(i, SlotState::Free);
                }
            }
        }
        hdr.live_count.store(0, Ordering::Relaxed);

        // order: acquire pairs with the release in release_weak (if they get
        // there first, we free), and release pairs with its acquire fence
        // (if we get here first, they free)
        let prev = hdr.ownership.fetch_or(OWNERSHIP_ORPHANED, Ordering::AcqRel);
        debug_assert!(prev & OWNERSHIP_ORPHANED == 0, "page torn down twice");
        let pending_weak = prev & OWNERSHIP_WEAK_MASK;
        if pending_weak == 0 {
            tracing::event!(Level::TRACE, page = ?self.addr(), destroyed, "freed page");
            self.dealloc();
            true
        } else {
            tracing::event!(
                Level::DEBUG,
                page = ?self.addr(),
                destroyed,
                pending_weak,
                "orphaned page"
            );
            false
        }
    }

    unsafe fn dealloc(self) {
        let layout = self.hdr().layout.layout;
        alloc::dealloc(self.base(), layout);
    }

    /// Panic if the page's bookkeeping is inconsistent
    ///
    /// Only valid when no other thread is touching the page.
    pub fn _debug_check_invariants(self) {
        let hdr = self.hdr();
        let capacity = self.capacity();
        let mut on_lists = HashSet::new();

        let walk = |mut cur: u32, which: &str, on_lists: &mut HashSet<u32>| {
            while cur != FREE_LIST_END {
                assert!(
                    (cur as usize) < capacity,
                    "{} free list of page {:?} links to out of bounds slot {}",
                    which,
                    self.addr(),
                    cur
                );
                assert!(
                    on_lists.insert(cur),
                    "slot {} of page {:?} is on the free lists more than once",
                    cur,
                    self.addr()
                );
                assert_eq!(
                    self.state(cur),
                    SlotState::Free,
                    "non-free slot {} on {} free list",
                    cur,
                    which
                );
                cur = unsafe { (*self.free_slot(cur)).next.load(Ordering::Relaxed) };
            }
        };
        walk(hdr.free_head.get(), "local", &mut on_lists);
        walk(
            hdr.reclaim_head.load(Ordering::Acquire),
            "reclaim",
            &mut on_lists,
        );

        let mut live = 0;
        for i in 0..capacity as u32 {
            let state = self.state(i);
            let cb = self.cb(i);
            assert_eq!(
                self.bit(i),
                state == SlotState::Active,
                "bitmask disagrees with state {:?} of slot {}",
                state,
                i
            );
            match state {
                SlotState::Free => {
                    assert!(on_lists.contains(&i), "free slot {} is not on a free list", i);
                    assert!(cb.obj().is_null(), "free slot {} still points to an object", i);
                    assert_eq!(cb.strong_count(), 0);
                }
                SlotState::Active => {
                    live += 1;
                    assert_eq!(cb.obj(), self.slot_ptr(i));
                    // the hive's own reference
                    assert!(cb.strong_count() >= 1);
                }
                SlotState::Zombie => {
                    live += 1;
                    assert_eq!(cb.obj(), self.slot_ptr(i));
                    assert!(cb.strong_count() >= 1, "unreclaimed zombie in slot {}", i);
                }
            }
        }
        assert_eq!(on_lists.len() + live, capacity);
        assert_eq!(hdr.live_count.load(Ordering::Acquire), live);
        assert!(live <= capacity);
        // any leftover bits past the end of the page must be clear
        if capacity % 64 != 0 {
            let last = self.mask_word(hdr.layout.mask_words - 1);
            assert_eq!(last >> (capacity % 64), 0);
        }
    }
}

impl Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hdr = self.hdr();
        f.debug_struct("Page")
            .field("@addr", &self.addr())
            .field("owner", &hdr.owner)
            .field("capacity", &hdr.layout.capacity)
            .field("slot", &hdr.slot)
            .field("free_head", &hdr.free_head.get())
            .field("reclaim_head", &hdr.reclaim_head.load(Ordering::Relaxed))
            .field("live_count", &hdr.live_count.load(Ordering::Relaxed))
            .field(
                "ownership",
                &PageOwnership::decode(hdr.ownership.load(Ordering::Relaxed)),
            )
            .finish()
    }
}
