#![cfg(not(loom))]

use std::mem::size_of;

use hive_db::{ClassUid, Hive, HiveConfig, ObjRef, Pooled, SlotState};

#[derive(Default, Debug)]
struct Widget {
    id: u64,
    x: f64,
    y: f64,
    tag: u32,
    flags: u32,
}
impl Pooled for Widget {
    const CLASS_UID: ClassUid = ClassUid(0x3317_d9e7);
}

#[test]
fn widget_is_32_bytes() {
    assert_eq!(size_of::<Widget>(), 32);
    let hive = Hive::<Widget>::new();
    assert_eq!(hive.slot_layout().size, 32);
}

#[test]
fn widget_scenario() {
    let hive = Hive::<Widget>::new();

    let mut widgets: Vec<_> = (0..5).map(|_| hive.add()).collect();
    assert_eq!(hive.size(), 5);

    // nobody else holds #3, so removing it destroys it right away
    let third = widgets.remove(3);
    let third_addr = ObjRef::as_ptr(&third);
    hive.remove(third).unwrap();
    assert_eq!(hive.size(), 4);
    assert!(!hive.contains(third_addr));
    assert_eq!(hive.slot_state(third_addr), Some(SlotState::Free));

    let readded = hive.add();
    assert_eq!(ObjRef::as_ptr(&readded), third_addr);
    assert_eq!(hive.size(), 5);

    let extra = readded.clone();
    hive.remove(readded).unwrap();
    assert_eq!(hive.size(), 5);
    assert_eq!(hive.active_count(), 4);
    assert!(hive.contains(third_addr));
    assert!(!hive.is_active(third_addr));
    assert!(!ObjRef::is_active(&extra));
    let mut visited = 0;
    hive.for_each(|_| visited += 1);
    assert_eq!(visited, 4);
    // still readable through the handle
    assert_eq!(extra.id, 0);
    assert_eq!(ObjRef::strong_count(&extra), 1);

    drop(extra);
    assert_eq!(hive.size(), 4);
    assert!(!hive.contains(third_addr));
    hive._debug_check_invariants();
}

#[test]
fn zombies_are_not_iterated() {
    let hive = Hive::<Widget>::with_config(HiveConfig::default().with_initial_page_capacity(4));
    let mut held = Vec::new();
    for i in 0..10 {
        let w = hive.add();
        if i % 3 == 0 {
            held.push(w.clone());
            hive.remove(w).unwrap();
        }
    }
    assert_eq!(hive.size(), 10);
    assert_eq!(hive.active_count(), 6);

    let mut visited = 0;
    hive.for_each(|w| {
        assert_eq!(w.flags, 0);
        visited += 1;
    });
    assert_eq!(visited, 6);

    for w in &held {
        let ptr = ObjRef::as_ptr(w);
        assert_eq!(hive.slot_state(ptr), Some(SlotState::Zombie));
        assert!(hive.handle_of_raw(ptr).is_none());
    }
    drop(held);
    assert_eq!(hive.size(), 6);
    hive._debug_check_invariants();
}

#[test]
fn addresses_resolve_to_their_slot() {
    let hive = Hive::<Widget>::with_config(HiveConfig::default().with_initial_page_capacity(3));
    let widgets: Vec<_> = (0..20).map(|_| hive.add()).collect();
    assert!(hive.page_count() > 1);

    let mut seen = std::collections::HashSet::new();
    for w in &widgets {
        let id = hive.find_slot(ObjRef::as_ptr(w)).unwrap();
        assert_eq!(id.slot, ObjRef::slot_index(w));
        assert!(id.page < hive.page_count());
        assert!(seen.insert(id));
    }

    // the zombie keeps its location
    let zombie = widgets[7].clone();
    let before = hive.find_slot(ObjRef::as_ptr(&zombie));
    hive.remove_ptr(ObjRef::as_ptr(&zombie)).unwrap();
    assert_eq!(hive.find_slot(ObjRef::as_ptr(&zombie)), before);
}

#[test]
fn reuse_cycles_do_not_grow() {
    let hive = Hive::<Widget>::with_config(HiveConfig::default().with_initial_page_capacity(8));
    let cycle = || {
        let widgets: Vec<_> = (0..50).map(|_| hive.add()).collect();
        for w in widgets {
            hive.remove(w).unwrap();
        }
        assert!(hive.empty());
    };

    cycle();
    let capacity = hive.capacity();
    let pages = hive.page_count();
    for _ in 0..20 {
        cycle();
    }
    assert_eq!(hive.capacity(), capacity);
    assert_eq!(hive.page_count(), pages);
    hive._debug_check_invariants();
}

#[test]
fn mutation_through_the_hive() {
    let mut hive = Hive::<Widget>::new();
    {
        let _a = hive.add();
        let _b = hive.add();
        let _c = hive.add();
    }
    let mut next = 1;
    hive.for_each_mut(|w| {
        w.id = next;
        w.tag = 7;
        next += 1;
    });

    let mut ids = Vec::new();
    hive.for_each(|w| {
        assert_eq!(w.tag, 7);
        ids.push(w.id);
    });
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3]);
}
