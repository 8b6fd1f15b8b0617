#![cfg(not(loom))]

//! Random operation sequences against a simple model of the hive

use hive_db::{ClassUid, Hive, HiveConfig, HiveError, ObjRef, Pooled, SlotState, WeakRef};
use proptest::prelude::*;

#[derive(Default)]
struct Cell3 {
    coords: [u32; 3],
}
impl Pooled for Cell3 {
    const CLASS_UID: ClassUid = ClassUid(0xce113);
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Add,
    Remove(usize),
    RemovePtr(usize),
    Clone(usize),
    Drop(usize),
    Downgrade(usize),
    Upgrade(usize),
    DropWeak(usize),
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => Just(Op::Add),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => any::<usize>().prop_map(Op::RemovePtr),
        2 => any::<usize>().prop_map(Op::Clone),
        2 => any::<usize>().prop_map(Op::Drop),
        1 => any::<usize>().prop_map(Op::Downgrade),
        1 => any::<usize>().prop_map(Op::Upgrade),
        1 => any::<usize>().prop_map(Op::DropWeak),
        1 => Just(Op::Clear),
    ]
}

/// What we expect to know about every object ever added
struct Expected {
    active: bool,
    handles: usize,
}

impl Expected {
    fn alive(&self) -> bool {
        self.active || self.handles > 0
    }
}

fn run(ops: &[Op], initial_page_capacity: usize) -> Result<(), TestCaseError> {
    let hive = Hive::<Cell3>::with_config(
        HiveConfig::default().with_initial_page_capacity(initial_page_capacity),
    );
    let mut objects: Vec<Expected> = Vec::new();
    let mut handles: Vec<(usize, ObjRef<'_, Cell3>)> = Vec::new();
    let mut weaks: Vec<(usize, WeakRef<Cell3>)> = Vec::new();

    for &op in ops {
        match op {
            Op::Add => {
                let obj = hive.add();
                prop_assert_eq!(ObjRef::strong_count(&obj), 2);
                prop_assert_eq!(obj.coords, [0; 3]);
                objects.push(Expected {
                    active: true,
                    handles: 1,
                });
                handles.push((objects.len() - 1, obj));
            }
            Op::Remove(i) if !handles.is_empty() => {
                let (id, obj) = handles.swap_remove(i % handles.len());
                let result = hive.remove(obj);
                let expected = &mut objects[id];
                if expected.active {
                    prop_assert_eq!(result, Ok(()));
                    expected.active = false;
                } else {
                    prop_assert_eq!(result, Err(HiveError::NotActive));
                }
                expected.handles -= 1;
            }
            Op::RemovePtr(i) if !handles.is_empty() => {
                let (id, obj) = &handles[i % handles.len()];
                let result = hive.remove_ptr(ObjRef::as_ptr(obj));
                let expected = &mut objects[*id];
                if expected.active {
                    prop_assert_eq!(result, Ok(()));
                    expected.active = false;
                } else {
                    prop_assert_eq!(result, Err(HiveError::NotActive));
                }
                prop_assert_eq!(
                    hive.slot_state(ObjRef::as_ptr(obj)),
                    Some(SlotState::Zombie)
                );
            }
            Op::Clone(i) if !handles.is_empty() => {
                let (id, obj) = &handles[i % handles.len()];
                let (id, obj) = (*id, obj.clone());
                objects[id].handles += 1;
                handles.push((id, obj));
            }
            Op::Drop(i) if !handles.is_empty() => {
                let (id, obj) = handles.swap_remove(i % handles.len());
                drop(obj);
                objects[id].handles -= 1;
            }
            Op::Downgrade(i) if !handles.is_empty() => {
                let (id, obj) = &handles[i % handles.len()];
                weaks.push((*id, ObjRef::downgrade(obj)));
            }
            Op::Upgrade(i) if !weaks.is_empty() => {
                let (id, weak) = &weaks[i % weaks.len()];
                let id = *id;
                let upgraded = weak.upgrade(&hive);
                prop_assert_eq!(upgraded.is_some(), objects[id].alive());
                prop_assert_eq!(weak.is_alive(), objects[id].alive());
                if let Some(obj) = upgraded {
                    objects[id].handles += 1;
                    handles.push((id, obj));
                }
            }
            Op::DropWeak(i) if !weaks.is_empty() => {
                let _ = weaks.swap_remove(i % weaks.len());
            }
            Op::Clear => {
                hive.clear();
                for expected in &mut objects {
                    expected.active = false;
                }
            }
            _ => {}
        }

        hive._debug_check_invariants();
        let alive = objects.iter().filter(|o| o.alive()).count();
        let active = objects.iter().filter(|o| o.active).count();
        prop_assert_eq!(hive.size(), alive);
        prop_assert_eq!(hive.active_count(), active);
        prop_assert_eq!(hive.empty(), alive == 0);
        let mut visited = 0;
        hive.for_each(|_| visited += 1);
        prop_assert_eq!(visited, active);
        prop_assert!(hive.size() <= hive.capacity());
    }

    for (id, obj) in &handles {
        let ptr = ObjRef::as_ptr(obj);
        let state = if objects[*id].active {
            SlotState::Active
        } else {
            SlotState::Zombie
        };
        prop_assert_eq!(hive.slot_state(ptr), Some(state));
        let slot = hive.find_slot(ptr);
        prop_assert_eq!(slot.map(|s| s.slot), Some(ObjRef::slot_index(obj)));
    }
    Ok(())
}

proptest! {
    #[test]
    fn random_operations(ops in prop::collection::vec(op(), 0..200), initial in 1usize..9) {
        run(&ops, initial)?;
    }

    /// With a single slot per page, every reuse is visible
    #[test]
    fn random_operations_tiny_pages(ops in prop::collection::vec(op(), 0..100)) {
        run(&ops, 1)?;
    }

    #[test]
    fn generation_never_repeats(reuses in 1usize..50) {
        let hive = Hive::<Cell3>::with_config(
            HiveConfig::default().with_initial_page_capacity(1).with_max_page_capacity(1),
        );
        let mut weaks = Vec::new();
        let mut last_gen = None;
        for _ in 0..reuses {
            let obj = hive.add();
            prop_assert_eq!(hive.page_count(), 1);
            let gen = ObjRef::generation(&obj);
            if let Some(last) = last_gen {
                prop_assert!(gen > last);
            }
            last_gen = Some(gen);
            weaks.push(ObjRef::downgrade(&obj));
            hive.remove(obj).unwrap();
        }
        for weak in &weaks {
            prop_assert!(weak.upgrade(&hive).is_none());
        }
    }
}
