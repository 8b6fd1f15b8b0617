use super::*;

fn fake_obj() -> *mut u8 {
    0x1000 as *mut u8
}

#[test]
fn bit_packing() {
    let x = cb_pack(3, 17);
    assert_eq!(cb_strong(x), 17);
    assert_eq!(cb_gen(x), 3);
    assert_eq!(cb_strong(cb_pack(u32::MAX, 0)), 0);
    assert_eq!(cb_gen(cb_pack(0, u32::MAX)), 0);
}

#[cfg(not(loom))]
#[test]
fn fresh_block_is_empty() {
    let cb = ControlBlock::new();
    assert_eq!(cb.strong_count(), 0);
    assert_eq!(cb.weak_count(), 0);
    assert_eq!(cb.generation(), 0);
    assert!(cb.obj().is_null());
    assert!(!cb.try_upgrade(0));
}

#[cfg(not(loom))]
#[test]
fn activate_bumps_generation() {
    let cb = ControlBlock::new();
    assert_eq!(cb.activate(fake_obj(), 2), 1);
    assert_eq!(cb.strong_count(), 2);
    assert_eq!(cb.obj(), fake_obj());

    assert!(!cb.release_strong(2 - 1));
    assert!(cb.release_strong(1));
    assert_eq!(cb.retire(), fake_obj());
    assert!(cb.obj().is_null());

    assert_eq!(cb.activate(fake_obj(), 1), 2);
    assert_eq!(cb.generation(), 2);
}

#[cfg(not(loom))]
#[test]
fn release_several_at_once() {
    let cb = ControlBlock::new();
    cb.activate(fake_obj(), 2);
    assert!(cb.release_strong(2));
    assert_eq!(cb.strong_count(), 0);
    // generation survives the strong count hitting zero
    assert_eq!(cb.generation(), 1);
}

#[cfg(not(loom))]
#[test]
fn upgrade_checks_generation() {
    let cb = ControlBlock::new();
    let gen = cb.activate(fake_obj(), 1);
    assert!(cb.try_upgrade(gen));
    assert_eq!(cb.strong_count(), 2);
    assert!(!cb.try_upgrade(gen + 1));
    assert_eq!(cb.strong_count(), 2);

    assert!(!cb.release_strong(1));
    assert!(cb.release_strong(1));
    cb.retire();

    // dead object cannot be resurrected
    assert!(!cb.try_upgrade(gen));

    // and a new occupant of the slot can't be reached with the old generation
    let gen2 = cb.activate(fake_obj(), 1);
    assert_ne!(gen, gen2);
    assert!(!cb.try_upgrade(gen));
    assert!(cb.try_upgrade(gen2));
}

#[cfg(not(loom))]
#[test]
fn kill_invalidates() {
    let cb = ControlBlock::new();
    let gen = cb.activate(fake_obj(), 3);
    assert_eq!(cb.kill(), fake_obj());
    assert_eq!(cb.strong_count(), 0);
    assert_eq!(cb.generation(), gen + 1);
    assert!(cb.obj().is_null());
    assert!(!cb.try_upgrade(gen));
    assert!(!cb.try_upgrade(gen + 1));
}

#[cfg(not(loom))]
#[test]
fn weak_counting() {
    let cb = ControlBlock::new();
    cb.acquire_weak();
    cb.acquire_weak();
    assert_eq!(cb.weak_count(), 2);
    cb.release_weak();
    assert_eq!(cb.weak_count(), 1);
    cb.release_weak();
    assert_eq!(cb.weak_count(), 0);
}

#[cfg(not(loom))]
#[test]
fn debug_output() {
    let cb = ControlBlock::new();
    cb.activate(fake_obj(), 1);
    let s = format!("{:?}", cb);
    assert!(s.contains("strong: 1"));
    assert!(s.contains("gen: 1"));
    assert!(s.contains("obj: 0x1000"));
}

#[cfg(loom)]
#[test]
fn loom_upgrade_races_last_drop() {
    use loom::sync::Arc;

    loom::model(|| {
        let cb = Arc::new(ControlBlock::new());
        let destroyed = Arc::new(AtomicUsize::new(0));
        let gen = cb.activate(fake_obj(), 1);

        let t1 = {
            let cb = cb.clone();
            let destroyed = destroyed.clone();
            loom::thread::spawn(move || {
                if cb.release_strong(1) {
                    destroyed.fetch_add(1, Ordering::Relaxed);
                }
            })
        };
        let t2 = {
            let cb = cb.clone();
            let destroyed = destroyed.clone();
            loom::thread::spawn(move || {
                if cb.try_upgrade(gen) {
                    // we hold a reference, so it cannot have been destroyed
                    assert_eq!(destroyed.load(Ordering::Relaxed), 0);
                    if cb.release_strong(1) {
                        destroyed.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        };

        t1.join().unwrap();
        t2.join().unwrap();

        // exactly one of the two threads destroys the object
        assert_eq!(destroyed.load(Ordering::Relaxed), 1);
        assert_eq!(cb.strong_count(), 0);
    });
}

#[cfg(loom)]
#[test]
fn loom_concurrent_clone_and_drop() {
    use loom::sync::Arc;

    loom::model(|| {
        let cb = Arc::new(ControlBlock::new());
        cb.activate(fake_obj(), 2);

        let t1 = {
            let cb = cb.clone();
            loom::thread::spawn(move || {
                cb.acquire_strong();
                cb.release_strong(1)
            })
        };
        let t2 = {
            let cb = cb.clone();
            loom::thread::spawn(move || cb.release_strong(1))
        };

        let last_1 = t1.join().unwrap();
        let last_2 = t2.join().unwrap();
        assert!(!last_1 && !last_2);
        assert_eq!(cb.strong_count(), 1);
        assert!(cb.release_strong(1));
    });
}
