// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::tilesim::{
    resource::ResourceType,
    Config,
    ResOpResult,
    ResourceId,
    SystemBuilder,
    SystemState,
    ThreadId,
    TimerId,
    CYCLES_PER_TICK,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn single_tile_system() -> SystemState {
    SystemBuilder::new(Config::default()).add_node(1).build().unwrap()
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// Locks hand over directly: the woken waiter's retry always succeeds.
#[test]
fn lock_hand_off_to_longest_waiter() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(0, 1);
    let t2: ThreadId = sys.thread_on_core(0, 2);
    let lock_id: ResourceId = sys.alloc_resource(t0, ResourceType::Lock).unwrap();
    let num: usize = lock_id.num() as usize;

    assert!(sys.lock_acquire(t0, 0, num).is_continue());
    assert_eq!(sys.lock_acquire(t1, 0, num), ResOpResult::Deschedule);
    assert_eq!(sys.lock_acquire(t2, 0, num), ResOpResult::Deschedule);

    assert!(sys.lock_release(t0, 0, num).is_continue());
    // t1 waited longest and now holds the lock.
    assert!(sys.lock_acquire(t1, 0, num).is_continue());
    // Releasing from a non-holder is illegal.
    assert_eq!(sys.lock_release(t2, 0, num), ResOpResult::Illegal);
    assert!(sys.lock_release(t1, 0, num).is_continue());
    assert!(sys.lock_acquire(t2, 0, num).is_continue());
}

/// The synchroniser is a barrier: slaves park until the master arrives,
/// then everyone proceeds.
#[test]
fn synchroniser_joins_master_and_slaves() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let sync_id: ResourceId = sys.alloc_resource(t0, ResourceType::Sync).unwrap();
    let num: usize = sync_id.num() as usize;

    let s1: ThreadId = sys.thread_getst(t0, sync_id).unwrap();
    let s2: ThreadId = sys.thread_getst(t0, sync_id).unwrap();
    assert_ne!(s1, s2);

    // Slaves arrive first and park.
    assert_eq!(sys.sync_ssync(s1, 0, num), ResOpResult::Deschedule);
    assert_eq!(sys.sync_ssync(s2, 0, num), ResOpResult::Deschedule);

    // The master completes the barrier inline and the slaves are woken.
    assert!(sys.sync_msync(t0, 0, num).is_continue());
    assert!(sys.sync_ssync(s1, 0, num).is_continue());
    assert!(sys.sync_ssync(s2, 0, num).is_continue());
}

/// The master parks when it arrives before its slaves.
#[test]
fn master_waits_for_late_slaves() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let sync_id: ResourceId = sys.alloc_resource(t0, ResourceType::Sync).unwrap();
    let num: usize = sync_id.num() as usize;
    let s1: ThreadId = sys.thread_getst(t0, sync_id).unwrap();

    assert_eq!(sys.sync_msync(t0, 0, num), ResOpResult::Deschedule);
    assert_eq!(sys.sync_ssync(s1, 0, num), ResOpResult::Continue(()));
    // The master was woken; its retry falls through.
    assert!(sys.sync_msync(t0, 0, num).is_continue());
}

/// A timer read against an unmet AFTER condition parks the thread until
/// the target tick.
#[test]
fn timer_after_wakes_at_the_target_tick() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let timer_id: ResourceId = sys.alloc_resource(t0, ResourceType::Timer).unwrap();
    let timer: TimerId = TimerId(sys.core(0).timer_base + timer_id.num() as usize);

    // Condition FULL: an immediate read.
    assert_eq!(sys.timer_in(t0, timer), ResOpResult::Continue(0));

    sys.timer_set_data(t0, timer, 25);
    sys.timer_set_condition(t0, timer, ::tilesim::resource::Condition::After);
    assert_eq!(sys.timer_in(t0, timer), ResOpResult::<u32>::Deschedule);

    let _ = sys.run();
    assert_eq!(sys.thread(t0).time, 25 * CYCLES_PER_TICK);
    assert_eq!(sys.timer_in(t0, timer), ResOpResult::Continue(25));
}

/// Fixed resource complements: allocation stops when the pool is
/// exhausted.
#[test]
fn resource_pools_are_bounded() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);

    let mut chanends: usize = 0;
    while sys.alloc_resource(t0, ResourceType::Chanend).is_some() {
        chanends += 1;
    }
    assert_eq!(chanends, ::tilesim::config::NUM_CHANENDS);

    let mut locks: usize = 0;
    while sys.alloc_resource(t0, ResourceType::Lock).is_some() {
        locks += 1;
    }
    assert_eq!(locks, ::tilesim::config::NUM_LOCKS);

    let mut timers: usize = 0;
    while sys.alloc_resource(t0, ResourceType::Timer).is_some() {
        timers += 1;
    }
    assert_eq!(timers, ::tilesim::config::NUM_TIMERS);
}
