// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    resource::{
        ResOpResult,
        ResourceId,
        ResourceType,
    },
    runtime::{
        queue::ThreadId,
        timebase::Ticks,
    },
    system::SystemState,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Join barrier between a master thread and the slave threads it forked.
/// Everyone arrives (master via msync, slaves via ssync), then everyone
/// proceeds.
pub struct Synchroniser {
    pub num: usize,
    pub in_use: bool,
    pub master: Option<ThreadId>,
    pub slaves: Vec<ThreadId>,
    /// Slaves that have arrived at the barrier.
    pub arrived: usize,
    pub master_waiting: bool,
    /// Threads parked at the barrier.
    pub paused: Vec<ThreadId>,
    /// Threads released by a completed barrier whose retry should fall
    /// through.
    pub released: Vec<ThreadId>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Synchroniser {
    pub fn new(num: usize) -> Self {
        Self {
            num,
            in_use: false,
            master: None,
            slaves: Vec::new(),
            arrived: 0,
            master_waiting: false,
            paused: Vec::new(),
            released: Vec::new(),
        }
    }

    pub fn alloc(&mut self) {
        self.in_use = true;
        self.master = None;
        self.slaves.clear();
        self.arrived = 0;
        self.master_waiting = false;
        self.paused.clear();
        self.released.clear();
    }

    fn take_released(&mut self, tid: ThreadId) -> bool {
        match self.released.iter().position(|&t| t == tid) {
            Some(i) => {
                self.released.swap_remove(i);
                true
            },
            None => false,
        }
    }
}

impl SystemState {
    /// Master side of the barrier.
    pub fn sync_msync(&mut self, tid: ThreadId, core: usize, num: usize) -> ResOpResult {
        let core_id: u32 = self.cores[core].core_id;
        let sync: &mut Synchroniser = &mut self.cores[core].syncs[num];
        if !sync.in_use || sync.master != Some(tid) {
            return ResOpResult::Illegal;
        }
        if sync.take_released(tid) {
            return ResOpResult::Continue(());
        }
        if sync.arrived == sync.slaves.len() {
            self.sync_complete_barrier(core, num, tid);
            return ResOpResult::Continue(());
        }
        sync.master_waiting = true;
        sync.paused.push(tid);
        let resource_id: ResourceId = ResourceId::new(core_id, ResourceType::Sync, num as u32);
        self.park_thread(tid, resource_id);
        ResOpResult::Deschedule
    }

    /// Slave side of the barrier.
    pub fn sync_ssync(&mut self, tid: ThreadId, core: usize, num: usize) -> ResOpResult {
        let core_id: u32 = self.cores[core].core_id;
        let sync: &mut Synchroniser = &mut self.cores[core].syncs[num];
        if !sync.in_use {
            return ResOpResult::Illegal;
        }
        if sync.take_released(tid) {
            return ResOpResult::Continue(());
        }
        sync.arrived += 1;
        if sync.master_waiting && sync.arrived == sync.slaves.len() {
            self.sync_complete_barrier(core, num, tid);
            return ResOpResult::Continue(());
        }
        sync.paused.push(tid);
        let resource_id: ResourceId = ResourceId::new(core_id, ResourceType::Sync, num as u32);
        self.park_thread(tid, resource_id);
        ResOpResult::Deschedule
    }

    /// Everyone has arrived: wake the parked participants and reset the
    /// barrier. `last` is the thread completing the barrier inline.
    fn sync_complete_barrier(&mut self, core: usize, num: usize, last: ThreadId) {
        let time: Ticks = self.threads[last.0].time;
        let woken: Vec<ThreadId> = {
            let sync: &mut Synchroniser = &mut self.cores[core].syncs[num];
            sync.arrived = 0;
            sync.master_waiting = false;
            let woken: Vec<ThreadId> = ::std::mem::take(&mut sync.paused);
            sync.released.extend(woken.iter().copied());
            woken
        };
        for tid in woken {
            self.wake_thread(tid, time);
        }
    }
}
