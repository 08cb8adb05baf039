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
use ::std::collections::VecDeque;

//======================================================================================================================
// Structures
//======================================================================================================================

/// A hardware lock. The holder releases to the longest-waiting claimant.
pub struct Lock {
    pub num: usize,
    pub in_use: bool,
    pub holder: Option<ThreadId>,
    pub waiters: VecDeque<ThreadId>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Lock {
    pub fn new(num: usize) -> Self {
        Self {
            num,
            in_use: false,
            holder: None,
            waiters: VecDeque::new(),
        }
    }

    pub fn alloc(&mut self) {
        self.in_use = true;
        self.holder = None;
        self.waiters.clear();
    }

    pub fn free(&mut self) -> bool {
        if self.holder.is_some() || !self.waiters.is_empty() {
            return false;
        }
        self.in_use = false;
        true
    }
}

impl SystemState {
    /// Takes the lock, parking the thread FIFO behind the current holder.
    /// Release hands the lock over directly, so a woken waiter's retry
    /// always succeeds.
    pub fn lock_acquire(&mut self, tid: ThreadId, core: usize, num: usize) -> ResOpResult {
        let core_id: u32 = self.cores[core].core_id;
        let lock: &mut Lock = &mut self.cores[core].locks[num];
        if !lock.in_use {
            return ResOpResult::Illegal;
        }
        match lock.holder {
            None => {
                lock.holder = Some(tid);
                ResOpResult::Continue(())
            },
            Some(holder) if holder == tid => ResOpResult::Continue(()),
            Some(_) => {
                lock.waiters.push_back(tid);
                let resource_id: ResourceId = ResourceId::new(core_id, ResourceType::Lock, num as u32);
                self.park_thread(tid, resource_id);
                ResOpResult::Deschedule
            },
        }
    }

    pub fn lock_release(&mut self, tid: ThreadId, core: usize, num: usize) -> ResOpResult {
        let time: Ticks = self.threads[tid.0].time;
        let lock: &mut Lock = &mut self.cores[core].locks[num];
        if !lock.in_use || lock.holder != Some(tid) {
            return ResOpResult::Illegal;
        }
        match lock.waiters.pop_front() {
            Some(next) => {
                lock.holder = Some(next);
                self.wake_thread(next, time);
            },
            None => lock.holder = None,
        }
        ResOpResult::Continue(())
    }
}
