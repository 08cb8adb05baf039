// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    resource::{
        Condition,
        EventableId,
        EventableState,
        ResOpResult,
        ResourceId,
    },
    runtime::{
        queue::{
            Runnable,
            ThreadId,
            TimerId,
        },
        timebase::{
            Ticks,
            CYCLES_PER_TICK,
        },
    },
    system::SystemState,
    thread::ThreadState,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// A reference timer counting at one tick per CYCLES_PER_TICK cycles.
/// With an AFTER condition armed, reads park the thread (or raise an
/// event) until the target tick.
pub struct Timer {
    pub eventable: EventableState,
    pub id: TimerId,
    pub num: usize,
    pub core: usize,
    pub resource_id: ResourceId,
    pub condition: Condition,
    pub data: u32,
    pub paused_in: Option<ThreadId>,
    /// A wake-up is already in the runnable queue.
    pub scheduled: bool,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Timer {
    pub fn new(id: TimerId, num: usize, core: usize, resource_id: ResourceId) -> Self {
        Self {
            eventable: EventableState::new(),
            id,
            num,
            core,
            resource_id,
            condition: Condition::Full,
            data: 0,
            paused_in: None,
            scheduled: false,
        }
    }

    pub fn alloc(&mut self, owner: ThreadId) {
        self.eventable.set_in_use_on(owner);
        self.eventable.ev_data = self.resource_id.raw();
        self.condition = Condition::Full;
        self.data = 0;
        self.paused_in = None;
    }

    pub fn free(&mut self) -> bool {
        if self.paused_in.is_some() {
            return false;
        }
        self.eventable.set_in_use_off();
        true
    }

    fn condition_met(&self, now: u32) -> bool {
        match self.condition {
            Condition::Full => true,
            Condition::After => now >= self.data,
        }
    }

    fn events_armed(&self) -> bool {
        self.eventable.in_use && self.eventable.events_enabled
    }
}

impl SystemState {
    /// Reads the timer. With an unmet AFTER condition the thread parks and
    /// a wake-up is queued for the target tick.
    pub fn timer_in(&mut self, tid: ThreadId, timer: TimerId) -> ResOpResult<u32> {
        let now: u32 = (self.threads[tid.0].time / CYCLES_PER_TICK) as u32;
        let t: &mut Timer = &mut self.timers[timer.0];
        t.eventable.owner = tid;
        if t.condition_met(now) {
            return ResOpResult::Continue(now);
        }
        assert!(t.paused_in.is_none(), "timer already has a paused input");
        t.paused_in = Some(tid);
        let resource_id: ResourceId = t.resource_id;
        self.timer_arm(timer);
        self.park_thread(tid, resource_id);
        ResOpResult::Deschedule
    }

    pub fn timer_set_condition(&mut self, tid: ThreadId, timer: TimerId, condition: Condition) {
        let t: &mut Timer = &mut self.timers[timer.0];
        t.eventable.owner = tid;
        t.condition = condition;
        if t.events_armed() {
            self.timer_arm(timer);
        }
    }

    pub fn timer_set_data(&mut self, tid: ThreadId, timer: TimerId, data: u32) {
        let t: &mut Timer = &mut self.timers[timer.0];
        t.eventable.owner = tid;
        t.data = data;
        if t.events_armed() {
            self.timer_arm(timer);
        }
    }

    /// Queues the wake-up for the timer's target tick.
    fn timer_arm(&mut self, timer: TimerId) {
        let t: &mut Timer = &mut self.timers[timer.0];
        if t.scheduled || t.condition != Condition::After {
            return;
        }
        t.scheduled = true;
        let wake_up_time: Ticks = t.data as Ticks * CYCLES_PER_TICK;
        self.queue.push(Runnable::Timer(timer), wake_up_time);
    }

    /// The target tick has been reached: raise an event or wake the
    /// parked reader.
    pub(crate) fn run_timer(&mut self, timer: TimerId, time: Ticks) {
        let now: u32 = (time / CYCLES_PER_TICK) as u32;
        let (met, in_use, enabled, interrupt, owner) = {
            let t: &mut Timer = &mut self.timers[timer.0];
            t.scheduled = false;
            let e: &EventableState = &t.eventable;
            (t.condition_met(now), e.in_use, e.events_enabled, e.interrupt_mode, e.owner)
        };
        if met && in_use && enabled {
            let permitted: bool = {
                let thread: &ThreadState = &self.threads[owner.0];
                if interrupt { thread.ieble() } else { thread.eeble() }
            };
            if permitted {
                self.complete_event(owner, EventableId::Timer(timer), interrupt, time);
                return;
            }
        }
        if !met {
            // The target moved; queue a fresh wake-up.
            if self.timers[timer.0].paused_in.is_some() {
                self.timer_arm(timer);
            }
            return;
        }
        if let Some(tid) = self.timers[timer.0].paused_in.take() {
            self.wake_thread(tid, time);
        }
    }

    /// Invoked when the owner thread re-enables events: fire immediately
    /// if the condition already holds, otherwise make sure a wake-up is
    /// queued.
    pub(crate) fn timer_see_event_enable(&mut self, timer: TimerId, time: Ticks) -> bool {
        let now: u32 = (time / CYCLES_PER_TICK) as u32;
        let (met, owner, interrupt) = {
            let t: &Timer = &self.timers[timer.0];
            (t.condition_met(now), t.eventable.owner, t.eventable.interrupt_mode)
        };
        if met {
            self.complete_event(owner, EventableId::Timer(timer), interrupt, time);
            return true;
        }
        self.timer_arm(timer);
        false
    }
}
