// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    resource::{
        Condition,
        EventableId,
        ResOpResult,
    },
    runtime::queue::{
        ChanendId,
        ThreadId,
        TimerId,
    },
    system::SystemState,
    thread::{
        ExceptionType,
        StatusReg,
    },
};
use ::std::{
    cell::RefCell,
    rc::Rc,
};

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Outcome of dispatching one guest instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepResult {
    /// The instruction completed; keep dispatching.
    Continue,
    /// The thread parked on a resource; it will be re-added on wake.
    Deschedule,
    /// The program ran to completion; the thread halts.
    Done,
    /// The guest requested exit with the given status.
    Exit(i32),
}

/// One scripted guest instruction. Channel, timer and event operations
/// map one-to-one onto the resource operations threads invoke.
#[derive(Clone, Debug)]
pub enum ScriptOp {
    SetData { chanend: ChanendId, dest: u32 },
    Outt { chanend: ChanendId, value: u8 },
    Out { chanend: ChanendId, value: u32 },
    Outct { chanend: ChanendId, value: u8 },
    Intoken { chanend: ChanendId },
    Inct { chanend: ChanendId },
    Chkct { chanend: ChanendId, value: u8 },
    In { chanend: ChanendId },
    Testct { chanend: ChanendId },
    Testwct { chanend: ChanendId },
    FreeChanend { chanend: ChanendId },
    Setv { chanend: ChanendId, vector: u32 },
    EventEnable { chanend: ChanendId },
    EventDisable { chanend: ChanendId },
    InterruptMode { chanend: ChanendId },
    SetSr { bits: StatusReg },
    Waiteu,
    TimerIn { timer: TimerId },
    TimerAfter { timer: TimerId, ticks: u32 },
    Compute { instructions: u32 },
    Exit { status: i32 },
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Observations a scripted thread makes as it runs; shared with the test
/// or demo that installed the script.
#[derive(Debug, Default)]
pub struct ScriptLog {
    /// Values produced by input operations, in order.
    pub words: Vec<u32>,
    /// Outcomes of testct (0/1) and testwct (position) operations.
    pub tests: Vec<u32>,
    /// Operations that raised a guest exception.
    pub illegals: u32,
    /// The script ran past its last operation.
    pub finished: bool,
}

/// A guest program as a sequence of resource operations. Descheduled
/// operations re-execute on wake, exactly like a real instruction whose
/// pc was not advanced.
pub struct ScriptProgram {
    ops: Vec<ScriptOp>,
    pc: usize,
    compute_progress: u32,
    log: Rc<RefCell<ScriptLog>>,
}

//======================================================================================================================
// Traits
//======================================================================================================================

/// The decoded-instruction seam: one call per guest instruction. The
/// implementation invokes resource operations on the system and decides
/// how the thread proceeds.
pub trait Program {
    fn step(&mut self, sys: &mut SystemState, tid: ThreadId) -> StepResult;
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl ScriptProgram {
    pub fn new(ops: Vec<ScriptOp>) -> Self {
        Self {
            ops,
            pc: 0,
            compute_progress: 0,
            log: Rc::new(RefCell::new(ScriptLog::default())),
        }
    }

    /// Handle for inspecting the script's observations after the run.
    pub fn log(&self) -> Rc<RefCell<ScriptLog>> {
        self.log.clone()
    }

    /// Chanend a faulting operation should report in ED, if any.
    fn op_chanend(op: &ScriptOp) -> Option<ChanendId> {
        match op {
            ScriptOp::Outt { chanend, .. }
            | ScriptOp::Out { chanend, .. }
            | ScriptOp::Outct { chanend, .. }
            | ScriptOp::Intoken { chanend }
            | ScriptOp::Inct { chanend }
            | ScriptOp::Chkct { chanend, .. }
            | ScriptOp::In { chanend }
            | ScriptOp::Testct { chanend }
            | ScriptOp::Testwct { chanend } => Some(*chanend),
            _ => None,
        }
    }

    fn op_name(op: &ScriptOp) -> &'static str {
        match op {
            ScriptOp::SetData { .. } => "setd",
            ScriptOp::Outt { .. } => "outt",
            ScriptOp::Out { .. } => "out",
            ScriptOp::Outct { .. } => "outct",
            ScriptOp::Intoken { .. } => "int",
            ScriptOp::Inct { .. } => "inct",
            ScriptOp::Chkct { .. } => "chkct",
            ScriptOp::In { .. } => "in",
            ScriptOp::Testct { .. } => "testct",
            ScriptOp::Testwct { .. } => "testwct",
            ScriptOp::FreeChanend { .. } => "freer",
            ScriptOp::Setv { .. } => "setv",
            ScriptOp::EventEnable { .. } => "eeu",
            ScriptOp::EventDisable { .. } => "edu",
            ScriptOp::InterruptMode { .. } => "setc",
            ScriptOp::SetSr { .. } => "setsr",
            ScriptOp::Waiteu => "waiteu",
            ScriptOp::TimerIn { .. } => "gettime",
            ScriptOp::TimerAfter { .. } => "setd",
            ScriptOp::Compute { .. } => "add",
            ScriptOp::Exit { .. } => "exit",
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Program for ScriptProgram {
    fn step(&mut self, sys: &mut SystemState, tid: ThreadId) -> StepResult {
        let op: ScriptOp = match self.ops.get(self.pc) {
            Some(op) => op.clone(),
            None => {
                self.log.borrow_mut().finished = true;
                return StepResult::Done;
            },
        };
        sys.record_instruction(tid, Self::op_name(&op));
        let fault_chanend: Option<ChanendId> = Self::op_chanend(&op);

        // Operations returning a value feed the log; ILLEGAL raises a
        // guest exception and the script carries on.
        let result: ResOpResult<Option<u32>> = match op {
            ScriptOp::SetData { chanend, dest } => {
                if !sys.chanend_set_data(tid, chanend, dest) {
                    warn!("Could not SETD.");
                }
                ResOpResult::Continue(None)
            },
            ScriptOp::Outt { chanend, value } => lift(sys.chanend_outt(tid, chanend, value)),
            ScriptOp::Out { chanend, value } => lift(sys.chanend_out(tid, chanend, value)),
            ScriptOp::Outct { chanend, value } => lift(sys.chanend_outct(tid, chanend, value)),
            ScriptOp::Intoken { chanend } => lift_value(sys.chanend_intoken(tid, chanend)),
            ScriptOp::Inct { chanend } => lift_value(sys.chanend_inct(tid, chanend)),
            ScriptOp::Chkct { chanend, value } => lift(sys.chanend_chkct(tid, chanend, value)),
            ScriptOp::In { chanend } => lift_value(sys.chanend_in(tid, chanend)),
            ScriptOp::Testct { chanend } => match sys.chanend_testct(tid, chanend) {
                ResOpResult::Continue(is_ct) => {
                    self.log.borrow_mut().tests.push(is_ct as u32);
                    ResOpResult::Continue(None)
                },
                ResOpResult::Deschedule => ResOpResult::Deschedule,
                ResOpResult::Illegal => ResOpResult::Illegal,
            },
            ScriptOp::Testwct { chanend } => match sys.chanend_testwct(tid, chanend) {
                ResOpResult::Continue(position) => {
                    self.log.borrow_mut().tests.push(position);
                    ResOpResult::Continue(None)
                },
                ResOpResult::Deschedule => ResOpResult::Deschedule,
                ResOpResult::Illegal => ResOpResult::Illegal,
            },
            ScriptOp::FreeChanend { chanend } => {
                if !sys.chanend_free(tid, chanend) {
                    warn!("could not free chanend {:?}", chanend);
                }
                ResOpResult::Continue(None)
            },
            ScriptOp::Setv { chanend, vector } => {
                sys.eventable_setv(tid, EventableId::Chanend(chanend), vector);
                ResOpResult::Continue(None)
            },
            ScriptOp::EventEnable { chanend } => {
                sys.eventable_set_event_enable(tid, EventableId::Chanend(chanend), true);
                ResOpResult::Continue(None)
            },
            ScriptOp::EventDisable { chanend } => {
                sys.eventable_set_event_enable(tid, EventableId::Chanend(chanend), false);
                ResOpResult::Continue(None)
            },
            ScriptOp::InterruptMode { chanend } => {
                sys.eventable_set_interrupt_mode(tid, EventableId::Chanend(chanend), true);
                ResOpResult::Continue(None)
            },
            ScriptOp::SetSr { bits } => {
                sys.thread_set_sr(tid, bits);
                ResOpResult::Continue(None)
            },
            ScriptOp::Waiteu => lift(sys.thread_waiteu(tid)),
            ScriptOp::TimerIn { timer } => lift_value(sys.timer_in(tid, timer)),
            ScriptOp::TimerAfter { timer, ticks } => {
                sys.timer_set_data(tid, timer, ticks);
                sys.timer_set_condition(tid, timer, Condition::After);
                ResOpResult::Continue(None)
            },
            ScriptOp::Compute { instructions } => {
                self.compute_progress += 1;
                if self.compute_progress >= instructions {
                    self.compute_progress = 0;
                    self.pc += 1;
                }
                return StepResult::Continue;
            },
            ScriptOp::Exit { status } => return StepResult::Exit(status),
        };

        match result {
            ResOpResult::Continue(value) => {
                if let Some(value) = value {
                    self.log.borrow_mut().words.push(value);
                }
                self.pc += 1;
                StepResult::Continue
            },
            ResOpResult::Deschedule => StepResult::Deschedule,
            ResOpResult::Illegal => {
                self.log.borrow_mut().illegals += 1;
                let ed: u32 = fault_chanend.map_or(0, |cid| sys.chanend(cid).resource_id.raw());
                sys.thread_exception(tid, ExceptionType::IllegalResource, ed);
                self.pc += 1;
                StepResult::Continue
            },
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn lift(result: ResOpResult) -> ResOpResult<Option<u32>> {
    match result {
        ResOpResult::Continue(()) => ResOpResult::Continue(None),
        ResOpResult::Deschedule => ResOpResult::Deschedule,
        ResOpResult::Illegal => ResOpResult::Illegal,
    }
}

fn lift_value(result: ResOpResult<u32>) -> ResOpResult<Option<u32>> {
    match result {
        ResOpResult::Continue(value) => ResOpResult::Continue(Some(value)),
        ResOpResult::Deschedule => ResOpResult::Deschedule,
        ResOpResult::Illegal => ResOpResult::Illegal,
    }
}
