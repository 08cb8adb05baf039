// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    resource::{
        EventableId,
        ResourceId,
    },
    runtime::{
        queue::ThreadId,
        timebase::Ticks,
    },
};
use ::bitflags::bitflags;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of architectural registers per thread.
pub const NUM_REGISTERS: usize = 23;

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Architectural register file layout.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(usize)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    Cp,
    Dp,
    Sp,
    Lr,
    Et,
    Ed,
    Kep,
    Ksp,
    Spc,
    Sed,
    Ssr,
}

/// Guest exception types.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ExceptionType {
    LinkError = 1,
    IllegalPc = 2,
    IllegalInstruction = 3,
    IllegalResource = 4,
    LoadStore = 5,
    Ecall = 8,
    ResourceDep = 9,
}

//======================================================================================================================
// Structures
//======================================================================================================================

bitflags! {
    /// Thread status register bits.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct StatusReg: u32 {
        /// Events enabled.
        const EEBLE = 1 << 0;
        /// Interrupts enabled.
        const IEBLE = 1 << 1;
        /// Thread is in an event handler.
        const INENB = 1 << 2;
        /// Thread is in an interrupt handler.
        const ININT = 1 << 3;
        /// Thread is in kernel mode.
        const INK = 1 << 4;
        /// Thread is descheduled, waiting on a resource or an event.
        const WAITING = 1 << 5;
    }
}

/// An executing agent: register file, status flags, local time and the
/// resource currently blocking it, if any.
pub struct ThreadState {
    /// Flat arena index of this thread.
    pub id: ThreadId,
    /// Thread number on its tile.
    pub num: usize,
    /// Flat index of the owning tile.
    pub core: usize,
    pub in_use: bool,
    pub regs: [u32; NUM_REGISTERS],
    pub sr: StatusReg,
    pub pc: u32,
    /// Local time, in cycles.
    pub time: Ticks,
    /// Instructions executed.
    pub count: u64,
    /// Resource this thread is parked on, if any.
    pub paused_on: Option<ResourceId>,
    /// Synchroniser this thread is bound to, if any, as (core, number).
    pub sync: Option<(usize, usize)>,
    /// Eventable resources owned by this thread with events or interrupts
    /// armed; walked when the thread re-enables EEBLE/IEBLE.
    pub event_resources: Vec<EventableId>,
    /// Set when an event or interrupt completes on this thread; consumed
    /// by the wait-for-event instruction on resumption.
    pub took_event: bool,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl ThreadState {
    pub fn new(id: ThreadId, num: usize, core: usize) -> Self {
        Self {
            id,
            num,
            core,
            in_use: false,
            regs: [0; NUM_REGISTERS],
            sr: StatusReg::empty(),
            pc: 0,
            time: 0,
            count: 0,
            paused_on: None,
            sync: None,
            event_resources: Vec::new(),
            took_event: false,
        }
    }

    pub fn alloc(&mut self) {
        self.in_use = true;
        self.regs = [0; NUM_REGISTERS];
        self.sr = StatusReg::empty();
        self.pc = 0;
        self.paused_on = None;
        self.sync = None;
        self.event_resources.clear();
        self.took_event = false;
    }

    pub fn free(&mut self) {
        self.in_use = false;
        self.sync = None;
        self.event_resources.clear();
    }

    pub fn reg(&self, r: Register) -> u32 {
        self.regs[r as usize]
    }

    pub fn set_reg(&mut self, r: Register, value: u32) {
        self.regs[r as usize] = value;
    }

    pub fn eeble(&self) -> bool {
        self.sr.contains(StatusReg::EEBLE)
    }

    pub fn ieble(&self) -> bool {
        self.sr.contains(StatusReg::IEBLE)
    }

    /// Raises a guest exception: saves SPC/SSR/SED, loads ET/ED, enters
    /// kernel mode and jumps to the kernel entry point. Never terminates
    /// the simulation.
    pub fn exception(&mut self, et: ExceptionType, ed: u32) {
        debug!("thread {:?}: exception {:?} (ed={:#x})", self.id, et, ed);
        self.set_reg(Register::Ssr, self.sr.bits());
        self.set_reg(Register::Spc, self.pc);
        let old_ed: u32 = self.reg(Register::Ed);
        self.set_reg(Register::Sed, old_ed);
        self.set_reg(Register::Et, et as u32);
        self.set_reg(Register::Ed, ed);
        self.sr.remove(StatusReg::EEBLE | StatusReg::IEBLE);
        self.sr.insert(StatusReg::INK);
        self.pc = self.reg(Register::Kep);
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        ExceptionType,
        Register,
        StatusReg,
        ThreadState,
    };
    use crate::runtime::queue::ThreadId;

    #[test]
    fn exception_saves_and_redirects() {
        let mut thread: ThreadState = ThreadState::new(ThreadId(0), 0, 0);
        thread.alloc();
        thread.pc = 0x100;
        thread.set_reg(Register::Kep, 0x40);
        thread.set_reg(Register::Ed, 7);
        thread.sr = StatusReg::EEBLE | StatusReg::IEBLE;
        thread.exception(ExceptionType::IllegalResource, 0x1234);
        assert_eq!(thread.reg(Register::Spc), 0x100);
        assert_eq!(thread.reg(Register::Sed), 7);
        assert_eq!(thread.reg(Register::Et), ExceptionType::IllegalResource as u32);
        assert_eq!(thread.reg(Register::Ed), 0x1234);
        assert_eq!(thread.pc, 0x40);
        assert!(thread.sr.contains(StatusReg::INK));
        assert!(!thread.eeble());
        assert!(!thread.ieble());
    }
}
