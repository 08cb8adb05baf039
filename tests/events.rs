// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::tilesim::{
    resource::{
        EventableId,
        ResourceType,
    },
    thread::{
        Register,
        StatusReg,
    },
    ChanendId,
    Config,
    ResOpResult,
    ResourceId,
    SystemBuilder,
    SystemState,
    ThreadId,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn setup() -> (SystemState, ThreadId, ThreadId, ChanendId, ChanendId, ResourceId) {
    let mut sys: SystemState = SystemBuilder::new(Config::default()).add_node(1).build().unwrap();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(0, 1);
    let c0_id: ResourceId = sys.alloc_resource(t0, ResourceType::Chanend).unwrap();
    let c1_id: ResourceId = sys.alloc_resource(t1, ResourceType::Chanend).unwrap();
    let c0: ChanendId = sys.get_chanend_dest(c0_id).unwrap();
    let c1: ChanendId = sys.get_chanend_dest(c1_id).unwrap();
    assert!(sys.chanend_set_data(t0, c0, c1_id.raw()));
    (sys, t0, t1, c0, c1, c1_id)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// A token arriving on an event-armed chanend redirects the owner to the
/// event vector without saving the interrupt context.
#[test]
fn event_redirects_without_saving_context() {
    let (mut sys, t0, t1, c0, c1, c1_id) = setup();

    sys.eventable_setv(t1, EventableId::Chanend(c1), 0x80);
    sys.eventable_set_event_enable(t1, EventableId::Chanend(c1), true);
    // The owner waits for events, suspended on nothing.
    assert_eq!(sys.thread_waiteu(t1), ResOpResult::Deschedule);
    assert!(sys.thread(t1).sr.contains(StatusReg::WAITING));

    assert!(sys.chanend_outt(t0, c0, 0x09).is_continue());
    let _ = sys.run();

    let t = sys.thread(t1);
    assert_eq!(t.pc, 0x80);
    assert_eq!(t.reg(Register::Ed), c1_id.raw());
    // Event, not interrupt: nothing was saved.
    assert_eq!(t.reg(Register::Ssr), 0);
    assert_eq!(t.reg(Register::Spc), 0);
    assert!(!t.sr.contains(StatusReg::ININT));
    assert!(!t.sr.contains(StatusReg::INK));
    assert!(!t.sr.contains(StatusReg::EEBLE));
    assert!(!t.sr.contains(StatusReg::WAITING));
    assert!(t.took_event);

    // The token is still in the buffer for the handler to read.
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Continue(0x09));
}

/// In interrupt mode the same arrival saves SR/PC/ED into SSR/SPC/SED and
/// enters kernel mode.
#[test]
fn interrupt_saves_context_and_enters_kernel_mode() {
    let (mut sys, t0, t1, c0, c1, c1_id) = setup();

    sys.eventable_setv(t1, EventableId::Chanend(c1), 0x90);
    sys.eventable_set_interrupt_mode(t1, EventableId::Chanend(c1), true);
    sys.eventable_set_event_enable(t1, EventableId::Chanend(c1), true);
    {
        let t = sys.thread_mut(t1);
        t.pc = 0x1234;
        t.set_reg(Register::Ed, 0x55);
    }
    assert!(!sys.thread_set_sr(t1, StatusReg::IEBLE));
    let saved_sr: u32 = sys.thread(t1).sr.bits();

    assert!(sys.chanend_outt(t0, c0, 0x0a).is_continue());
    let _ = sys.run();

    let t = sys.thread(t1);
    assert_eq!(t.pc, 0x90);
    assert_eq!(t.reg(Register::Spc), 0x1234);
    assert_eq!(t.reg(Register::Ssr), saved_sr);
    assert_eq!(t.reg(Register::Sed), 0x55);
    assert_eq!(t.reg(Register::Ed), c1_id.raw());
    assert!(t.sr.contains(StatusReg::ININT));
    assert!(t.sr.contains(StatusReg::INK));
    assert!(!t.sr.contains(StatusReg::IEBLE));
}

/// Re-enabling events on a thread fires a pending event from an armed
/// resource with a non-empty buffer.
#[test]
fn pending_event_fires_on_event_enable() {
    let (mut sys, t0, t1, c0, c1, _) = setup();

    sys.eventable_setv(t1, EventableId::Chanend(c1), 0xa0);
    sys.eventable_set_event_enable(t1, EventableId::Chanend(c1), true);

    // Token arrives while events are masked: it just buffers.
    assert!(sys.chanend_outt(t0, c0, 0x01).is_continue());
    let _ = sys.run();
    assert_eq!(sys.thread(t1).pc, 0);

    // Unmasking fires the pending event immediately.
    assert!(sys.thread_set_sr(t1, StatusReg::EEBLE));
    assert_eq!(sys.thread(t1).pc, 0xa0);
}

/// An event is preferred over waking a paused input.
#[test]
fn disabled_events_fall_back_to_paused_input_wake() {
    let (mut sys, t0, t1, c0, c1, _) = setup();

    // Events armed on the resource but the owner never enables EEBLE:
    // the paused input must still be woken.
    sys.eventable_setv(t1, EventableId::Chanend(c1), 0xb0);
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Deschedule);
    assert!(sys.chanend_outt(t0, c0, 0x33).is_continue());
    let _ = sys.run();
    assert!(sys.chanend(c1).paused_in.is_none());
    assert_eq!(sys.thread(t1).pc, 0);
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Continue(0x33));
}
