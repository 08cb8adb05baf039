// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::{
    cell::RefCell,
    rc::Rc,
};
use ::tilesim::{
    program::ScriptLog,
    resource::ResourceType,
    token::ControlToken,
    ChanendId,
    Config,
    Program,
    ResourceId,
    ScriptOp,
    ScriptProgram,
    SystemBuilder,
    SystemState,
    ThreadId,
    CYCLES_PER_TICK,
};

//======================================================================================================================
// Constants
//======================================================================================================================

const CT_END: u8 = ControlToken::End as u8;
const CT_READ4: u8 = ControlToken::Read4 as u8;
const CT_WRITE4: u8 = ControlToken::Write4 as u8;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn two_tile_system() -> SystemState {
    let config: Config = Config::parse("latency-global-memory 20\n").unwrap();
    SystemBuilder::new(config).add_node(2).build().unwrap()
}

fn chanend_for(sys: &mut SystemState, tid: ThreadId) -> (ResourceId, ChanendId) {
    let id: ResourceId = sys.alloc_resource(tid, ResourceType::Chanend).unwrap();
    let cid: ChanendId = sys.get_chanend_dest(id).unwrap();
    (id, cid)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// A READ4 packet returns the word stored at the remote address, and the
/// requester is charged the global-memory latency.
#[test]
fn read4_returns_the_remote_word() {
    let mut sys: SystemState = two_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(1, 0);
    let (c0_id, c0) = chanend_for(&mut sys, t0);
    let (c1_id, _) = chanend_for(&mut sys, t1);

    // The served word lives on tile 1.
    let ram_base: u32 = sys.core(1).ram_base;
    sys.core_mut(1).store_word(0x200, 0x5ca1ab1e);

    let requester: ScriptProgram = ScriptProgram::new(vec![
        ScriptOp::SetData { chanend: c0, dest: c1_id.raw() },
        ScriptOp::Outct { chanend: c0, value: CT_READ4 },
        ScriptOp::Out { chanend: c0, value: c0_id.raw() },
        ScriptOp::Out { chanend: c0, value: ram_base + 0x200 },
        ScriptOp::Outct { chanend: c0, value: CT_END },
        ScriptOp::In { chanend: c0 },
        ScriptOp::Chkct { chanend: c0, value: CT_END },
        ScriptOp::Exit { status: 0 },
    ]);
    let log: Rc<RefCell<ScriptLog>> = requester.log();
    sys.install_program(t0, Box::new(requester) as Box<dyn Program>);
    sys.schedule_thread(t0);

    let status: i32 = sys.run();
    assert_eq!(status, 0);
    assert_eq!(log.borrow().words, vec![0x5ca1ab1e]);
    assert_eq!(log.borrow().illegals, 0);

    // Global memory latency (scaled at config load) plus the fixed
    // service cost is visible in the requester's time.
    let surcharge: u64 = 20 * CYCLES_PER_TICK + 2 * CYCLES_PER_TICK;
    assert!(sys.thread(t0).time >= surcharge);
}

/// A WRITE4 packet stores the word remotely and acknowledges with
/// CT_END.
#[test]
fn write4_stores_the_remote_word() {
    let mut sys: SystemState = two_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(1, 0);
    let (c0_id, c0) = chanend_for(&mut sys, t0);
    let (c1_id, _) = chanend_for(&mut sys, t1);

    let ram_base: u32 = sys.core(1).ram_base;

    let writer: ScriptProgram = ScriptProgram::new(vec![
        ScriptOp::SetData { chanend: c0, dest: c1_id.raw() },
        ScriptOp::Outct { chanend: c0, value: CT_WRITE4 },
        ScriptOp::Out { chanend: c0, value: c0_id.raw() },
        ScriptOp::Out { chanend: c0, value: ram_base + 0x80 },
        ScriptOp::Out { chanend: c0, value: 0xfeedface },
        ScriptOp::Outct { chanend: c0, value: CT_END },
        ScriptOp::Chkct { chanend: c0, value: CT_END },
        ScriptOp::Exit { status: 0 },
    ]);
    let log: Rc<RefCell<ScriptLog>> = writer.log();
    sys.install_program(t0, Box::new(writer) as Box<dyn Program>);
    sys.schedule_thread(t0);

    let status: i32 = sys.run();
    assert_eq!(status, 0);
    assert_eq!(log.borrow().illegals, 0);
    assert_eq!(sys.core(1).load_word(0x80), 0xfeedface);
}

/// An out-of-range address is reported and the access is dropped; the
/// guest does not crash the simulator.
#[test]
fn invalid_address_drops_the_access() {
    let mut sys: SystemState = two_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(1, 0);
    let (c0_id, c0) = chanend_for(&mut sys, t0);
    let (c1_id, c1) = chanend_for(&mut sys, t1);

    assert!(sys.chanend_set_data(t0, c0, c1_id.raw()));
    assert!(sys.chanend_outct(t0, c0, CT_WRITE4).is_continue());
    assert!(sys.chanend_out(t0, c0, c0_id.raw()).is_continue());
    assert!(sys.chanend_out(t0, c0, 0xffff_fff0).is_continue());
    assert!(sys.chanend_out(t0, c0, 0x1234_5678).is_continue());
    assert!(sys.chanend_outct(t0, c0, CT_END).is_continue());
    let _ = sys.run();

    // No acknowledgement came back and the serving endpoint is idle
    // again.
    assert!(sys.chanend(c0).buf.is_empty());
    assert!(sys.chanend(c1).mem_access.is_none());
}

/// A malformed memory access packet (stray short data group) is reported
/// and abandoned.
#[test]
fn malformed_packet_is_abandoned() {
    let mut sys: SystemState = two_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(1, 0);
    let (_, c0) = chanend_for(&mut sys, t0);
    let (c1_id, c1) = chanend_for(&mut sys, t1);

    assert!(sys.chanend_set_data(t0, c0, c1_id.raw()));
    assert!(sys.chanend_outct(t0, c0, CT_READ4).is_continue());
    // A lone byte instead of a word.
    assert!(sys.chanend_outt(t0, c0, 0x01).is_continue());
    let _ = sys.run();
    assert!(sys.chanend(c1).mem_access.is_none());
    assert!(sys.chanend(c1).buf.is_empty());
}
