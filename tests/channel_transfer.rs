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
    ResOpResult,
    ResourceId,
    ScriptOp,
    ScriptProgram,
    SystemBuilder,
    SystemState,
    ThreadId,
};

//======================================================================================================================
// Constants
//======================================================================================================================

const CT_END: u8 = ControlToken::End as u8;
const CT_ACK: u8 = ControlToken::Ack as u8;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn single_tile_system() -> SystemState {
    SystemBuilder::new(Config::default()).add_node(1).build().unwrap()
}

/// Allocates a chanend owned by `tid` and returns both handles.
fn alloc_chanend(sys: &mut SystemState, tid: ThreadId) -> (ResourceId, ChanendId) {
    let id: ResourceId = sys.alloc_resource(tid, ResourceType::Chanend).unwrap();
    let cid: ChanendId = sys.get_chanend_dest(id).unwrap();
    (id, cid)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// Two threads on one tile exchange a word and an END token through the
/// full scheduler loop.
#[test]
fn loopback_word_transfer_round_trips() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1_id: ResourceId = sys.alloc_resource(t0, ResourceType::Thread).unwrap();
    let t1: ThreadId = sys.thread_on_core(0, t1_id.num() as usize);
    let (_, c0) = alloc_chanend(&mut sys, t0);
    let (c1_id, c1) = alloc_chanend(&mut sys, t1);

    let sender: ScriptProgram = ScriptProgram::new(vec![
        ScriptOp::SetData { chanend: c0, dest: c1_id.raw() },
        ScriptOp::Out { chanend: c0, value: 0xdeadbeef },
        ScriptOp::Outct { chanend: c0, value: CT_END },
    ]);
    let receiver: ScriptProgram = ScriptProgram::new(vec![
        ScriptOp::In { chanend: c1 },
        ScriptOp::Chkct { chanend: c1, value: CT_END },
        ScriptOp::Exit { status: 0 },
    ]);
    let receiver_log: Rc<RefCell<ScriptLog>> = receiver.log();

    sys.install_program(t0, Box::new(sender) as Box<dyn Program>);
    sys.install_program(t1, Box::new(receiver) as Box<dyn Program>);
    sys.schedule_thread(t0);
    sys.schedule_thread(t1);

    let status: i32 = sys.run();
    assert_eq!(status, 0);
    let log = receiver_log.borrow();
    assert_eq!(log.words, vec![0xdeadbeef]);
    assert_eq!(log.illegals, 0);
}

/// chkct with the wrong expected value is ILLEGAL and leaves the token in
/// place; a subsequent inct still pops it.
#[test]
fn chkct_mismatch_is_illegal_and_does_not_pop() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(0, 1);
    let (_, c0) = alloc_chanend(&mut sys, t0);
    let (c1_id, c1) = alloc_chanend(&mut sys, t1);

    assert!(sys.chanend_set_data(t0, c0, c1_id.raw()));
    assert!(sys.chanend_outct(t0, c0, CT_END).is_continue());
    let _ = sys.run();

    assert_eq!(sys.chanend_chkct(t1, c1, CT_ACK), ResOpResult::Illegal);
    assert_eq!(sys.chanend_inct(t1, c1), ResOpResult::Continue(CT_END as u32));
}

/// A word input whose first four tokens include a control token is
/// ILLEGAL.
#[test]
fn word_input_over_control_token_is_illegal() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(0, 1);
    let (_, c0) = alloc_chanend(&mut sys, t0);
    let (c1_id, c1) = alloc_chanend(&mut sys, t1);

    assert!(sys.chanend_set_data(t0, c0, c1_id.raw()));
    assert!(sys.chanend_outt(t0, c0, 0x11).is_continue());
    assert!(sys.chanend_outt(t0, c0, 0x22).is_continue());
    assert!(sys.chanend_outct(t0, c0, CT_ACK).is_continue());
    assert!(sys.chanend_outt(t0, c0, 0x33).is_continue());
    let _ = sys.run();

    assert_eq!(sys.chanend_in(t1, c1), ResOpResult::Illegal);
    // The data tokens are still there.
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Continue(0x11));
}

/// testwct reports the 1-based position of the first control token in the
/// first word, or 0 when the word is all data.
#[test]
fn testwct_reports_first_control_position() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(0, 1);
    let (_, c0) = alloc_chanend(&mut sys, t0);
    let (c1_id, c1) = alloc_chanend(&mut sys, t1);

    assert!(sys.chanend_set_data(t0, c0, c1_id.raw()));

    // Fewer than four tokens, none control: the reader parks.
    assert!(sys.chanend_outt(t0, c0, 1).is_continue());
    assert!(sys.chanend_outt(t0, c0, 2).is_continue());
    let _ = sys.run();
    assert_eq!(sys.chanend_testwct(t1, c1), ResOpResult::<u32>::Deschedule);

    // A word wait is only satisfied by four buffered tokens.
    assert!(sys.chanend_outct(t0, c0, CT_ACK).is_continue());
    let _ = sys.run();
    assert!(sys.chanend(c1).paused_in.is_some());
    assert!(sys.chanend_outt(t0, c0, 3).is_continue());
    let _ = sys.run();
    assert!(sys.chanend(c1).paused_in.is_none());

    // The retried testwct sees the control token at position 3.
    assert_eq!(sys.chanend_testwct(t1, c1), ResOpResult::Continue(3));

    // Drain, then deliver four data tokens: position 0.
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Continue(1));
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Continue(2));
    assert_eq!(sys.chanend_inct(t1, c1), ResOpResult::Continue(CT_ACK as u32));
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Continue(3));
    assert!(sys.chanend_out(t0, c0, 0x0a0b0c0d).is_continue());
    let _ = sys.run();
    assert_eq!(sys.chanend_testwct(t1, c1), ResOpResult::Continue(0));
    assert_eq!(sys.chanend_in(t1, c1), ResOpResult::Continue(0x0a0b0c0d));
}

/// intoken on a control token and inct on a data token are both ILLEGAL.
#[test]
fn token_kind_mismatches_are_illegal() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(0, 1);
    let (_, c0) = alloc_chanend(&mut sys, t0);
    let (c1_id, c1) = alloc_chanend(&mut sys, t1);

    assert!(sys.chanend_set_data(t0, c0, c1_id.raw()));
    assert!(sys.chanend_outt(t0, c0, 0x7f).is_continue());
    let _ = sys.run();
    assert_eq!(sys.chanend_inct(t1, c1), ResOpResult::Illegal);
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Continue(0x7f));

    assert!(sys.chanend_outct(t0, c0, CT_ACK).is_continue());
    let _ = sys.run();
    assert_eq!(sys.chanend_intoken(t1, c1), ResOpResult::Illegal);
    assert_eq!(sys.chanend_inct(t1, c1), ResOpResult::Continue(CT_ACK as u32));
}

/// A paused word input wakes only once four data tokens are present.
#[test]
fn word_wait_needs_a_full_word() {
    let mut sys: SystemState = single_tile_system();
    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1: ThreadId = sys.thread_on_core(0, 1);
    let (_, c0) = alloc_chanend(&mut sys, t0);
    let (c1_id, c1) = alloc_chanend(&mut sys, t1);

    assert!(sys.chanend_set_data(t0, c0, c1_id.raw()));
    assert_eq!(sys.chanend_in(t1, c1), ResOpResult::<u32>::Deschedule);

    assert!(sys.chanend_outt(t0, c0, 0xde).is_continue());
    let _ = sys.run();
    // Still waiting: one token is not a word.
    assert!(sys.chanend(c1).paused_in.is_some());

    assert!(sys.chanend_outt(t0, c0, 0xad).is_continue());
    assert!(sys.chanend_outt(t0, c0, 0xbe).is_continue());
    assert!(sys.chanend_outt(t0, c0, 0xef).is_continue());
    let _ = sys.run();
    assert!(sys.chanend(c1).paused_in.is_none());
    assert_eq!(sys.chanend_in(t1, c1), ResOpResult::Continue(0xdeadbeef));
}
