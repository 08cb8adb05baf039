// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::tilesim::{
    resource::ResourceType,
    token::ControlToken,
    Config,
    Program,
    ResourceId,
    ScriptOp,
    ScriptProgram,
    SystemBuilder,
    SystemState,
    ThreadId,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Two threads on one tile bounce a word across a pair of channel ends
/// and close their packets with END control tokens.
fn main() -> Result<()> {
    const CT_END: u8 = ControlToken::End as u8;
    let config: Config = Config::default();
    let mut sys: SystemState = SystemBuilder::new(config).add_node(1).build()?;

    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1_id: ResourceId = sys.alloc_resource(t0, ResourceType::Thread).expect("no free thread");
    let t1: ThreadId = sys.thread_on_core(0, t1_id.num() as usize);

    let c0_id: ResourceId = sys.alloc_resource(t0, ResourceType::Chanend).expect("no free chanend");
    let c1_id: ResourceId = sys.alloc_resource(t1, ResourceType::Chanend).expect("no free chanend");
    let c0 = sys.get_chanend_dest(c0_id).unwrap();
    let c1 = sys.get_chanend_dest(c1_id).unwrap();

    let ping: ScriptProgram = ScriptProgram::new(vec![
        ScriptOp::SetData { chanend: c0, dest: c1_id.raw() },
        ScriptOp::Out { chanend: c0, value: 0xcafe0001 },
        ScriptOp::Outct { chanend: c0, value: CT_END },
        ScriptOp::In { chanend: c0 },
        ScriptOp::Chkct { chanend: c0, value: CT_END },
        ScriptOp::Exit { status: 0 },
    ]);
    let ping_log = ping.log();

    let pong: ScriptProgram = ScriptProgram::new(vec![
        ScriptOp::SetData { chanend: c1, dest: c0_id.raw() },
        ScriptOp::In { chanend: c1 },
        ScriptOp::Chkct { chanend: c1, value: CT_END },
        ScriptOp::Out { chanend: c1, value: 0xcafe0002 },
        ScriptOp::Outct { chanend: c1, value: CT_END },
    ]);
    let pong_log = pong.log();

    sys.install_program(t0, Box::new(ping) as Box<dyn Program>);
    sys.install_program(t1, Box::new(pong) as Box<dyn Program>);
    sys.schedule_thread(t0);
    sys.schedule_thread(t1);

    let status: i32 = sys.run();
    println!("exit status: {}", status);
    println!("ping received: {:#010x?}", ping_log.borrow().words);
    println!("pong received: {:#010x?}", pong_log.borrow().words);
    println!("ping finished at {} cycles", sys.thread(t0).time);
    Ok(())
}
