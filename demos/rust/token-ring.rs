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
// Constants
//======================================================================================================================

const TILES: usize = 4;
const LAPS: usize = 8;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// One thread per tile passes a byte token around a unidirectional ring.
/// Configure a mesh latency model (-c) to see cross-tile costs show up in
/// the finishing times.
fn main() -> Result<()> {
    let config: Config = match ::std::env::args().nth(1) {
        Some(file) => Config::read(&file)?,
        None => Config::default(),
    };
    let mut sys: SystemState = SystemBuilder::new(config).add_node(TILES).build()?;

    let threads: Vec<ThreadId> = (0..TILES).map(|core| sys.thread_on_core(core, 0)).collect();
    let chanend_ids: Vec<ResourceId> = threads
        .iter()
        .map(|&tid| sys.alloc_resource(tid, ResourceType::Chanend).expect("no free chanend"))
        .collect();

    for i in 0..TILES {
        let cid = sys.get_chanend_dest(chanend_ids[i]).unwrap();
        let next: ResourceId = chanend_ids[(i + 1) % TILES];
        let mut ops: Vec<ScriptOp> = vec![ScriptOp::SetData { chanend: cid, dest: next.raw() }];
        for _ in 0..LAPS {
            if i == 0 {
                ops.push(ScriptOp::Outt { chanend: cid, value: 0x42 });
                ops.push(ScriptOp::Intoken { chanend: cid });
            } else {
                ops.push(ScriptOp::Intoken { chanend: cid });
                ops.push(ScriptOp::Outt { chanend: cid, value: 0x42 });
            }
        }
        ops.push(ScriptOp::Outct { chanend: cid, value: ControlToken::End as u8 });
        if i == 0 {
            ops.push(ScriptOp::Exit { status: 0 });
        }
        let program: ScriptProgram = ScriptProgram::new(ops);
        sys.install_program(threads[i], Box::new(program) as Box<dyn Program>);
        sys.schedule_thread(threads[i]);
    }

    let status: i32 = sys.run();
    for (i, &tid) in threads.iter().enumerate() {
        println!("tile {}: finished at {} cycles", i, sys.thread(tid).time);
    }
    println!("exit status: {}", status);
    Ok(())
}
