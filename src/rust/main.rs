// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::clap::{
    Arg,
    ArgAction,
    Command,
};
use ::tilesim::{
    loader::SeImage,
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

#[macro_use]
extern crate log;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn main() {
    ::std::process::exit(match run() {
        Ok(status) => status,
        Err(e) => {
            eprintln!("error: {}", e);
            1
        },
    });
}

fn run() -> Result<i32> {
    let matches = Command::new("tilesim")
        .about("Cycle-accurate functional simulator for many-tile message-passing processors")
        .arg(
            Arg::new("trace")
                .short('t')
                .action(ArgAction::SetTrue)
                .help("Enable instruction tracing"),
        )
        .arg(
            Arg::new("se")
                .short('s')
                .action(ArgAction::SetTrue)
                .help("Simulate an SE program"),
        )
        .arg(
            Arg::new("system-stats")
                .short('S')
                .action(ArgAction::SetTrue)
                .help("Display system statistics"),
        )
        .arg(
            Arg::new("inst-stats")
                .short('I')
                .action(ArgAction::SetTrue)
                .help("Display instruction statistics"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .value_name("FILE")
                .help("Specify a configuration file"),
        )
        .arg(
            Arg::new("config-display")
                .short('C')
                .value_name("FILE")
                .conflicts_with("config")
                .help("Specify a configuration file and display values"),
        )
        .arg(Arg::new("image").required(true).help("SE image or demo:<name> scenario"))
        .get_matches();

    let tracing: bool = matches.get_flag("trace");
    let level: &str = if tracing { "trace" } else { "warn" };
    let _logger = ::flexi_logger::Logger::try_with_env_or_str(level)?.log_to_stdout().start()?;

    let mut config: Config = Config::default();
    let display_config: bool = matches.contains_id("config-display");
    if let Some(file) = matches.get_one::<String>("config").or(matches.get_one::<String>("config-display")) {
        config = match Config::read(file) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                return Ok(1);
            },
        };
    }
    if display_config {
        config.display();
    }

    let image: &str = matches.get_one::<String>("image").expect("image is required");
    let mut sys: SystemState = match build_system(&config, image, matches.get_flag("se")) {
        Ok(sys) => sys,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(1);
        },
    };

    if matches.get_flag("inst-stats") {
        sys.stats_mut().set_enabled(true);
    }

    let status: i32 = sys.run();

    if matches.get_flag("system-stats") {
        sys.system_stats();
    }
    if matches.get_flag("inst-stats") {
        sys.stats_mut().dump();
    }
    Ok(status)
}

/// Builds the simulated system for an SE image or a built-in demo
/// scenario.
fn build_system(config: &Config, image: &str, se: bool) -> Result<SystemState> {
    if let Some(name) = image.strip_prefix("demo:") {
        return build_demo(config, name);
    }
    if !se {
        ::anyhow::bail!("XE images require the external loader; pass -s for SE images or use demo:<name>");
    }
    let se_image: SeImage = SeImage::read(image)?;
    let mut sys: SystemState = SystemBuilder::new(config.clone())
        .add_node(se_image.num_cores as usize)
        .build()?;
    se_image.load_into(&mut sys)?;
    for core in 0..sys.num_cores() {
        let tid: ThreadId = sys.thread_on_core(core, 0);
        sys.schedule_thread(tid);
    }
    warn!("no instruction decoder is linked in; threads without programs will not run");
    Ok(sys)
}

fn build_demo(config: &Config, name: &str) -> Result<SystemState> {
    match name {
        "ping-pong" => demo_ping_pong(config),
        "token-ring" => demo_token_ring(config),
        _ => ::anyhow::bail!("unknown demo \"{}\" (try ping-pong or token-ring)", name),
    }
}

/// Two threads on one tile bounce a word and close their packets.
fn demo_ping_pong(config: &Config) -> Result<SystemState> {
    const CT_END: u8 = ControlToken::End as u8;
    let mut sys: SystemState = SystemBuilder::new(config.clone()).add_node(1).build()?;

    let t0: ThreadId = sys.thread_on_core(0, 0);
    let t1_id: ResourceId = sys
        .alloc_resource(t0, ResourceType::Thread)
        .ok_or_else(|| ::anyhow::anyhow!("no free thread"))?;
    let t1: ThreadId = sys.thread_on_core(0, t1_id.num() as usize);

    let c0_id: ResourceId = sys.alloc_resource(t0, ResourceType::Chanend).unwrap();
    let c1_id: ResourceId = sys.alloc_resource(t1, ResourceType::Chanend).unwrap();
    let c0 = sys.get_chanend_dest(c0_id).unwrap();
    let c1 = sys.get_chanend_dest(c1_id).unwrap();

    let ping: ScriptProgram = ScriptProgram::new(vec![
        ScriptOp::SetData { chanend: c0, dest: c1_id.raw() },
        ScriptOp::Out { chanend: c0, value: 0xdeadbeef },
        ScriptOp::Outct { chanend: c0, value: CT_END },
        ScriptOp::In { chanend: c0 },
        ScriptOp::Chkct { chanend: c0, value: CT_END },
        ScriptOp::Exit { status: 0 },
    ]);
    let pong: ScriptProgram = ScriptProgram::new(vec![
        ScriptOp::SetData { chanend: c1, dest: c0_id.raw() },
        ScriptOp::In { chanend: c1 },
        ScriptOp::Chkct { chanend: c1, value: CT_END },
        ScriptOp::Out { chanend: c1, value: 0xdeadbeef },
        ScriptOp::Outct { chanend: c1, value: CT_END },
    ]);
    sys.install_program(t0, Box::new(ping) as Box<dyn Program>);
    sys.install_program(t1, Box::new(pong) as Box<dyn Program>);
    sys.schedule_thread(t0);
    sys.schedule_thread(t1);
    Ok(sys)
}

/// Four tiles pass a byte token around a ring for a few laps.
fn demo_token_ring(config: &Config) -> Result<SystemState> {
    const TILES: usize = 4;
    const LAPS: usize = 3;
    let mut sys: SystemState = SystemBuilder::new(config.clone()).add_node(TILES).build()?;

    let threads: Vec<ThreadId> = (0..TILES).map(|core| sys.thread_on_core(core, 0)).collect();
    let chanend_ids: Vec<ResourceId> = threads
        .iter()
        .map(|&tid| sys.alloc_resource(tid, ResourceType::Chanend).unwrap())
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
    Ok(sys)
}
