// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod collections;
pub mod runtime;

pub mod chanend;
pub mod config;
pub mod core;
pub mod delay;
pub mod latency;
pub mod loader;
pub mod lock;
pub mod node;
pub mod program;
pub mod resource;
pub mod stats;
pub mod synchroniser;
pub mod system;
pub mod thread;
pub mod timer;
pub mod token;

pub use crate::{
    config::Config,
    latency::LatencyModel,
    program::{
        Program,
        ScriptLog,
        ScriptOp,
        ScriptProgram,
        StepResult,
    },
    resource::{
        ResOpResult,
        ResourceId,
        ResourceType,
    },
    runtime::{
        fail::Fail,
        queue::{
            ChanendId,
            Runnable,
            RunnableQueue,
            ThreadId,
            TimerId,
        },
        timebase::{
            Ticks,
            CYCLES_PER_SEC,
            CYCLES_PER_TICK,
            INSTRUCTION_CYCLES,
        },
    },
    system::{
        SystemBuilder,
        SystemState,
    },
    token::{
        ControlToken,
        Token,
    },
};

#[macro_use]
extern crate log;
