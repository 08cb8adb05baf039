// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Constants
//======================================================================================================================

/// Simulation time in processor cycles. Monotonic within each agent.
pub type Ticks = u64;

/// Processor clock frequency (400MHz, 2.5ns cycle).
pub const CYCLES_PER_SEC: u64 = 400 * 1000000;

/// Number of processor cycles per 100MHz reference-timer tick.
pub const CYCLES_PER_TICK: Ticks = 4;

/// Time charged for executing one guest instruction.
pub const INSTRUCTION_CYCLES: Ticks = CYCLES_PER_TICK;
