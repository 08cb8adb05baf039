// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    timebase::{
        Ticks,
        CYCLES_PER_SEC,
        CYCLES_PER_TICK,
        INSTRUCTION_CYCLES,
    },
};
use ::std::fs;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of hardware threads per tile.
pub const NUM_THREADS: usize = 16;

/// Number of synchronisers per tile.
pub const NUM_SYNCS: usize = 16;

/// Number of locks per tile.
pub const NUM_LOCKS: usize = 4;

/// Number of timers per tile.
pub const NUM_TIMERS: usize = 10;

/// Number of channel ends per tile.
pub const NUM_CHANENDS: usize = 32;

/// Number of clock blocks per tile.
pub const NUM_CLKBLKS: usize = 6;

/// Port complement per tile, as (width, count) pairs.
pub const PORT_SPEC: [(usize, usize); 5] = [(1, 16), (4, 6), (8, 4), (16, 4), (32, 2)];

/// Size of the input buffer in a chanend, in tokens.
pub const CHANEND_BUFFER_SIZE: usize = 8;

/// Log base 2 of the default memory size in bytes.
pub const DEFAULT_RAM_SIZE_LOG: u32 = 16;

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Interconnect topology driving the latency model.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LatencyModelType {
    None,
    Sp2dMesh,
    SpClos,
    Rand2dMesh,
    RandClos,
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Immutable runtime configuration: system topology and interconnect
/// latency parameters. Built once at startup and threaded through the
/// constructors that need it.
#[derive(Clone, Debug)]
pub struct Config {
    pub ram_size_log: u32,
    pub ram_size: u32,
    pub ram_base: u32,
    pub num_chips: u32,
    pub tiles_per_switch: u32,
    pub switches_per_chip: u32,
    pub tiles_per_chip: u32,
    pub switch_contention_factor: f64,
    /// Scaled by CYCLES_PER_TICK at load time.
    pub latency_global_memory: Ticks,
    /// Scaled by CYCLES_PER_TICK at load time.
    pub latency_local_memory: Ticks,
    pub latency_thread: u64,
    pub latency_token: u64,
    pub latency_tile_switch: u64,
    pub latency_switch: u64,
    pub latency_switch_closed: u64,
    pub latency_serialisation: u64,
    pub latency_link_on_chip: u64,
    pub latency_link_off_chip: u64,
    pub latency_model_type: LatencyModelType,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file of `key value` lines and folds it over
    /// the defaults.
    pub fn read(filename: &str) -> Result<Self, Fail> {
        let text: String = match fs::read_to_string(filename) {
            Ok(text) => text,
            Err(e) => {
                let cause: String = format!("cannot read config file {}: {}", filename, e);
                return Err(Fail::new(libc::ENOENT, &cause));
            },
        };
        Self::parse(&text)
    }

    /// Parses configuration text. Unknown keys are errors.
    pub fn parse(text: &str) -> Result<Self, Fail> {
        let mut config: Config = Config::default();
        for line in text.lines() {
            let line: &str = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => return Err(Fail::new(libc::EINVAL, &format!("invalid configuration parameter: {}", line))),
            };
            match key {
                "num-chips" => config.num_chips = parse_int(key, value)?,
                "tiles-per-chip" => config.tiles_per_chip = parse_int(key, value)?,
                "tiles-per-switch" => config.tiles_per_switch = parse_int(key, value)?,
                "switches-per-chip" => config.switches_per_chip = parse_int(key, value)?,
                "switch-contention-factor" => {
                    config.switch_contention_factor = match value.parse::<f64>() {
                        Ok(factor) => factor,
                        Err(_) => {
                            let cause: String = format!("invalid {}: {}", key, value);
                            return Err(Fail::new(libc::EINVAL, &cause));
                        },
                    }
                },
                "latency-global-memory" => config.latency_global_memory = parse_int::<u64>(key, value)?,
                "latency-local-memory" => config.latency_local_memory = parse_int::<u64>(key, value)?,
                "latency-thread" => config.latency_thread = parse_int(key, value)?,
                "latency-token" => config.latency_token = parse_int(key, value)?,
                "latency-tile-switch" => config.latency_tile_switch = parse_int(key, value)?,
                "latency-switch" => config.latency_switch = parse_int(key, value)?,
                "latency-closed-switch" => config.latency_switch_closed = parse_int(key, value)?,
                "latency-serialisation" => config.latency_serialisation = parse_int(key, value)?,
                "latency-link-on-chip" => config.latency_link_on_chip = parse_int(key, value)?,
                "latency-link-off-chip" => config.latency_link_off_chip = parse_int(key, value)?,
                "latency-model" => {
                    let name: &str = value.trim_matches('"');
                    config.latency_model_type = match name {
                        "sp-2dmesh" => LatencyModelType::Sp2dMesh,
                        "sp-clos" => LatencyModelType::SpClos,
                        "rand-2dmesh" => LatencyModelType::Rand2dMesh,
                        "rand-clos" => LatencyModelType::RandClos,
                        "none" => LatencyModelType::None,
                        _ => return Err(Fail::new(libc::EINVAL, &format!("invalid latency model: {}", name))),
                    };
                },
                _ => return Err(Fail::new(libc::EINVAL, &format!("invalid configuration parameter: {}", line))),
            }
        }

        // Consequential parameters.
        config.latency_global_memory *= CYCLES_PER_TICK;
        config.latency_local_memory *= CYCLES_PER_TICK;
        config.tiles_per_chip = config.switches_per_chip * config.tiles_per_switch;

        Ok(config)
    }

    /// Dumps the fixed system parameters and, when a latency model is
    /// selected, the interconnect parameters.
    pub fn display(&self) {
        let ram_size_kb: f64 = self.ram_size as f64 / 1000.0;
        let core_freq_mhz: f64 = CYCLES_PER_SEC as f64 / 1000000.0;
        println!("System parameters ====================");
        println!("Num threads per tile:         {}", NUM_THREADS);
        println!("Num synchronisers per tile:   {}", NUM_SYNCS);
        println!("Num locks per tile:           {}", NUM_LOCKS);
        println!("Num timers per tile:          {}", NUM_TIMERS);
        println!("Num channel ends per tile:    {}", NUM_CHANENDS);
        println!("Memory size per tile:         {:.4}KB", ram_size_kb);
        println!("Tile frequency:               {:.4}MHz", core_freq_mhz);
        println!("Thread cycles:                {}", INSTRUCTION_CYCLES);
        if self.latency_model_type != LatencyModelType::None {
            println!("Latency model parameters =============");
            println!("{:<22}{}", "Num chips", self.num_chips);
            println!("{:<22}{}", "Switches per chip", self.switches_per_chip);
            println!("{:<22}{}", "Tiles per switch", self.tiles_per_switch);
            println!("{:<22}{}", "Tiles per chip", self.tiles_per_chip);
            println!("{:<22}{}", "Latency global memory", self.latency_global_memory / CYCLES_PER_TICK);
            println!("{:<22}{}", "Latency local memory", self.latency_local_memory / CYCLES_PER_TICK);
            println!("{:<22}{}", "Latency thread", self.latency_thread);
            println!("{:<22}{}", "Latency token", self.latency_token);
            println!("{:<22}{}", "Latency tile to switch", self.latency_tile_switch);
            println!("{:<22}{}", "Latency switch", self.latency_switch);
            println!("{:<22}{}", "Latency switch closed", self.latency_switch_closed);
            println!("{:<22}{}", "Latency serialisation", self.latency_serialisation);
            println!("{:<22}{}", "Latency link on-chip", self.latency_link_on_chip);
            println!("{:<22}{}", "Latency link off-chip", self.latency_link_off_chip);
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn parse_int<T: ::std::str::FromStr>(key: &str, value: &str) -> Result<T, Fail> {
    match value.parse::<T>() {
        Ok(value) => Ok(value),
        Err(_) => Err(Fail::new(libc::EINVAL, &format!("invalid {}: {}", key, value))),
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for Config {
    fn default() -> Self {
        Self {
            ram_size_log: DEFAULT_RAM_SIZE_LOG,
            ram_size: 1 << DEFAULT_RAM_SIZE_LOG,
            ram_base: 1 << DEFAULT_RAM_SIZE_LOG,
            num_chips: 1,
            tiles_per_switch: 1,
            switches_per_chip: 1,
            tiles_per_chip: 1,
            switch_contention_factor: 1.0,
            latency_global_memory: 0,
            latency_local_memory: 0,
            latency_thread: 1,
            latency_token: 0,
            latency_tile_switch: 0,
            latency_switch: 0,
            latency_switch_closed: 0,
            latency_serialisation: 0,
            latency_link_on_chip: 0,
            latency_link_off_chip: 0,
            latency_model_type: LatencyModelType::None,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
