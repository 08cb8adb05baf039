// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    config::{
        Config,
        LatencyModelType,
    },
    runtime::{
        fail::Fail,
        timebase::{
            Ticks,
            CYCLES_PER_TICK,
        },
    },
};
use ::std::collections::HashMap;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Upper bound on memoised routes.
const MAX_CACHED: usize = 100000;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Maps (source tile, destination tile, token count, route state) to a
/// delivery latency in cycles. Deterministic given its configuration; the
/// hop computation is memoised per route.
pub struct LatencyModel {
    model_type: LatencyModelType,
    tiles_per_chip: u64,
    tiles_per_switch: u64,
    switches_per_chip: u64,
    /// Switches per chip-grid dimension.
    switch_dim: u64,
    /// Chips per system-grid dimension.
    chips_dim: u64,
    num_chips: u64,
    contention_factor: f64,
    latency_thread: u64,
    latency_token: u64,
    latency_tile_switch: u64,
    latency_switch: u64,
    latency_switch_closed: u64,
    latency_serialisation: u64,
    latency_link_on_chip: u64,
    latency_link_off_chip: u64,
    cache: HashMap<(u32, u32, u32, bool), Ticks>,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl LatencyModel {
    /// Builds the model for a system of `num_tiles` tiles.
    pub fn new(config: &Config, num_tiles: usize) -> Result<Self, Fail> {
        if config.tiles_per_switch == 0 || config.switches_per_chip == 0 {
            return Err(Fail::new(libc::EINVAL, "topology dimensions must be non-zero"));
        }
        let tiles_per_chip: u64 = config.tiles_per_chip as u64;
        let num_chips: u64 = ::std::cmp::max(1, (num_tiles as u64).div_ceil(tiles_per_chip));
        let switch_dim: u64 = ::std::cmp::max(1, isqrt(config.switches_per_chip as u64));
        let chips_dim: u64 = ::std::cmp::max(1, isqrt(num_chips));
        debug!(
            "latency model: {:?}, {} tiles, {} chips ({} x {}), {} switches per chip ({} x {})",
            config.latency_model_type,
            num_tiles,
            num_chips,
            chips_dim,
            chips_dim,
            config.switches_per_chip,
            switch_dim,
            switch_dim
        );
        Ok(Self {
            model_type: config.latency_model_type,
            tiles_per_chip,
            tiles_per_switch: config.tiles_per_switch as u64,
            switches_per_chip: config.switches_per_chip as u64,
            switch_dim,
            chips_dim,
            num_chips,
            contention_factor: config.switch_contention_factor,
            latency_thread: config.latency_thread,
            latency_token: config.latency_token,
            latency_tile_switch: config.latency_tile_switch,
            latency_switch: config.latency_switch,
            latency_switch_closed: config.latency_switch_closed,
            latency_serialisation: config.latency_serialisation,
            latency_link_on_chip: config.latency_link_on_chip,
            latency_link_off_chip: config.latency_link_off_chip,
            cache: HashMap::new(),
        })
    }

    /// Latency of delivering `num_tokens` tokens from tile `s` to tile `t`.
    /// The result is in processor cycles, scaled by CYCLES_PER_TICK.
    pub fn calc(&mut self, s: u32, t: u32, num_tokens: u32, route_open: bool) -> Ticks {
        let key: (u32, u32, u32, bool) = (s, t, num_tokens, route_open);
        if let Some(&cached) = self.cache.get(&key) {
            return cached;
        }

        let cycles: f64 = if s == t {
            // Same tile: thread-to-thread transfer, no switch traversal.
            self.latency_thread as f64
        } else {
            match self.model_type {
                LatencyModelType::None => 0.0,
                LatencyModelType::Sp2dMesh => {
                    let (on_chip, off_chip) = self.mesh_hops(s as u64, t as u64);
                    self.compose(on_chip as f64, off_chip as f64, num_tokens, route_open)
                },
                LatencyModelType::SpClos => {
                    let (on_chip, off_chip) = self.clos_hops(s as u64, t as u64);
                    self.compose(on_chip as f64, off_chip as f64, num_tokens, route_open)
                },
                LatencyModelType::Rand2dMesh => {
                    // Two-phase randomised routing: both phases traverse the
                    // average distance of the grid.
                    let on_chip: f64 = 2.0 * avg_manhattan(self.switch_dim);
                    let off_chip: f64 = 2.0 * avg_manhattan(self.chips_dim);
                    self.compose(on_chip, off_chip, num_tokens, route_open)
                },
                LatencyModelType::RandClos => {
                    let on_chip: f64 = 2.0 * 2.0;
                    let off_chip: f64 = 2.0 * 2.0 * ((self.num_chips - 1) as f64 / self.num_chips as f64);
                    self.compose(on_chip, off_chip, num_tokens, route_open)
                },
            }
        };

        let latency: Ticks = (cycles.ceil() as Ticks) * CYCLES_PER_TICK;
        self.cache.insert(key, latency);
        assert!(self.cache.len() <= MAX_CACHED, "latency cache too large");
        latency
    }

    /// Per-hop cost composition shared by every topology.
    fn compose(&self, on_chip: f64, off_chip: f64, num_tokens: u32, route_open: bool) -> f64 {
        let hops: f64 = on_chip + off_chip;
        let switches: f64 = hops + 1.0;
        let mut latency: f64 = self.latency_token as f64 * num_tokens as f64;
        latency += self.latency_tile_switch as f64 * 2.0;
        latency += self.latency_link_on_chip as f64 * on_chip;
        latency += self.latency_link_off_chip as f64 * off_chip;
        if hops > 0.0 {
            latency += self.latency_serialisation as f64;
        }
        latency += switches * (self.latency_switch as f64 * self.contention_factor);
        if !route_open {
            latency += switches * self.latency_switch_closed as f64;
        }
        latency
    }

    /// Shortest-path hop counts in the 2-D mesh, preferring on-chip links.
    fn mesh_hops(&self, s: u64, t: u64) -> (u64, u64) {
        let (s_chip_x, s_chip_y, s_switch_x, s_switch_y) = self.coordinates(s);
        let (t_chip_x, t_chip_y, t_switch_x, t_switch_y) = self.coordinates(t);

        let (on_x, off_x) = self.mesh_hops_1d(s_chip_x, t_chip_x, s_switch_x, t_switch_x);
        let (on_y, off_y) = self.mesh_hops_1d(s_chip_y, t_chip_y, s_switch_y, t_switch_y);
        (on_x + on_y, off_x + off_y)
    }

    /// One dimension of the mesh walk: when the chips differ, the path
    /// exits the source chip through the facing edge switch and enters the
    /// destination chip through the opposite one.
    fn mesh_hops_1d(&self, s_chip: u64, t_chip: u64, s_switch: u64, t_switch: u64) -> (u64, u64) {
        if s_chip != t_chip {
            let off: u64 = s_chip.abs_diff(t_chip);
            let mut on: u64 = if s_chip > t_chip { s_switch } else { self.switch_dim - s_switch - 1 };
            on += if s_chip > t_chip { self.switch_dim - t_switch - 1 } else { t_switch };
            (on, off)
        } else {
            (s_switch.abs_diff(t_switch), 0)
        }
    }

    /// Clos network: two on-chip hops intra-chip, plus two off-chip hops
    /// when crossing chips.
    fn clos_hops(&self, s: u64, t: u64) -> (u64, u64) {
        if s / self.tiles_per_chip == t / self.tiles_per_chip {
            (2, 0)
        } else {
            (2, 2)
        }
    }

    /// Grid coordinates (chip x/y, switch x/y) of a tile.
    fn coordinates(&self, tile: u64) -> (u64, u64, u64, u64) {
        let chip: u64 = tile / self.tiles_per_chip;
        let chip_x: u64 = chip % self.chips_dim;
        let chip_y: u64 = chip / self.chips_dim;
        let switch: u64 = (tile / self.tiles_per_switch) % self.switches_per_chip;
        let switch_x: u64 = switch % self.switch_dim;
        let switch_y: u64 = switch / self.switch_dim;
        (chip_x, chip_y, switch_x, switch_y)
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn isqrt(value: u64) -> u64 {
    let mut root: u64 = (value as f64).sqrt() as u64;
    while (root + 1) * (root + 1) <= value {
        root += 1;
    }
    while root * root > value {
        root -= 1;
    }
    root
}

/// Expected Manhattan distance between two uniformly random points on a
/// `d` x `d` grid.
fn avg_manhattan(d: u64) -> f64 {
    if d <= 1 {
        return 0.0;
    }
    let d: f64 = d as f64;
    2.0 * (d * d - 1.0) / (3.0 * d)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::LatencyModel;
    use crate::{
        config::Config,
        runtime::timebase::CYCLES_PER_TICK,
    };

    fn mesh_config() -> Config {
        Config::parse(
            "num-chips 1\n\
             tiles-per-switch 1\n\
             switches-per-chip 16\n\
             latency-thread 1\n\
             latency-token 1\n\
             latency-tile-switch 2\n\
             latency-switch 3\n\
             latency-closed-switch 6\n\
             latency-serialisation 1\n\
             latency-link-on-chip 5\n\
             latency-link-off-chip 10\n\
             latency-model \"sp-2dmesh\"\n",
        )
        .unwrap()
    }

    #[test]
    fn same_tile_short_circuits_to_thread_latency() {
        let config: Config = mesh_config();
        let mut model: LatencyModel = LatencyModel::new(&config, 16).unwrap();
        assert_eq!(model.calc(3, 3, 4, false), CYCLES_PER_TICK);
    }

    #[test]
    fn one_hop_mesh_latency_matches_the_cost_composition() {
        let config: Config = mesh_config();
        let mut model: LatencyModel = LatencyModel::new(&config, 16).unwrap();
        // 4 tokens, one on-chip hop, closed route:
        //   4*token + 2*tileSwitch + 1*linkOnChip + serialisation
        //   + 2*switch*contention + 2*switchClosed
        let expected: u64 = 4 * 1 + 2 * 2 + 5 + 1 + 2 * 3 + 2 * 6;
        assert_eq!(model.calc(0, 1, 4, false), expected * CYCLES_PER_TICK);
    }

    #[test]
    fn open_route_skips_the_switch_setup_cost() {
        let config: Config = mesh_config();
        let mut model: LatencyModel = LatencyModel::new(&config, 16).unwrap();
        let closed: u64 = model.calc(0, 1, 4, false);
        let open: u64 = model.calc(0, 1, 4, true);
        assert_eq!(closed - open, 2 * 6 * CYCLES_PER_TICK);
    }

    #[test]
    fn mesh_distance_grows_with_hops() {
        let config: Config = mesh_config();
        let mut model: LatencyModel = LatencyModel::new(&config, 16).unwrap();
        // Tile 0 is switch (0,0); tile 15 is switch (3,3): 6 on-chip hops.
        let near: u64 = model.calc(0, 1, 1, true);
        let far: u64 = model.calc(0, 15, 1, true);
        assert!(far > near);
    }

    #[test]
    fn none_model_is_free_between_tiles() {
        let config: Config = Config::default();
        let mut model: LatencyModel = LatencyModel::new(&config, 4).unwrap();
        assert_eq!(model.calc(0, 1, 4, false), 0);
        assert_eq!(model.calc(0, 0, 1, false), CYCLES_PER_TICK);
    }

    #[test]
    fn clos_adds_off_chip_hops_between_chips() {
        let text: &str = "num-chips 2\n\
                          tiles-per-switch 4\n\
                          switches-per-chip 1\n\
                          latency-link-off-chip 10\n\
                          latency-model \"sp-clos\"\n";
        let config: Config = Config::parse(text).unwrap();
        let mut model: LatencyModel = LatencyModel::new(&config, 8).unwrap();
        let intra: u64 = model.calc(0, 1, 1, true);
        let inter: u64 = model.calc(0, 4, 1, true);
        assert_eq!(inter - intra, 2 * 10 * CYCLES_PER_TICK);
    }
}
