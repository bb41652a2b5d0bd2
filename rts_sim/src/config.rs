use std::{
    env, fs, io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

use crate::economy::EconomyLedger;

pub const BUILTIN_SIMULATION_CONFIG: &str = include_str!("data/simulation_config.json");

/// Which path oracle a client app plans with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationMode {
    #[default]
    Grid,
    Direct,
}

/// Starting economy for every registered player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StartingLedger {
    pub wood: u32,
    pub food: u32,
    pub population_current: u32,
    pub population_max: u32,
}

impl Default for StartingLedger {
    fn default() -> Self {
        Self {
            wood: 200,
            food: 100,
            population_current: 0,
            population_max: 0,
        }
    }
}

impl StartingLedger {
    pub fn ledger(&self) -> EconomyLedger {
        EconomyLedger::new(
            self.wood,
            self.food,
            self.population_current,
            self.population_max,
        )
    }
}

/// Global configuration shared by the server and client apps.
#[derive(Resource, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_rate: u32,
    pub map_size: [f32; 2],
    pub cell_size: f32,
    pub seed: u64,
    pub players: u32,
    pub populate_world: bool,
    pub starting_workers: u32,
    pub resource_nodes_per_player: u32,
    pub resource_node_value: u32,
    pub starting_ledger: StartingLedger,
    pub placement_dedup_epsilon_sq: f32,
    pub spawn_dedup_window_ticks: u32,
    pub command_buffer_capacity: usize,
    pub gather_interval_secs: f32,
    pub gather_range: f32,
    pub interact_margin: f32,
    pub construction_rate: f32,
    pub income_interval_secs: f32,
    pub fallback_search_radius: f32,
    pub building_match_radius: f32,
    pub correction_epsilon: f32,
    pub command_redundancy_ticks: u32,
    pub prediction_history_ticks: usize,
    pub snapshot_history_limit: usize,
    pub navigation: NavigationMode,
    pub session_bind: SocketAddr,
    pub command_bind: SocketAddr,
    pub envelope_bind: SocketAddr,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 30,
            map_size: [64.0, 64.0],
            cell_size: 1.0,
            seed: 1337,
            players: 2,
            populate_world: true,
            starting_workers: 3,
            resource_nodes_per_player: 6,
            resource_node_value: 400,
            starting_ledger: StartingLedger::default(),
            placement_dedup_epsilon_sq: 0.01,
            spawn_dedup_window_ticks: 120,
            command_buffer_capacity: 64,
            gather_interval_secs: 1.0,
            gather_range: 2.0,
            interact_margin: 1.5,
            construction_rate: 1.0,
            income_interval_secs: 1.0,
            fallback_search_radius: 6.0,
            building_match_radius: 2.0,
            correction_epsilon: 0.05,
            command_redundancy_ticks: 10,
            prediction_history_ticks: 128,
            snapshot_history_limit: 64,
            navigation: NavigationMode::Grid,
            session_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42000),
            command_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42001),
            envelope_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 42002),
        }
    }
}

impl SimulationConfig {
    pub fn builtin() -> Self {
        serde_json::from_str(BUILTIN_SIMULATION_CONFIG)
            .expect("builtin simulation config should parse")
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = SimulationConfig::from_json_str(&contents)?;
        Ok(config)
    }

    /// Fixed simulation step in seconds.
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Convert a duration into a whole number of ticks, never less than one.
    pub fn ticks_for(&self, seconds: f32) -> u32 {
        ((seconds * self.tick_rate as f32).round() as u32).max(1)
    }

    pub fn gather_interval_ticks(&self) -> u32 {
        self.ticks_for(self.gather_interval_secs)
    }

    pub fn income_interval_ticks(&self) -> u32 {
        self.ticks_for(self.income_interval_secs)
    }

    /// Whether `position` lies on the playable ground plane.
    pub fn in_bounds(&self, position: [f32; 3]) -> bool {
        position[0] >= 0.0
            && position[2] >= 0.0
            && position[0] <= self.map_size[0]
            && position[2] <= self.map_size[1]
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse simulation config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read simulation config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Load the simulation config from `RTS_SIM_CONFIG_PATH`, falling back to the
/// shipped JSON and finally the compiled-in copy.
pub fn load_simulation_config_from_env() -> SimulationConfig {
    let override_path = env::var("RTS_SIM_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path =
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/simulation_config.json");
    let path = override_path.unwrap_or(default_path);

    match SimulationConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "rts::config",
                path = %path.display(),
                "simulation_config.loaded=file"
            );
            config
        }
        Err(err) => {
            tracing::warn!(
                target: "rts::config",
                path = %path.display(),
                error = %err,
                "simulation_config.load_failed"
            );
            tracing::info!(target: "rts::config", "simulation_config.loaded=builtin");
            SimulationConfig::builtin()
        }
    }
}
