//! Authoritative RTS simulation with client-side movement prediction.
//!
//! The server app ingests per-player input frames, resolves unit targets,
//! moves units along client-planned waypoints, runs the worker task machine
//! and settles the economy once per tick. Client apps mirror the server
//! through snapshots and predict their own units in between.

pub mod catalog;
pub mod client;
pub mod commands;
pub mod components;
pub mod config;
pub mod console;
pub mod economy;
pub mod intents;
pub mod metrics;
pub mod movement;
pub mod navigation;
pub mod network;
pub mod prediction;
pub mod resources;
pub mod session;
pub mod setup;
pub mod snapshot;
pub mod spatial;
pub mod targeting;
pub mod waypoints;
pub mod workers;

use std::sync::Arc;

use bevy::prelude::*;
use sim_runtime::PlayerId;

pub use catalog::{load_unit_catalog_from_env, UnitCatalog, UnitCatalogHandle};
pub use client::build_client_app;
pub use commands::{PlayerInputs, PlayerRegistry, SubmitError};
pub use config::{load_simulation_config_from_env, NavigationMode, SimulationConfig};
pub use console::{submit_operator_command, ConsoleOutcome};
pub use economy::{EconomyLedger, LedgerError, PlayerLedgers};
pub use intents::IntentError;
pub use metrics::SimulationMetrics;
pub use resources::{NavigationEpoch, NetworkIds, SimulationTick};
pub use session::LoopbackSession;
pub use snapshot::{SnapshotHistory, StoredSnapshot};

/// Ordered stages of one server tick.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimPhase {
    Ingest,
    Targeting,
    Movement,
    Tasks,
    Economy,
    Replication,
}

pub fn advance_tick(mut tick: ResMut<SimulationTick>) {
    tick.0 = tick.0.next();
}

/// Construct the authoritative server app.
pub fn build_server_app(config: SimulationConfig, catalog: Arc<UnitCatalog>) -> App {
    let mut app = App::new();

    let registry = PlayerRegistry::with_count(config.players);
    let inputs = PlayerInputs::new(&registry.players, config.command_buffer_capacity);
    let mut ledgers = PlayerLedgers::default();
    for player in &registry.players {
        ledgers.insert(*player, config.starting_ledger.ledger());
    }
    let history = SnapshotHistory::with_capacity(config.snapshot_history_limit);

    app.insert_resource(history)
        .insert_resource(ledgers)
        .insert_resource(inputs)
        .insert_resource(registry)
        .insert_resource(UnitCatalogHandle::new(catalog))
        .insert_resource(config)
        .init_resource::<SimulationTick>()
        .init_resource::<NavigationEpoch>()
        .init_resource::<NetworkIds>()
        .init_resource::<spatial::SpatialIndex>()
        .init_resource::<economy::PendingMutations>()
        .init_resource::<SimulationMetrics>()
        .add_plugins(MinimalPlugins)
        .configure_sets(
            Update,
            (
                SimPhase::Ingest,
                SimPhase::Targeting,
                SimPhase::Movement,
                SimPhase::Tasks,
                SimPhase::Economy,
                SimPhase::Replication,
            )
                .chain(),
        )
        .add_systems(Startup, setup::spawn_initial_world)
        .add_systems(
            Update,
            (
                advance_tick,
                spatial::rebuild_spatial_index,
                commands::ingest_unit_inputs,
                commands::apply_placement_commands,
                commands::apply_spawn_commands,
                commands::advance_recruitment,
            )
                .chain()
                .in_set(SimPhase::Ingest),
        )
        .add_systems(
            Update,
            targeting::resolve_unit_targets.in_set(SimPhase::Targeting),
        )
        .add_systems(Update, movement::follow_waypoints.in_set(SimPhase::Movement))
        .add_systems(Update, workers::run_worker_tasks.in_set(SimPhase::Tasks))
        .add_systems(
            Update,
            (
                economy::apply_pending_mutations,
                economy::apply_completion_effects,
                economy::accrue_passive_income,
            )
                .chain()
                .in_set(SimPhase::Economy),
        )
        .add_systems(
            Update,
            (metrics::collect_metrics, snapshot::capture_snapshot)
                .chain()
                .in_set(SimPhase::Replication),
        );

    app
}

/// Execute a single simulation tick.
pub fn run_tick(app: &mut App) {
    app.update();
}

/// Player ids registered on a server world.
pub fn registered_players(world: &World) -> Vec<PlayerId> {
    world.resource::<PlayerRegistry>().players.clone()
}

#[cfg(test)]
mod tests {
    use sim_runtime::Tick;

    use super::*;

    #[test]
    fn server_ticks_and_captures_snapshots() {
        let mut app = build_server_app(SimulationConfig::default(), UnitCatalog::builtin());
        run_tick(&mut app);
        run_tick(&mut app);

        assert_eq!(app.world.resource::<SimulationTick>().0, Tick(2));
        let history = app.world.resource::<SnapshotHistory>();
        let latest = history.latest().expect("snapshot");
        assert_eq!(latest.tick, Tick(2));
        let players = registered_players(&app.world);
        assert_eq!(latest.snapshot.ledgers.len(), players.len());
        assert!(!latest.snapshot.units.is_empty());
    }
}
