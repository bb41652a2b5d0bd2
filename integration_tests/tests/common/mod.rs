#![allow(dead_code)]

use bevy::prelude::*;
use rts_sim::components::NetworkId;
use rts_sim::setup::{spawn_building, spawn_resource_node, spawn_unit};
use rts_sim::{build_server_app, run_tick, SimulationConfig, SimulationTick, UnitCatalog};
use sim_runtime::{
    BuildingKind, InputFrame, NetEntity, PlayerId, ResourceKind, TargetDescriptor, Tick,
    UnitInput, UnitKind, WaypointBuffer,
};

const TEST_CONFIG: &str = include_str!("../fixtures/test_simulation_config.json");

/// Empty two-player map with one-tick gathering.
pub fn test_config() -> SimulationConfig {
    SimulationConfig::from_json_str(TEST_CONFIG).expect("test simulation config parses")
}

/// Server app that has already run its startup tick.
pub fn server_app(config: SimulationConfig) -> App {
    let mut app = build_server_app(config, UnitCatalog::builtin());
    run_tick(&mut app);
    app
}

pub fn run_ticks(app: &mut App, ticks: u32) {
    for _ in 0..ticks {
        run_tick(app);
    }
}

pub fn current_tick(app: &App) -> Tick {
    app.world.resource::<SimulationTick>().0
}

pub fn net_of(app: &App, entity: Entity) -> NetEntity {
    app.world
        .get::<NetworkId>(entity)
        .expect("entity has a network id")
        .0
}

pub fn position_of(app: &App, entity: Entity) -> Vec3 {
    app.world
        .get::<Transform>(entity)
        .expect("entity has a transform")
        .translation
}

pub fn worker(app: &mut App, player: PlayerId, position: Vec3) -> Entity {
    spawn_unit(&mut app.world, UnitKind::Worker, player, position)
}

pub fn center(app: &mut App, player: PlayerId, position: Vec3) -> Entity {
    spawn_building(&mut app.world, BuildingKind::Center, player, position, false)
}

pub fn wood(app: &mut App, value: u32, position: Vec3) -> Entity {
    spawn_resource_node(&mut app.world, ResourceKind::Wood, value, position)
}

/// Submit `target` with its planned waypoints for the next tick, the way a
/// client frame would carry it.
pub fn order(
    app: &mut App,
    player: PlayerId,
    unit: Entity,
    target: TargetDescriptor,
    waypoints: &[[f32; 3]],
) {
    let tick = current_tick(app).next();
    let mut frame = InputFrame::empty(player, tick);
    frame.units.push(UnitInput {
        entity: net_of(app, unit),
        target,
        waypoints: WaypointBuffer::from_corners(waypoints),
    });
    app.world
        .resource_mut::<rts_sim::PlayerInputs>()
        .submit(frame)
        .expect("frame accepted");
}
