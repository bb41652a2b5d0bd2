//! Operator commands from the text console and protobuf envelopes.

use bevy::prelude::*;
use sim_runtime::{CommandPayload, PlaceBuildingCommand, PlayerId, SpawnUnitCommand};

use crate::{
    commands::{PlayerInputs, SubmitError},
    economy::PlayerLedgers,
    metrics::SimulationMetrics,
    resources::{NavigationEpoch, SimulationTick},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOutcome {
    /// Run this many ticks now, even while paused.
    Step(u32),
    Pause,
    Resume,
    Status(String),
    /// Command stored for the given player; it applies on the next tick.
    Queued(PlayerId),
}

/// Apply `payload` to the server world. Player commands are stamped with the
/// next tick and go through the same buffers as client input.
pub fn submit_operator_command(
    world: &mut World,
    payload: CommandPayload,
) -> Result<ConsoleOutcome, SubmitError> {
    let tick = world.resource::<SimulationTick>().0.next();
    match payload {
        CommandPayload::Turn { steps } => Ok(ConsoleOutcome::Step(steps.max(1))),
        CommandPayload::Pause => Ok(ConsoleOutcome::Pause),
        CommandPayload::Resume => Ok(ConsoleOutcome::Resume),
        CommandPayload::Status => Ok(ConsoleOutcome::Status(status_line(world))),
        CommandPayload::PlaceBuilding {
            player_id,
            kind,
            position,
        } => {
            let player = PlayerId(player_id);
            world.resource_mut::<PlayerInputs>().submit_placement(
                player,
                PlaceBuildingCommand {
                    tick,
                    kind,
                    position,
                },
            )?;
            tracing::info!(
                target: "rts::server",
                player = %player,
                building = kind.as_str(),
                tick = %tick,
                "console.place_queued"
            );
            Ok(ConsoleOutcome::Queued(player))
        }
        CommandPayload::SpawnUnit {
            player_id,
            kind,
            building_position,
            command_id,
        } => {
            let player = PlayerId(player_id);
            world.resource_mut::<PlayerInputs>().submit_spawn(
                player,
                SpawnUnitCommand {
                    tick,
                    kind,
                    building_position,
                    command_id,
                },
            )?;
            tracing::info!(
                target: "rts::server",
                player = %player,
                unit = kind.as_str(),
                command_id = command_id.0,
                "console.spawn_queued"
            );
            Ok(ConsoleOutcome::Queued(player))
        }
    }
}

pub fn status_line(world: &World) -> String {
    let metrics = world.resource::<SimulationMetrics>();
    let epoch = world.resource::<NavigationEpoch>().0;
    let mut line = format!(
        "tick={} units={} idle={} moving={} gathering={} storing={} constructing={} \
         applied={} duplicate={} rejected={} gathered={} nav_epoch={}",
        metrics.tick,
        metrics.units,
        metrics.workers_idle,
        metrics.workers_moving,
        metrics.workers_gathering,
        metrics.workers_storing,
        metrics.workers_constructing,
        metrics.commands_applied,
        metrics.commands_duplicate,
        metrics.commands_rejected,
        metrics.resources_gathered,
        epoch,
    );
    for state in world.resource::<PlayerLedgers>().states() {
        line.push_str(&format!(
            " p{}[wood={} food={} pop={}/{}]",
            state.player.0,
            state.wood,
            state.food,
            state.population_current,
            state.population_max
        ));
    }
    line
}
