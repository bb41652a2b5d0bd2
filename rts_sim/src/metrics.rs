use bevy::prelude::*;

use crate::{
    components::{Unit, Worker},
    resources::SimulationTick,
    workers::UnitTask,
};

#[derive(Resource, Default, Debug, Clone)]
pub struct SimulationMetrics {
    pub tick: u32,
    pub units: u32,
    pub workers_idle: u32,
    pub workers_moving: u32,
    pub workers_gathering: u32,
    pub workers_storing: u32,
    pub workers_constructing: u32,
    pub commands_applied: u64,
    pub commands_duplicate: u64,
    pub commands_rejected: u64,
    pub resources_gathered: u64,
    /// Carried resources discarded when a worker switched to another kind.
    pub resources_dropped: u64,
    /// Client only: snapshots that forced a snap-and-replay.
    pub rollbacks: u64,
}

pub fn collect_metrics(
    tick: Res<SimulationTick>,
    mut metrics: ResMut<SimulationMetrics>,
    units: Query<(), With<Unit>>,
    workers: Query<&UnitTask, With<Worker>>,
) {
    metrics.tick = tick.0 .0;
    metrics.units = units.iter().count() as u32;

    let mut counts = [0u32; 5];
    for task in workers.iter() {
        let slot = match task {
            UnitTask::Idle => 0,
            UnitTask::Moving => 1,
            UnitTask::Gathering(_) => 2,
            UnitTask::Storing(_) => 3,
            UnitTask::Constructing(_) => 4,
        };
        counts[slot] += 1;
    }
    metrics.workers_idle = counts[0];
    metrics.workers_moving = counts[1];
    metrics.workers_gathering = counts[2];
    metrics.workers_storing = counts[3];
    metrics.workers_constructing = counts[4];
}
