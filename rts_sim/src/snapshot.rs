use std::collections::VecDeque;
use std::sync::Arc;

use bevy::prelude::*;
use sim_runtime::{
    encode_delta, encode_snapshot, BuildingState, CarryState, ProgressState, ResourceNodeState,
    SnapshotHeader, Tick, UnitState, WorldDelta, WorldSnapshot,
};

use crate::{
    components::{
        Building, ConstructionProgress, MoveSpeed, NetworkId, Owner, RecruitmentQueue,
        ResourceNode, Team, Unit, WorkerCarry,
    },
    economy::PlayerLedgers,
    movement::{PathState, PathWaypoints},
    resources::{NavigationEpoch, SimulationTick},
    targeting::{InputTarget, ServerTarget},
    workers::UnitTask,
};

#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub tick: Tick,
    pub snapshot: Arc<WorldSnapshot>,
    /// Changes since the previous stored snapshot.
    pub delta: Option<Arc<WorldDelta>>,
    pub encoded_snapshot: Arc<[u8]>,
    pub encoded_delta: Option<Arc<[u8]>>,
}

/// Bounded ring of captured snapshots, newest last.
#[derive(Resource, Debug)]
pub struct SnapshotHistory {
    limit: usize,
    entries: VecDeque<StoredSnapshot>,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::with_capacity(64)
    }
}

impl SnapshotHistory {
    pub fn with_capacity(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            entries: VecDeque::with_capacity(limit),
        }
    }

    pub fn push(&mut self, snapshot: WorldSnapshot) {
        let delta = self
            .latest()
            .map(|previous| Arc::new(snapshot.delta_from(&previous.snapshot)));

        let encoded_snapshot: Arc<[u8]> = match encode_snapshot(&snapshot) {
            Ok(bytes) => bytes.into(),
            Err(err) => {
                tracing::error!(
                    target: "rts::server",
                    tick = %snapshot.header.tick,
                    error = %err,
                    "snapshot.encode_failed"
                );
                return;
            }
        };
        let encoded_delta = delta.as_ref().and_then(|delta| match encode_delta(delta) {
            Ok(bytes) => Some(Arc::<[u8]>::from(bytes)),
            Err(err) => {
                tracing::warn!(
                    target: "rts::server",
                    tick = %snapshot.header.tick,
                    error = %err,
                    "delta.encode_failed"
                );
                None
            }
        });

        self.entries.push_back(StoredSnapshot {
            tick: snapshot.header.tick,
            snapshot: Arc::new(snapshot),
            delta,
            encoded_snapshot,
            encoded_delta,
        });
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&StoredSnapshot> {
        self.entries.back()
    }

    pub fn entry(&self, tick: Tick) -> Option<StoredSnapshot> {
        self.entries.iter().find(|entry| entry.tick == tick).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type UnitSnapshotItem<'a> = (
    &'a NetworkId,
    &'a Unit,
    &'a Owner,
    &'a Team,
    &'a Transform,
    &'a MoveSpeed,
    &'a InputTarget,
    &'a ServerTarget,
    &'a PathState,
    &'a PathWaypoints,
    Option<&'a WorkerCarry>,
    Option<&'a UnitTask>,
);

type BuildingSnapshotItem<'a> = (
    &'a NetworkId,
    &'a Building,
    &'a Owner,
    &'a Team,
    &'a Transform,
    Option<&'a ConstructionProgress>,
    Option<&'a RecruitmentQueue>,
);

#[allow(clippy::too_many_arguments)]
pub fn capture_snapshot(
    tick: Res<SimulationTick>,
    epoch: Res<NavigationEpoch>,
    ledgers: Res<PlayerLedgers>,
    units: Query<UnitSnapshotItem>,
    buildings: Query<BuildingSnapshotItem>,
    resources: Query<(&NetworkId, &ResourceNode, &Transform)>,
    mut history: ResMut<SnapshotHistory>,
) {
    let mut unit_states: Vec<UnitState> = units.iter().map(unit_state).collect();
    unit_states.sort_unstable_by_key(|state| state.entity);

    let mut building_states: Vec<BuildingState> = buildings.iter().map(building_state).collect();
    building_states.sort_unstable_by_key(|state| state.entity);

    let mut resource_states: Vec<ResourceNodeState> = resources
        .iter()
        .map(|(net, node, transform)| ResourceNodeState {
            entity: net.0,
            kind: node.kind,
            position: transform.translation.to_array(),
            value: node.value,
        })
        .collect();
    resource_states.sort_unstable_by_key(|state| state.entity);

    let header = SnapshotHeader::new(
        tick.0,
        epoch.0,
        unit_states.len(),
        building_states.len(),
        resource_states.len(),
    );

    let snapshot = WorldSnapshot {
        header,
        units: unit_states,
        buildings: building_states,
        resources: resource_states,
        ledgers: ledgers.states(),
    }
    .finalize();

    history.push(snapshot);
}

fn unit_state(
    (net, unit, owner, team, transform, speed, input, server, path, waypoints, carry, task): UnitSnapshotItem,
) -> UnitState {
    UnitState {
        entity: net.0,
        kind: unit.kind,
        owner: owner.0,
        team: team.0,
        position: transform.translation.to_array(),
        rotation: transform.rotation.to_array(),
        move_speed: speed.0,
        input_version: input.0.version,
        server_target: server.0,
        path: path.to_data(),
        waypoints: waypoints.0,
        carry: carry.and_then(|carry| {
            carry.kind.filter(|_| carry.value > 0).map(|kind| CarryState {
                kind,
                value: carry.value,
            })
        }),
        task: task.map(UnitTask::kind).unwrap_or_default(),
    }
}

fn building_state(
    (net, building, owner, team, transform, construction, queue): BuildingSnapshotItem,
) -> BuildingState {
    BuildingState {
        entity: net.0,
        kind: building.kind,
        owner: owner.0,
        team: team.0,
        position: transform.translation.to_array(),
        construction: construction.map(|progress| ProgressState {
            current: progress.current,
            total: progress.total,
        }),
        queue_len: queue.map(|queue| queue.len() as u32).unwrap_or(0),
    }
}
