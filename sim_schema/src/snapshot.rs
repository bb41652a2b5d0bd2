use std::collections::HashMap;
use std::hash::{BuildHasher, Hasher};

use ahash::RandomState;
use serde::{Deserialize, Serialize};

use crate::{
    BuildingKind, NetEntity, PlayerId, ResourceKind, TargetDescriptor, TaskKind, Tick, UnitKind,
    WaypointBuffer,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub tick: Tick,
    pub nav_epoch: u32,
    pub unit_count: u32,
    pub building_count: u32,
    pub resource_count: u32,
    pub hash: u64,
}

impl SnapshotHeader {
    pub fn new(
        tick: Tick,
        nav_epoch: u32,
        unit_count: usize,
        building_count: usize,
        resource_count: usize,
    ) -> Self {
        Self {
            tick,
            nav_epoch,
            unit_count: unit_count as u32,
            building_count: building_count as u32,
            resource_count: resource_count as u32,
            hash: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PathStateData {
    pub has_path: bool,
    pub current_waypoint_index: u8,
    pub last_target_position: Option<[f32; 3]>,
    /// Version of the target descriptor this path was started for.
    pub target_version: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarryState {
    pub kind: ResourceKind,
    pub value: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitState {
    pub entity: NetEntity,
    pub kind: UnitKind,
    pub owner: PlayerId,
    pub team: u8,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub move_speed: f32,
    pub input_version: u32,
    pub server_target: TargetDescriptor,
    pub path: PathStateData,
    pub waypoints: WaypointBuffer,
    pub carry: Option<CarryState>,
    pub task: TaskKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub current: f32,
    pub total: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingState {
    pub entity: NetEntity,
    pub kind: BuildingKind,
    pub owner: PlayerId,
    pub team: u8,
    pub position: [f32; 3],
    pub construction: Option<ProgressState>,
    pub queue_len: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNodeState {
    pub entity: NetEntity,
    pub kind: ResourceKind,
    pub position: [f32; 3],
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub player: PlayerId,
    pub wood: u32,
    pub food: u32,
    pub population_current: u32,
    pub population_max: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub header: SnapshotHeader,
    pub units: Vec<UnitState>,
    pub buildings: Vec<BuildingState>,
    pub resources: Vec<ResourceNodeState>,
    pub ledgers: Vec<LedgerState>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldDelta {
    pub header: SnapshotHeader,
    pub units: Vec<UnitState>,
    pub removed_units: Vec<NetEntity>,
    pub buildings: Vec<BuildingState>,
    pub removed_buildings: Vec<NetEntity>,
    pub resources: Vec<ResourceNodeState>,
    pub removed_resources: Vec<NetEntity>,
    pub ledgers: Vec<LedgerState>,
}

impl WorldSnapshot {
    pub fn finalize(mut self) -> Self {
        self.header.hash = hash_snapshot(&self);
        self
    }

    /// Copy of this snapshot carrying only `player`'s economy ledger.
    pub fn for_player(&self, player: PlayerId) -> WorldSnapshot {
        WorldSnapshot {
            header: self.header.clone(),
            units: self.units.clone(),
            buildings: self.buildings.clone(),
            resources: self.resources.clone(),
            ledgers: self
                .ledgers
                .iter()
                .filter(|ledger| ledger.player == player)
                .copied()
                .collect(),
        }
    }

    pub fn unit(&self, entity: NetEntity) -> Option<&UnitState> {
        self.units.iter().find(|unit| unit.entity == entity)
    }

    pub fn ledger(&self, player: PlayerId) -> Option<&LedgerState> {
        self.ledgers.iter().find(|ledger| ledger.player == player)
    }

    /// Diff `self` (the newer snapshot) against `previous`.
    pub fn delta_from(&self, previous: &WorldSnapshot) -> WorldDelta {
        WorldDelta {
            header: self.header.clone(),
            units: diff_new(&previous.units, &self.units, |s| s.entity),
            removed_units: diff_removed(&previous.units, &self.units, |s| s.entity),
            buildings: diff_new(&previous.buildings, &self.buildings, |s| s.entity),
            removed_buildings: diff_removed(&previous.buildings, &self.buildings, |s| s.entity),
            resources: diff_new(&previous.resources, &self.resources, |s| s.entity),
            removed_resources: diff_removed(&previous.resources, &self.resources, |s| s.entity),
            ledgers: self
                .ledgers
                .iter()
                .filter(|ledger| !previous.ledgers.contains(ledger))
                .copied()
                .collect(),
        }
    }

    /// Advance this snapshot by a delta produced with [`WorldSnapshot::delta_from`].
    pub fn apply_delta(&mut self, delta: &WorldDelta) {
        self.header = delta.header.clone();
        apply_changes(&mut self.units, &delta.units, &delta.removed_units, |s| s.entity);
        apply_changes(
            &mut self.buildings,
            &delta.buildings,
            &delta.removed_buildings,
            |s| s.entity,
        );
        apply_changes(
            &mut self.resources,
            &delta.resources,
            &delta.removed_resources,
            |s| s.entity,
        );
        for ledger in &delta.ledgers {
            match self.ledgers.iter_mut().find(|l| l.player == ledger.player) {
                Some(existing) => *existing = *ledger,
                None => self.ledgers.push(*ledger),
            }
        }
    }
}

fn diff_new<T, F>(previous: &[T], current: &[T], key: F) -> Vec<T>
where
    T: Clone + PartialEq,
    F: Fn(&T) -> NetEntity,
{
    let index: HashMap<NetEntity, &T> = previous.iter().map(|state| (key(state), state)).collect();
    current
        .iter()
        .filter(|state| match index.get(&key(state)) {
            Some(prev) => *prev != *state,
            None => true,
        })
        .cloned()
        .collect()
}

fn diff_removed<T, F>(previous: &[T], current: &[T], key: F) -> Vec<NetEntity>
where
    F: Fn(&T) -> NetEntity,
{
    previous
        .iter()
        .map(&key)
        .filter(|id| !current.iter().any(|state| key(state) == *id))
        .collect()
}

fn apply_changes<T, F>(states: &mut Vec<T>, changed: &[T], removed: &[NetEntity], key: F)
where
    T: Clone,
    F: Fn(&T) -> NetEntity,
{
    states.retain(|state| !removed.contains(&key(state)));
    for state in changed {
        match states.iter_mut().find(|existing| key(existing) == key(state)) {
            Some(existing) => *existing = state.clone(),
            None => states.push(state.clone()),
        }
    }
    states.sort_unstable_by_key(|state| key(state));
}

/// Deterministic content hash; the header's own hash field is ignored.
pub fn hash_snapshot(snapshot: &WorldSnapshot) -> u64 {
    let mut clone = snapshot.clone();
    clone.header.hash = 0;
    let Ok(encoded) = bincode::serialize(&clone) else {
        return 0;
    };
    let mut hasher = RandomState::with_seeds(0, 0, 0, 0).build_hasher();
    hasher.write(&encoded);
    hasher.finish()
}

pub fn encode_snapshot(snapshot: &WorldSnapshot) -> bincode::Result<Vec<u8>> {
    bincode::serialize(snapshot)
}

pub fn decode_snapshot(bytes: &[u8]) -> bincode::Result<WorldSnapshot> {
    bincode::deserialize(bytes)
}

pub fn encode_delta(delta: &WorldDelta) -> bincode::Result<Vec<u8>> {
    bincode::serialize(delta)
}

pub fn decode_delta(bytes: &[u8]) -> bincode::Result<WorldDelta> {
    bincode::deserialize(bytes)
}

pub fn encode_snapshot_json(snapshot: &WorldSnapshot) -> serde_json::Result<String> {
    serde_json::to_string(snapshot)
}

pub fn decode_snapshot_json(data: &str) -> serde_json::Result<WorldSnapshot> {
    serde_json::from_str(data)
}
