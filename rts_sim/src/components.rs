use std::collections::VecDeque;

use bevy::prelude::*;
use sim_runtime::{
    BuildingKind, NetEntity, PlayerId, ResourceKind, TargetDescriptor, TaskKind, UnitKind,
    WaypointBuffer,
};

use crate::{
    movement::{PathState, PathWaypoints},
    spatial::{Collider, QueryMask},
    targeting::{InputTarget, ServerTarget},
    workers::{GatherTimer, UnitTask},
};

/// Server-assigned network identity, present on every replicated entity.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetworkId(pub NetEntity);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub kind: UnitKind,
}

/// Units that run the gather/store/construct task machine.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Worker;

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Owner(pub PlayerId);

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Team(pub u8);

impl Team {
    pub fn of(player: PlayerId) -> Self {
        Team(player.0 as u8)
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct MoveSpeed(pub f32);

/// Units that advance along their waypoints locally: every unit on the
/// server, only owned units on a client.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Simulated;

#[derive(Component, Debug, Clone, Copy, Default)]
pub struct Selected;

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Building {
    pub kind: BuildingKind,
}

/// Absent once the building is finished.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ConstructionProgress {
    pub current: f32,
    pub total: f32,
}

impl ConstructionProgress {
    pub fn new(total: f32) -> Self {
        Self {
            current: 0.0,
            total: total.max(0.0),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// Marks a finished building whose one-off completion bonus was granted.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PassiveEffectsApplied;

/// Ticks elapsed since the last passive income payout.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct IncomeTimer(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueuedUnit {
    pub kind: UnitKind,
    pub remaining_ticks: u32,
}

#[derive(Component, Debug, Clone, Default)]
pub struct RecruitmentQueue {
    pub entries: VecDeque<QueuedUnit>,
}

impl RecruitmentQueue {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replicated queue length for buildings seen by a client.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct QueueLength(pub u32);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct ResourceNode {
    pub kind: ResourceKind,
    pub value: u32,
}

/// What a worker is holding. `kind` is `None` exactly when `value` is zero
/// after a deposit.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct WorkerCarry {
    pub kind: Option<ResourceKind>,
    pub value: u32,
    pub previous_resource: Option<Entity>,
}

/// Task summary mirrored from snapshots on the client.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicatedTask(pub TaskKind);

#[derive(Bundle)]
pub struct UnitBundle {
    pub unit: Unit,
    pub owner: Owner,
    pub team: Team,
    pub speed: MoveSpeed,
    pub transform: Transform,
    pub input_target: InputTarget,
    pub server_target: ServerTarget,
    pub path: PathState,
    pub waypoints: PathWaypoints,
    pub collider: Collider,
}

impl UnitBundle {
    pub fn new(kind: UnitKind, owner: PlayerId, position: Vec3, move_speed: f32) -> Self {
        Self {
            unit: Unit { kind },
            owner: Owner(owner),
            team: Team::of(owner),
            speed: MoveSpeed(move_speed),
            transform: Transform::from_translation(position),
            input_target: InputTarget(TargetDescriptor::default()),
            server_target: ServerTarget(TargetDescriptor::default()),
            path: PathState::default(),
            waypoints: PathWaypoints(WaypointBuffer::EMPTY),
            collider: Collider::sphere(0.5, QueryMask::UNIT),
        }
    }
}

#[derive(Bundle, Default)]
pub struct WorkerBundle {
    pub worker: Worker,
    pub carry: WorkerCarry,
    pub task: UnitTask,
    pub timer: GatherTimer,
}

#[derive(Bundle)]
pub struct BuildingBundle {
    pub building: Building,
    pub owner: Owner,
    pub team: Team,
    pub transform: Transform,
    pub collider: Collider,
    pub queue: RecruitmentQueue,
}

impl BuildingBundle {
    pub fn new(kind: BuildingKind, owner: PlayerId, position: Vec3, footprint: f32) -> Self {
        let half = footprint * 0.5;
        Self {
            building: Building { kind },
            owner: Owner(owner),
            team: Team::of(owner),
            transform: Transform::from_translation(position),
            collider: Collider::cuboid(Vec3::new(half, 1.0, half), QueryMask::BUILDING),
            queue: RecruitmentQueue::default(),
        }
    }
}

#[derive(Bundle)]
pub struct ResourceNodeBundle {
    pub node: ResourceNode,
    pub transform: Transform,
    pub collider: Collider,
}

impl ResourceNodeBundle {
    pub fn new(kind: ResourceKind, value: u32, position: Vec3) -> Self {
        Self {
            node: ResourceNode { kind, value },
            transform: Transform::from_translation(position),
            collider: Collider::sphere(0.75, QueryMask::RESOURCE),
        }
    }
}
