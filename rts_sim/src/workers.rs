//! Worker task machine: gather, store, construct.
//!
//! A worker acts only once movement has settled (`has_path == false`). Every
//! effect on shared state (resource nodes, ledgers, construction sites) is
//! queued as a [`PendingMutation`] and played back serially in the economy
//! phase.

use bevy::prelude::*;
use sim_runtime::{BuildingKind, NetEntity, PlayerId, TargetDescriptor, TaskKind};

use crate::{
    catalog::{UnitCatalog, UnitCatalogHandle},
    components::{Building, ConstructionProgress, NetworkId, Owner, ResourceNode, Worker, WorkerCarry},
    config::SimulationConfig,
    economy::{planar_distance_sq, PendingMutation, PendingMutations},
    movement::PathState,
    targeting::{exists, next_version, InputTarget, ServerTarget},
};

pub const MAX_CARRY: u32 = 50;
pub const AMOUNT_TO_GATHER: u32 = 1;

/// Exactly one active task per worker.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitTask {
    #[default]
    Idle,
    Moving,
    Gathering(Entity),
    Storing(Entity),
    Constructing(Entity),
}

impl UnitTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            UnitTask::Idle => TaskKind::Idle,
            UnitTask::Moving => TaskKind::Moving,
            UnitTask::Gathering(_) => TaskKind::Gathering,
            UnitTask::Storing(_) => TaskKind::Storing,
            UnitTask::Constructing(_) => TaskKind::Constructing,
        }
    }
}

/// Ticks spent in gather range since the last gather.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatherTimer(pub u32);

/// Drop-off building chosen for a storing worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenterRef {
    pub entity: Entity,
    pub net: NetEntity,
    pub position: Vec3,
    pub footprint: f32,
}

/// Nearest Center owned by `player`; ties go to the lowest network id.
pub fn closest_center(
    candidates: impl Iterator<Item = (Entity, Vec3, BuildingKind, PlayerId, NetEntity)>,
    catalog: &UnitCatalog,
    player: PlayerId,
    from: Vec3,
) -> Option<CenterRef> {
    candidates
        .filter(|(_, _, kind, owner, _)| *kind == BuildingKind::Center && *owner == player)
        .min_by(|a, b| {
            planar_distance_sq(a.1, from)
                .total_cmp(&planar_distance_sq(b.1, from))
                .then(a.4.cmp(&b.4))
        })
        .map(|(entity, position, kind, _, net)| CenterRef {
            entity,
            net,
            position,
            footprint: catalog.footprint(kind),
        })
}

/// Send the worker to `center` with a server-issued follow-up.
pub fn assign_storage(
    task: &mut UnitTask,
    server: &mut ServerTarget,
    input: &InputTarget,
    timer: &mut GatherTimer,
    center: Option<CenterRef>,
) {
    timer.0 = 0;
    let Some(center) = center else {
        *task = UnitTask::Idle;
        return;
    };
    server.0 = TargetDescriptor::following(
        center.net,
        center.position.to_array(),
        center.footprint * 0.5 + 0.5,
        next_version(&input.0, &server.0),
    );
    *task = UnitTask::Storing(center.entity);
}

/// Send the worker back to a resource node with a server-issued follow-up.
#[allow(clippy::too_many_arguments)]
pub fn assign_gather(
    task: &mut UnitTask,
    server: &mut ServerTarget,
    input: &InputTarget,
    timer: &mut GatherTimer,
    resource: Entity,
    net: NetEntity,
    position: Vec3,
    stopping_distance: f32,
) {
    timer.0 = 0;
    server.0 = TargetDescriptor::following(
        net,
        position.to_array(),
        stopping_distance,
        next_version(&input.0, &server.0),
    );
    *task = UnitTask::Gathering(resource);
}

/// The gathered node vanished: drop off what is carried, or idle.
pub fn handle_lost_resource(
    task: &mut UnitTask,
    carry: &mut WorkerCarry,
    server: &mut ServerTarget,
    input: &InputTarget,
    timer: &mut GatherTimer,
    center: Option<CenterRef>,
) {
    carry.previous_resource = None;
    if carry.value > 0 {
        assign_storage(task, server, input, timer, center);
    } else {
        timer.0 = 0;
        *task = UnitTask::Idle;
    }
}

type WorkerItem<'a> = (
    Entity,
    &'a Transform,
    &'a Owner,
    &'a PathState,
    &'a InputTarget,
    &'a mut ServerTarget,
    &'a mut UnitTask,
    &'a mut GatherTimer,
    &'a mut WorkerCarry,
);

type BuildingItem<'a> = (
    Entity,
    &'a Transform,
    &'a Building,
    &'a Owner,
    &'a NetworkId,
    Option<&'a ConstructionProgress>,
);

/// Per-tick task evaluation. Rechecks every precondition before acting.
pub fn run_worker_tasks(
    config: Res<SimulationConfig>,
    catalog: Res<UnitCatalogHandle>,
    mut pending: ResMut<PendingMutations>,
    mut workers: Query<WorkerItem, With<Worker>>,
    nodes: Query<(&Transform, &ResourceNode), Without<Worker>>,
    buildings: Query<BuildingItem, Without<Worker>>,
) {
    let gather_interval = config.gather_interval_ticks();
    let gather_range_sq = config.gather_range * config.gather_range;
    let construction_step = config.construction_rate * config.tick_seconds();

    for (entity, transform, owner, path, input, mut server, mut task, mut timer, mut carry) in
        workers.iter_mut()
    {
        if path.has_path {
            continue;
        }
        let position = transform.translation;

        match *task {
            UnitTask::Idle => {}
            UnitTask::Moving => {
                if path.last_target_position.is_some() {
                    *task = UnitTask::Idle;
                }
            }
            UnitTask::Gathering(resource) => {
                let Ok((node_transform, node)) = nodes.get(resource) else {
                    let center = nearest_finished_center(&buildings, &catalog, owner.0, position);
                    handle_lost_resource(
                        &mut task, &mut carry, &mut server, input, &mut timer, center,
                    );
                    continue;
                };
                if node.value == 0 {
                    continue;
                }
                if planar_distance_sq(position, node_transform.translation) > gather_range_sq {
                    continue;
                }
                timer.0 += 1;
                if timer.0 >= gather_interval {
                    timer.0 = 0;
                    pending.push(PendingMutation::Gather {
                        worker: entity,
                        resource,
                    });
                }
            }
            UnitTask::Storing(building) => {
                let Ok((_, building_transform, site, _, _, _)) = buildings.get(building) else {
                    let center = nearest_finished_center(&buildings, &catalog, owner.0, position);
                    if carry.value > 0 {
                        assign_storage(&mut task, &mut server, input, &mut timer, center);
                    } else {
                        *task = UnitTask::Idle;
                    }
                    continue;
                };
                let reach = catalog.catalog().footprint(site.kind) * 0.5 + config.interact_margin;
                if planar_distance_sq(position, building_transform.translation) <= reach * reach {
                    pending.push(PendingMutation::Deposit {
                        worker: entity,
                        building,
                    });
                }
            }
            UnitTask::Constructing(building) => {
                let site = buildings
                    .get(building)
                    .ok()
                    .filter(|(_, _, _, _, _, construction)| construction.is_some());
                let Some((_, building_transform, site, _, _, _)) = site else {
                    *task = UnitTask::Idle;
                    continue;
                };
                let reach = catalog.catalog().footprint(site.kind) * 0.5 + config.interact_margin;
                if planar_distance_sq(position, building_transform.translation) <= reach * reach {
                    pending.push(PendingMutation::Construct {
                        worker: entity,
                        building,
                        progress: construction_step,
                    });
                }
            }
        }

        debug_assert!(carry.value <= MAX_CARRY);
        if !exists(&nodes, carry.previous_resource) {
            carry.previous_resource = None;
        }
    }
}

fn nearest_finished_center(
    buildings: &Query<BuildingItem, Without<Worker>>,
    catalog: &UnitCatalogHandle,
    player: PlayerId,
    from: Vec3,
) -> Option<CenterRef> {
    let candidates = buildings
        .iter()
        .filter(|(_, _, _, _, _, construction)| construction.is_none())
        .map(|(entity, transform, building, owner, net, _)| {
            (entity, transform.translation, building.kind, owner.0, net.0)
        });
    closest_center(candidates, catalog.catalog(), player, from)
}
