//! Two-slot target resolution.
//!
//! Each unit holds an input-origin and a server-origin [`TargetDescriptor`].
//! The slot with the strictly higher version is authoritative; equal versions
//! never switch. Clients pull server follow-ups into their input slot with
//! [`reconcile`], and the server adopts fresh player clicks in
//! [`resolve_unit_targets`].

use bevy::ecs::query::{QueryData, QueryFilter};
use bevy::prelude::*;
use sim_runtime::{BuildingKind, TargetDescriptor};

use crate::{
    components::{Building, ConstructionProgress, NetworkId, Owner, ResourceNode, WorkerCarry},
    config::SimulationConfig,
    resources::NetworkIds,
    spatial::{QueryMask, SpatialIndex},
    workers::{GatherTimer, UnitTask},
};

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct InputTarget(pub TargetDescriptor);

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct ServerTarget(pub TargetDescriptor);

/// Copy the server slot into the input slot when it outranks it.
///
/// Returns `true` when the input slot changed, which invalidates any path
/// planned for the old target.
pub fn reconcile(input: &mut InputTarget, server: &ServerTarget) -> bool {
    if server.0.version > input.0.version {
        input.0 = server.0;
        true
    } else {
        false
    }
}

pub fn effective_target(input: &InputTarget, server: &ServerTarget) -> TargetDescriptor {
    if server.0.version > input.0.version {
        server.0
    } else {
        input.0
    }
}

/// Version for a new issuance by either side; outranks both slots.
pub fn next_version(input: &TargetDescriptor, server: &TargetDescriptor) -> u32 {
    input.version.max(server.version).wrapping_add(1)
}

/// Liveness check for a weak entity handle.
pub fn exists<D: QueryData, F: QueryFilter>(query: &Query<D, F>, handle: Option<Entity>) -> bool {
    handle.is_some_and(|entity| query.contains(entity))
}

type TargetItem<'a> = (
    Entity,
    &'a Owner,
    &'a InputTarget,
    &'a mut ServerTarget,
    Option<&'a WorkerCarry>,
    Option<(&'a mut UnitTask, &'a mut GatherTimer)>,
);

/// Adopt player clicks that outrank the server slot and pick the worker task
/// they imply. Any running task is replaced.
pub fn resolve_unit_targets(
    config: Res<SimulationConfig>,
    ids: Res<NetworkIds>,
    index: Res<SpatialIndex>,
    mut units: Query<TargetItem>,
    nodes: Query<(&Transform, &ResourceNode, &NetworkId)>,
    buildings: Query<(&Building, &Owner, Has<ConstructionProgress>)>,
) {
    for (entity, owner, input, mut server, carry, worker) in units.iter_mut() {
        if input.0.version <= server.0.version {
            continue;
        }
        server.0 = input.0;

        let mut followed = None;
        if let Some(net) = input.0.target_entity {
            followed = ids.entity(net);
            if followed.is_none() {
                // The identity never replicated: look around the click.
                let position = Vec3::from_array(input.0.target_position);
                let recovered = index
                    .overlap_sphere(position, config.fallback_search_radius, QueryMask::RESOURCE)
                    .into_iter()
                    .find_map(|hit| {
                        nodes
                            .get(hit.entity)
                            .ok()
                            .filter(|(_, node, _)| node.value > 0)
                            .map(|(transform, _, net)| (hit.entity, transform.translation, net.0))
                    });
                match recovered {
                    Some((node, node_position, node_net)) => {
                        server.0 = TargetDescriptor::following(
                            node_net,
                            node_position.to_array(),
                            config.gather_range * 0.5,
                            next_version(&input.0, &server.0),
                        );
                        followed = Some(node);
                        tracing::debug!(
                            target: "rts::server",
                            unit = ?entity,
                            node = %node_net,
                            "target.recovered=nearest_resource"
                        );
                    }
                    None => {
                        server.0.clear_follow();
                        tracing::debug!(
                            target: "rts::server",
                            unit = ?entity,
                            missing = %net,
                            "target.follow_cleared"
                        );
                    }
                }
            }
        }

        let Some((mut task, mut timer)) = worker else {
            continue;
        };
        timer.0 = 0;
        let carrying = carry.is_some_and(|carry| carry.value > 0);
        *task = match followed {
            Some(target) if nodes.get(target).is_ok_and(|(_, node, _)| node.value > 0) => {
                UnitTask::Gathering(target)
            }
            Some(target) => match buildings.get(target) {
                Ok((_, building_owner, true)) if building_owner == owner => {
                    UnitTask::Constructing(target)
                }
                Ok((building, building_owner, false))
                    if building_owner == owner
                        && building.kind == BuildingKind::Center
                        && carrying =>
                {
                    UnitTask::Storing(target)
                }
                _ => UnitTask::Moving,
            },
            None => UnitTask::Moving,
        };
        tracing::debug!(
            target: "rts::server",
            unit = ?entity,
            version = server.0.version,
            task = task.kind().as_str(),
            "target.override=input"
        );
    }
}

#[cfg(test)]
mod tests {
    use bevy_ecs::system::RunSystemOnce;
    use sim_runtime::{NetEntity, PlayerId, ResourceKind};

    use super::*;
    use crate::spatial::Collider;

    fn descriptor(version: u32) -> TargetDescriptor {
        TargetDescriptor::at_position([version as f32, 0.0, 0.0], version)
    }

    #[test]
    fn reconcile_is_idempotent() {
        let mut input = InputTarget(descriptor(1));
        let server = ServerTarget(descriptor(4));
        assert!(reconcile(&mut input, &server));
        let first = input;
        assert!(!reconcile(&mut input, &server));
        assert_eq!(input, first);
    }

    #[test]
    fn higher_version_wins_from_either_side() {
        for (a, b) in [(2, 5), (5, 2), (7, 8)] {
            let input = InputTarget(descriptor(a));
            let server = ServerTarget(descriptor(b));
            assert_eq!(effective_target(&input, &server).version, a.max(b));
        }
        // Ties keep the input slot.
        let mut input = InputTarget(TargetDescriptor::at_position([1.0, 0.0, 0.0], 3));
        let server = ServerTarget(TargetDescriptor::at_position([9.0, 0.0, 9.0], 3));
        assert!(!reconcile(&mut input, &server));
        assert_eq!(input.0.target_position, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn next_version_outranks_both_slots() {
        assert_eq!(next_version(&descriptor(3), &descriptor(9)), 10);
        assert_eq!(next_version(&descriptor(4), &descriptor(1)), 5);
    }

    fn world_with_resources() -> World {
        let mut world = World::default();
        world.insert_resource(SimulationConfig::default());
        world.init_resource::<NetworkIds>();
        world.init_resource::<SpatialIndex>();
        world
    }

    #[test]
    fn click_on_resource_starts_gathering_and_strips_old_task() {
        let mut world = world_with_resources();
        let node = world
            .spawn((
                Transform::from_xyz(5.0, 0.0, 5.0),
                ResourceNode {
                    kind: ResourceKind::Wood,
                    value: 10,
                },
            ))
            .id();
        let net = world.resource_mut::<NetworkIds>().allocate(node);
        world.entity_mut(node).insert(NetworkId(net));

        let worker = world
            .spawn((
                Owner(PlayerId(0)),
                InputTarget(TargetDescriptor::following(net, [5.0, 0.0, 5.0], 1.0, 3)),
                ServerTarget(descriptor(2)),
                WorkerCarry::default(),
                UnitTask::Storing(Entity::from_raw(99)),
                GatherTimer(12),
            ))
            .id();

        world.run_system_once(resolve_unit_targets);

        assert_eq!(world.get::<UnitTask>(worker), Some(&UnitTask::Gathering(node)));
        assert_eq!(world.get::<GatherTimer>(worker).unwrap().0, 0);
        assert_eq!(world.get::<ServerTarget>(worker).unwrap().0.version, 3);
    }

    #[test]
    fn stale_input_is_ignored() {
        let mut world = world_with_resources();
        let worker = world
            .spawn((
                Owner(PlayerId(0)),
                InputTarget(descriptor(2)),
                ServerTarget(descriptor(5)),
                WorkerCarry::default(),
                UnitTask::Constructing(Entity::from_raw(7)),
                GatherTimer(0),
            ))
            .id();
        world.run_system_once(resolve_unit_targets);
        assert_eq!(
            world.get::<UnitTask>(worker),
            Some(&UnitTask::Constructing(Entity::from_raw(7)))
        );
        assert_eq!(world.get::<ServerTarget>(worker).unwrap().0.version, 5);
    }

    #[test]
    fn unreplicated_target_recovers_nearest_resource() {
        let mut world = world_with_resources();
        let node = world
            .spawn((
                Transform::from_xyz(12.0, 0.0, 10.0),
                ResourceNode {
                    kind: ResourceKind::Food,
                    value: 5,
                },
                Collider::sphere(0.75, QueryMask::RESOURCE),
            ))
            .id();
        let net = world.resource_mut::<NetworkIds>().allocate(node);
        world.entity_mut(node).insert(NetworkId(net));
        world.run_system_once(crate::spatial::rebuild_spatial_index);

        let worker = world
            .spawn((
                Owner(PlayerId(1)),
                InputTarget(TargetDescriptor::following(
                    NetEntity(404),
                    [10.0, 0.0, 10.0],
                    1.0,
                    1,
                )),
                ServerTarget::default(),
                WorkerCarry::default(),
                UnitTask::Idle,
                GatherTimer(0),
            ))
            .id();

        world.run_system_once(resolve_unit_targets);

        assert_eq!(world.get::<UnitTask>(worker), Some(&UnitTask::Gathering(node)));
        let server = world.get::<ServerTarget>(worker).unwrap().0;
        assert_eq!(server.target_entity, Some(net));
        assert_eq!(server.version, 2);
    }

    #[test]
    fn unreplicated_target_without_candidates_clears_follow() {
        let mut world = world_with_resources();
        let unit = world
            .spawn((
                Owner(PlayerId(1)),
                InputTarget(TargetDescriptor::following(
                    NetEntity(404),
                    [10.0, 0.0, 10.0],
                    1.0,
                    1,
                )),
                ServerTarget::default(),
            ))
            .id();
        world.run_system_once(resolve_unit_targets);
        let server = world.get::<ServerTarget>(unit).unwrap().0;
        assert!(!server.is_following_target);
        assert_eq!(server.target_entity, None);
        assert_eq!(server.version, 1);
    }

    #[test]
    fn following_a_live_unit_ignores_nearby_resources() {
        let mut world = world_with_resources();
        let node = world
            .spawn((
                Transform::from_xyz(12.0, 0.0, 10.0),
                ResourceNode {
                    kind: ResourceKind::Wood,
                    value: 5,
                },
                Collider::sphere(0.75, QueryMask::RESOURCE),
            ))
            .id();
        let node_net = world.resource_mut::<NetworkIds>().allocate(node);
        world.entity_mut(node).insert(NetworkId(node_net));
        let enemy = world
            .spawn((Transform::from_xyz(10.0, 0.0, 10.0), Owner(PlayerId(1))))
            .id();
        let enemy_net = world.resource_mut::<NetworkIds>().allocate(enemy);
        world.entity_mut(enemy).insert(NetworkId(enemy_net));
        world.run_system_once(crate::spatial::rebuild_spatial_index);

        let worker = world
            .spawn((
                Owner(PlayerId(0)),
                InputTarget(TargetDescriptor::following(enemy_net, [10.0, 0.0, 10.0], 1.0, 1)),
                ServerTarget::default(),
                WorkerCarry::default(),
                UnitTask::Idle,
                GatherTimer(0),
            ))
            .id();

        world.run_system_once(resolve_unit_targets);

        let server = world.get::<ServerTarget>(worker).unwrap().0;
        assert_eq!(server.target_entity, Some(enemy_net));
        assert!(server.is_following_target);
        assert_eq!(server.version, 1);
        assert_eq!(world.get::<UnitTask>(worker), Some(&UnitTask::Moving));
    }
}
