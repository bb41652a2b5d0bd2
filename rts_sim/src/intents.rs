//! Player intents on a client world.
//!
//! Intents only touch the local input slots and the outgoing command queue.
//! Placement and recruitment are checked against the replicated ledger and
//! the local spatial index first so obviously doomed commands never leave
//! the client; the server re-validates everything.

use bevy::prelude::*;
use sim_runtime::{
    BuildingKind, NetEntity, PlaceBuildingCommand, SpawnUnitCommand, TargetDescriptor, UnitKind,
};
use thiserror::Error;

use crate::{
    catalog::{CatalogError, UnitCatalogHandle},
    client::{ClientState, LocalLedger, PathRequest, PendingCommands},
    components::{Building, ConstructionProgress, Owner, ResourceNode, Selected, Simulated, Unit},
    config::SimulationConfig,
    economy::LedgerError,
    resources::{NetworkIds, SimulationTick},
    spatial::{QueryMask, SpatialIndex},
    targeting::{next_version, InputTarget, ServerTarget},
};

#[derive(Debug, Error)]
pub enum IntentError {
    #[error(transparent)]
    Unaffordable(#[from] LedgerError),
    #[error("footprint overlaps an existing building or resource")]
    Blocked,
    #[error("position {0:?} is outside the map")]
    OutOfBounds([f32; 3]),
    #[error("no owned unit is selected")]
    NoSelection,
    #[error("{0} is not a finished building able to recruit {1}")]
    NoBuilding(NetEntity, &'static str),
    #[error("nothing under the cursor")]
    NothingHit,
    #[error("{0} is not a unit owned by this client")]
    UnknownUnit(NetEntity),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Replace the selection with the given owned units.
pub fn select(world: &mut World, units: &[NetEntity]) -> Result<usize, IntentError> {
    let player = world.resource::<ClientState>().player;
    let mut chosen = Vec::with_capacity(units.len());
    for net in units {
        let entity = world
            .resource::<NetworkIds>()
            .entity(*net)
            .filter(|entity| {
                world.get::<Unit>(*entity).is_some()
                    && world.get::<Owner>(*entity).is_some_and(|owner| owner.0 == player)
            })
            .ok_or(IntentError::UnknownUnit(*net))?;
        chosen.push(entity);
    }

    let previous: Vec<Entity> = world
        .query_filtered::<Entity, With<Selected>>()
        .iter(world)
        .collect();
    for entity in previous {
        world.entity_mut(entity).remove::<Selected>();
    }
    for entity in &chosen {
        world.entity_mut(*entity).insert(Selected);
    }
    Ok(chosen.len())
}

/// Issue `target` (with a fresh version) to every selected unit.
fn order_selected(
    world: &mut World,
    target: impl Fn(u32) -> TargetDescriptor,
) -> Result<usize, IntentError> {
    let mut selected = world.query_filtered::<
        (Entity, &mut InputTarget, &ServerTarget),
        (With<Selected>, With<Simulated>),
    >();
    let mut ordered = Vec::new();
    for (entity, mut input, server) in selected.iter_mut(world) {
        input.0 = target(next_version(&input.0, &server.0));
        ordered.push(entity);
    }
    if ordered.is_empty() {
        return Err(IntentError::NoSelection);
    }
    for entity in &ordered {
        world.entity_mut(*entity).insert(PathRequest);
    }
    Ok(ordered.len())
}

pub fn move_selected(world: &mut World, point: Vec3) -> Result<usize, IntentError> {
    order_selected(world, |version| {
        TargetDescriptor::at_position(point.to_array(), version)
    })
}

/// Right-click along the segment `start..end`: follow whatever entity the
/// ray hits first, otherwise move to the ground point.
pub fn click_target(world: &mut World, start: Vec3, end: Vec3) -> Result<usize, IntentError> {
    let filter = QueryMask::UNIT | QueryMask::BUILDING | QueryMask::RESOURCE | QueryMask::GROUND;
    let hit = world
        .resource::<SpatialIndex>()
        .cast_ray(start, end, filter)
        .ok_or(IntentError::NothingHit)?;

    let followed = hit.entity.and_then(|entity| {
        let net = world.resource::<NetworkIds>().net(entity)?;
        let position = world.get::<Transform>(entity)?.translation;
        Some((entity, net, position))
    });
    let Some((entity, net, position)) = followed else {
        return move_selected(world, hit.point);
    };

    let stopping = follow_distance(world, entity);
    order_selected(world, |version| {
        TargetDescriptor::following(net, position.to_array(), stopping, version)
    })
}

fn follow_distance(world: &World, entity: Entity) -> f32 {
    if world.get::<ResourceNode>(entity).is_some() {
        return world.resource::<SimulationConfig>().gather_range * 0.5;
    }
    if let Some(building) = world.get::<Building>(entity) {
        let catalog = world.resource::<UnitCatalogHandle>().catalog();
        if let Ok(stats) = catalog.building(building.kind) {
            return stats.stopping_distance();
        }
    }
    1.0
}

/// Queue a placement for the next outgoing frame.
pub fn place_building(
    world: &mut World,
    kind: BuildingKind,
    position: Vec3,
) -> Result<PlaceBuildingCommand, IntentError> {
    let position = position.to_array();
    if !world.resource::<SimulationConfig>().in_bounds(position) {
        return Err(IntentError::OutOfBounds(position));
    }
    let catalog = world.resource::<UnitCatalogHandle>().get();
    let stats = catalog.building(kind)?;
    world.resource::<LocalLedger>().0.check(&stats.construction_cost)?;

    let half = stats.half_extent();
    let blocked = !world
        .resource::<SpatialIndex>()
        .overlap_box(
            Vec3::from_array(position),
            Vec3::new(half, 1.0, half),
            QueryMask::BUILDING | QueryMask::RESOURCE,
        )
        .is_empty();
    if blocked {
        return Err(IntentError::Blocked);
    }

    let command = PlaceBuildingCommand {
        tick: world.resource::<SimulationTick>().0.next(),
        kind,
        position,
    };
    world.resource_mut::<PendingCommands>().queue_placement(command);
    tracing::info!(
        target: "rts::commands",
        building = kind.as_str(),
        tick = %command.tick,
        "intent.place_building"
    );
    Ok(command)
}

/// Queue recruitment of `kind` at an owned, finished building.
pub fn recruit_unit(
    world: &mut World,
    building: NetEntity,
    kind: UnitKind,
) -> Result<SpawnUnitCommand, IntentError> {
    let player = world.resource::<ClientState>().player;
    let catalog = world.resource::<UnitCatalogHandle>().get();
    let position = world
        .resource::<NetworkIds>()
        .entity(building)
        .filter(|entity| {
            world.get::<ConstructionProgress>(*entity).is_none()
                && world.get::<Owner>(*entity).is_some_and(|owner| owner.0 == player)
                && world.get::<Building>(*entity).is_some_and(|site| {
                    catalog
                        .building(site.kind)
                        .is_ok_and(|stats| stats.can_recruit(kind))
                })
        })
        .and_then(|entity| world.get::<Transform>(entity))
        .map(|transform| transform.translation.to_array())
        .ok_or(IntentError::NoBuilding(building, kind.as_str()))?;

    let stats = catalog.unit(kind)?;
    world.resource::<LocalLedger>().0.check(&stats.recruitment_cost)?;

    let command = SpawnUnitCommand {
        tick: world.resource::<SimulationTick>().0.next(),
        kind,
        building_position: position,
        command_id: world.resource_mut::<ClientState>().allocate_command_id(),
    };
    world.resource_mut::<PendingCommands>().queue_spawn(command);
    tracing::info!(
        target: "rts::commands",
        unit = kind.as_str(),
        command_id = command.command_id.0,
        "intent.recruit_unit"
    );
    Ok(command)
}

#[cfg(test)]
mod tests {
    use bevy_ecs::system::RunSystemOnce;
    use sim_runtime::{PlayerId, ResourceKind, Tick};

    use super::*;
    use crate::catalog::UnitCatalog;
    use crate::components::{BuildingBundle, NetworkId, ResourceNodeBundle, UnitBundle};
    use crate::economy::EconomyLedger;
    use crate::spatial::rebuild_spatial_index;

    fn client_world() -> World {
        let mut world = World::default();
        world.insert_resource(SimulationConfig::default());
        world.insert_resource(UnitCatalogHandle::new(UnitCatalog::builtin()));
        world.insert_resource(ClientState::new(PlayerId(0)));
        world.insert_resource(SimulationTick(Tick(10)));
        world.insert_resource(LocalLedger(EconomyLedger::new(100, 100, 1, 10)));
        world.insert_resource(PendingCommands::new(3));
        world.init_resource::<SpatialIndex>();
        world.init_resource::<NetworkIds>();
        world
    }

    fn bind(world: &mut World, entity: Entity, net: u64) -> NetEntity {
        let net = NetEntity(net);
        world.resource_mut::<NetworkIds>().bind(net, entity);
        world.entity_mut(entity).insert(NetworkId(net));
        net
    }

    fn owned_unit(world: &mut World, net: u64, owner: u32) -> (Entity, NetEntity) {
        let entity = world
            .spawn((
                UnitBundle::new(UnitKind::Worker, PlayerId(owner), Vec3::ZERO, 3.5),
                Simulated,
            ))
            .id();
        (entity, bind(world, entity, net))
    }

    #[test]
    fn move_outranks_both_slots() {
        let mut world = client_world();
        let (entity, net) = owned_unit(&mut world, 1, 0);
        world.get_mut::<ServerTarget>(entity).unwrap().0.version = 6;

        assert!(matches!(
            move_selected(&mut world, Vec3::ONE),
            Err(IntentError::NoSelection)
        ));
        assert_eq!(select(&mut world, &[net]).unwrap(), 1);
        assert_eq!(move_selected(&mut world, Vec3::new(4.0, 0.0, 2.0)).unwrap(), 1);

        let input = world.get::<InputTarget>(entity).unwrap().0;
        assert_eq!(input.version, 7);
        assert_eq!(input.target_position, [4.0, 0.0, 2.0]);
        assert!(world.get::<PathRequest>(entity).is_some());
    }

    #[test]
    fn selecting_foreign_units_fails() {
        let mut world = client_world();
        let (_, foreign) = owned_unit(&mut world, 2, 1);
        assert!(matches!(
            select(&mut world, &[foreign]),
            Err(IntentError::UnknownUnit(net)) if net == foreign
        ));
    }

    #[test]
    fn click_on_resource_follows_it() {
        let mut world = client_world();
        let (_, unit) = owned_unit(&mut world, 1, 0);
        let node = world
            .spawn(ResourceNodeBundle::new(
                ResourceKind::Wood,
                20,
                Vec3::new(10.0, 0.0, 0.0),
            ))
            .id();
        let node_net = bind(&mut world, node, 9);
        world.run_system_once(rebuild_spatial_index);
        select(&mut world, &[unit]).unwrap();

        click_target(&mut world, Vec3::new(10.0, 10.0, 0.0), Vec3::new(10.0, -1.0, 0.0)).unwrap();

        let entity = world.resource::<NetworkIds>().entity(unit).unwrap();
        let input = world.get::<InputTarget>(entity).unwrap().0;
        assert!(input.is_following_target);
        assert_eq!(input.target_entity, Some(node_net));
        assert_eq!(input.target_position, [10.0, 0.0, 0.0]);
    }

    #[test]
    fn placement_is_prevalidated() {
        let mut world = client_world();
        world.spawn(BuildingBundle::new(
            BuildingKind::Center,
            PlayerId(0),
            Vec3::new(20.0, 0.0, 20.0),
            4.0,
        ));
        world.run_system_once(rebuild_spatial_index);

        assert!(matches!(
            place_building(&mut world, BuildingKind::House, Vec3::new(21.0, 0.0, 20.0)),
            Err(IntentError::Blocked)
        ));
        assert!(matches!(
            place_building(&mut world, BuildingKind::House, Vec3::new(-5.0, 0.0, 20.0)),
            Err(IntentError::OutOfBounds(_))
        ));
        world.resource_mut::<LocalLedger>().0.wood = 10;
        assert!(matches!(
            place_building(&mut world, BuildingKind::House, Vec3::new(30.0, 0.0, 30.0)),
            Err(IntentError::Unaffordable(_))
        ));
        world.resource_mut::<LocalLedger>().0.wood = 60;
        let command =
            place_building(&mut world, BuildingKind::House, Vec3::new(30.0, 0.0, 30.0)).unwrap();
        assert_eq!(command.tick, Tick(11));
        assert_eq!(
            world.resource::<PendingCommands>().placement(),
            Some(&command)
        );
    }

    #[test]
    fn recruitment_needs_a_finished_recruiter() {
        let mut world = client_world();
        let center = world
            .spawn(BuildingBundle::new(
                BuildingKind::Center,
                PlayerId(0),
                Vec3::new(20.0, 0.0, 20.0),
                4.0,
            ))
            .id();
        let center_net = bind(&mut world, center, 4);

        assert!(matches!(
            recruit_unit(&mut world, center_net, UnitKind::Warrior),
            Err(IntentError::NoBuilding(..))
        ));

        world.entity_mut(center).insert(ConstructionProgress::new(60.0));
        assert!(recruit_unit(&mut world, center_net, UnitKind::Worker).is_err());
        world.entity_mut(center).remove::<ConstructionProgress>();

        let first = recruit_unit(&mut world, center_net, UnitKind::Worker).unwrap();
        let second = recruit_unit(&mut world, center_net, UnitKind::Worker).unwrap();
        assert_eq!(first.building_position, [20.0, 0.0, 20.0]);
        assert_ne!(first.command_id, second.command_id);
        assert_eq!(world.resource::<PendingCommands>().spawn(), Some(&second));
    }
}
