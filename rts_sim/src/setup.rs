use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sim_runtime::{BuildingKind, PlayerId, ResourceKind, UnitKind};

use crate::{
    catalog::{UnitCatalog, UnitCatalogHandle},
    commands::PlayerRegistry,
    components::{
        BuildingBundle, ConstructionProgress, NetworkId, ResourceNodeBundle, Simulated,
        UnitBundle, WorkerBundle,
    },
    config::SimulationConfig,
    resources::NetworkIds,
};

/// Spawn a unit on the authoritative world and give it a network identity.
pub fn spawn_unit(world: &mut World, kind: UnitKind, owner: PlayerId, position: Vec3) -> Entity {
    let speed = world.resource::<UnitCatalogHandle>().catalog().move_speed(kind);
    let mut entity = world.spawn((UnitBundle::new(kind, owner, position, speed), Simulated));
    if kind == UnitKind::Worker {
        entity.insert(WorkerBundle::default());
    }
    let entity = entity.id();
    attach_network_id(world, entity)
}

/// Spawn a building, optionally as a fresh construction site.
pub fn spawn_building(
    world: &mut World,
    kind: BuildingKind,
    owner: PlayerId,
    position: Vec3,
    under_construction: bool,
) -> Entity {
    let catalog = world.resource::<UnitCatalogHandle>().get();
    let footprint = catalog.footprint(kind);
    let mut entity = world.spawn(BuildingBundle::new(kind, owner, position, footprint));
    if under_construction {
        let total = catalog
            .building(kind)
            .map(|stats| stats.construction_time)
            .unwrap_or(1.0);
        entity.insert(ConstructionProgress::new(total));
    }
    let entity = entity.id();
    attach_network_id(world, entity)
}

pub fn spawn_resource_node(
    world: &mut World,
    kind: ResourceKind,
    value: u32,
    position: Vec3,
) -> Entity {
    let entity = world
        .spawn(ResourceNodeBundle::new(kind, value, position))
        .id();
    attach_network_id(world, entity)
}

fn attach_network_id(world: &mut World, entity: Entity) -> Entity {
    let net = world.resource_mut::<NetworkIds>().allocate(entity);
    world.entity_mut(entity).insert(NetworkId(net));
    entity
}

/// Deferred variant used by systems that recruit units mid-tick.
pub(crate) fn spawn_unit_deferred(
    commands: &mut Commands,
    ids: &mut NetworkIds,
    catalog: &UnitCatalog,
    kind: UnitKind,
    owner: PlayerId,
    position: Vec3,
) -> Entity {
    let speed = catalog.move_speed(kind);
    let mut entity = commands.spawn((UnitBundle::new(kind, owner, position, speed), Simulated));
    if kind == UnitKind::Worker {
        entity.insert(WorkerBundle::default());
    }
    let entity = entity.id();
    let net = ids.allocate(entity);
    commands.entity(entity).insert(NetworkId(net));
    entity
}

/// Base location for `player`: one quadrant each, cycling past four players.
pub fn base_position(config: &SimulationConfig, player: PlayerId) -> Vec3 {
    let quadrant = player.0 % 4;
    let ring = (player.0 / 4) as f32;
    let x = if quadrant % 2 == 0 { 0.25 } else { 0.75 };
    let z = if quadrant < 2 { 0.25 } else { 0.75 };
    Vec3::new(
        (config.map_size[0] * x + ring * 4.0).round(),
        0.0,
        (config.map_size[1] * z + ring * 4.0).round(),
    )
}

/// Startup: a finished Center, starting workers and nearby resource nodes for
/// every registered player. Layout depends only on the configured seed.
pub fn spawn_initial_world(world: &mut World) {
    let config = world.resource::<SimulationConfig>().clone();
    if !config.populate_world {
        return;
    }
    let players = world.resource::<PlayerRegistry>().players.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    for player in players {
        let base = base_position(&config, player);
        spawn_building(world, BuildingKind::Center, player, base, false);

        for index in 0..config.starting_workers {
            let offset = Vec3::new(3.5, 0.0, index as f32 - 1.0);
            spawn_unit(world, UnitKind::Worker, player, base + offset);
        }

        for index in 0..config.resource_nodes_per_player {
            let kind = if index % 2 == 0 {
                ResourceKind::Wood
            } else {
                ResourceKind::Food
            };
            let angle = rng.gen_range(0.0..std::f32::consts::TAU);
            let radius = rng.gen_range(7.0..11.0);
            let position = Vec3::new(
                (base.x + angle.cos() * radius).clamp(1.0, config.map_size[0] - 1.0),
                0.0,
                (base.z + angle.sin() * radius).clamp(1.0, config.map_size[1] - 1.0),
            );
            spawn_resource_node(world, kind, config.resource_node_value, position);
        }

        tracing::info!(
            target: "rts::server",
            player = %player,
            x = base.x,
            z = base.z,
            "world.base_spawned"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Building, ResourceNode, Worker};

    fn setup_world() -> World {
        let mut world = World::default();
        world.insert_resource(SimulationConfig::default());
        world.insert_resource(UnitCatalogHandle::new(UnitCatalog::builtin()));
        world.insert_resource(PlayerRegistry::with_count(2));
        world.init_resource::<NetworkIds>();
        world
    }

    fn layout(world: &mut World) -> Vec<[f32; 3]> {
        let mut nodes: Vec<_> = world
            .query::<(&NetworkId, &Transform, &ResourceNode)>()
            .iter(world)
            .map(|(net, transform, _)| (net.0, transform.translation.to_array()))
            .collect();
        nodes.sort_by_key(|(net, _)| *net);
        nodes.into_iter().map(|(_, position)| position).collect()
    }

    #[test]
    fn initial_world_is_seeded() {
        let mut first = setup_world();
        spawn_initial_world(&mut first);
        let mut second = setup_world();
        spawn_initial_world(&mut second);

        assert_eq!(layout(&mut first), layout(&mut second));
        assert_eq!(first.query::<&Building>().iter(&first).count(), 2);
        assert_eq!(first.query::<&Worker>().iter(&first).count(), 6);
        assert_eq!(first.resource::<NetworkIds>().len(), 2 + 6 + 12);
    }

    #[test]
    fn bases_do_not_overlap() {
        let config = SimulationConfig::default();
        let a = base_position(&config, PlayerId(0));
        let b = base_position(&config, PlayerId(1));
        assert!(a.distance(b) > 20.0);
        assert!(config.in_bounds(a.to_array()) && config.in_bounds(b.to_array()));
    }
}
