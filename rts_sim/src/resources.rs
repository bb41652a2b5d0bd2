use std::collections::BTreeMap;

use bevy::prelude::*;
use sim_runtime::{NetEntity, Tick};

/// Tracks the current authoritative (server) or predicted (client) tick.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationTick(pub Tick);

/// Bumped whenever a placement changes walkable space.
#[derive(Resource, Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigationEpoch(pub u32);

impl NavigationEpoch {
    pub fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

/// Bidirectional map between network identities and local entities.
///
/// The server allocates identities in spawn order, which keeps them
/// identical across runs with the same inputs.
#[derive(Resource, Debug, Clone, Default)]
pub struct NetworkIds {
    next: u64,
    by_net: BTreeMap<NetEntity, Entity>,
    by_entity: BTreeMap<Entity, NetEntity>,
}

impl NetworkIds {
    pub fn allocate(&mut self, entity: Entity) -> NetEntity {
        self.next += 1;
        let net = NetEntity(self.next);
        self.bind(net, entity);
        net
    }

    pub fn bind(&mut self, net: NetEntity, entity: Entity) {
        self.by_net.insert(net, entity);
        self.by_entity.insert(entity, net);
    }

    pub fn entity(&self, net: NetEntity) -> Option<Entity> {
        self.by_net.get(&net).copied()
    }

    pub fn net(&self, entity: Entity) -> Option<NetEntity> {
        self.by_entity.get(&entity).copied()
    }

    pub fn release(&mut self, net: NetEntity) -> Option<Entity> {
        let entity = self.by_net.remove(&net)?;
        self.by_entity.remove(&entity);
        Some(entity)
    }

    pub fn release_entity(&mut self, entity: Entity) -> Option<NetEntity> {
        let net = self.by_entity.remove(&entity)?;
        self.by_net.remove(&net);
        Some(net)
    }

    pub fn len(&self) -> usize {
        self.by_net.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_net.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NetEntity, Entity)> + '_ {
        self.by_net.iter().map(|(net, entity)| (*net, *entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_sequential_and_reversible() {
        let mut ids = NetworkIds::default();
        let a = ids.allocate(Entity::from_raw(10));
        let b = ids.allocate(Entity::from_raw(4));
        assert_eq!((a, b), (NetEntity(1), NetEntity(2)));
        assert_eq!(ids.entity(b), Some(Entity::from_raw(4)));
        assert_eq!(ids.net(Entity::from_raw(10)), Some(a));

        assert_eq!(ids.release_entity(Entity::from_raw(10)), Some(a));
        assert_eq!(ids.entity(a), None);
        assert_eq!(ids.allocate(Entity::from_raw(11)), NetEntity(3));
    }
}
