use serde::{Deserialize, Serialize};

use crate::{
    NetEntity, PlaceBuildingCommand, PlayerId, SpawnUnitCommand, TargetDescriptor, Tick,
    TickStamped, WaypointBuffer,
};

/// Per-unit slice of an input frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitInput {
    pub entity: NetEntity,
    pub target: TargetDescriptor,
    pub waypoints: WaypointBuffer,
}

/// Everything one client produced for one tick.
///
/// `placement` and `spawn` carry the newest command of each kind with its
/// original tick stamp, so a resent command is byte-identical to the first send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    pub player: PlayerId,
    pub tick: Tick,
    pub units: Vec<UnitInput>,
    pub placement: Option<PlaceBuildingCommand>,
    pub spawn: Option<SpawnUnitCommand>,
}

impl InputFrame {
    pub fn empty(player: PlayerId, tick: Tick) -> Self {
        Self {
            player,
            tick,
            units: Vec::new(),
            placement: None,
            spawn: None,
        }
    }

    pub fn unit(&self, entity: NetEntity) -> Option<&UnitInput> {
        self.units.iter().find(|input| input.entity == entity)
    }
}

impl TickStamped for InputFrame {
    fn tick(&self) -> Tick {
        self.tick
    }
}
