use serde::{Deserialize, Serialize};

use crate::{BuildingKind, Tick, UnitKind};

/// Records stored in per-player tick buffers.
pub trait TickStamped {
    fn tick(&self) -> Tick;
}

/// Request to place a building. Deduplicated by kind and position, not by id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaceBuildingCommand {
    pub tick: Tick,
    pub kind: BuildingKind,
    pub position: [f32; 3],
}

impl TickStamped for PlaceBuildingCommand {
    fn tick(&self) -> Tick {
        self.tick
    }
}

/// Identifier assigned by the issuing client to each recruitment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CommandId(pub u32);

/// Request to queue a unit at the building found at `building_position`.
///
/// Two requests may legitimately target the same building with the same unit
/// kind, so these are deduplicated by `command_id` only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnUnitCommand {
    pub tick: Tick,
    pub kind: UnitKind,
    pub building_position: [f32; 3],
    pub command_id: CommandId,
}

impl TickStamped for SpawnUnitCommand {
    fn tick(&self) -> Tick {
        self.tick
    }
}
