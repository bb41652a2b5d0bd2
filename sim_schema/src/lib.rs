//! Wire contracts shared by the RTS server, its clients and operator tooling.
//!
//! Everything in this crate is plain data without any Bevy types so the same
//! structs travel unchanged between the authoritative simulation, predicting
//! clients and the command console.

mod commands;
mod ids;
mod input;
mod kinds;
mod messages;
mod snapshot;
mod target;
mod tick;
mod waypoints;

pub use commands::{CommandId, PlaceBuildingCommand, SpawnUnitCommand, TickStamped};
pub use ids::{NetEntity, PlayerId};
pub use input::{InputFrame, UnitInput};
pub use kinds::{BuildingKind, ResourceKind, TaskKind, UnitKind};
pub use messages::{
    decode_message, encode_frame, read_frame, write_frame, ClientMessage, FrameError,
    ServerMessage, MAX_FRAME_LEN,
};
pub use snapshot::{
    decode_delta, decode_snapshot, decode_snapshot_json, encode_delta, encode_snapshot,
    encode_snapshot_json, hash_snapshot, BuildingState, CarryState, LedgerState, PathStateData,
    ProgressState, ResourceNodeState, SnapshotHeader, UnitState, WorldDelta, WorldSnapshot,
};
pub use target::TargetDescriptor;
pub use tick::Tick;
pub use waypoints::{WaypointBuffer, WAYPOINT_CAPACITY};
