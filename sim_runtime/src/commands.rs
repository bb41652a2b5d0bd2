use prost::Message;
use thiserror::Error;

use crate::{BuildingKind, CommandId, UnitKind};

mod proto {
    include!(concat!(env!("OUT_DIR"), "/rts.commands.rs"));
}

use proto as pb;

/// High-level representation of an operator command envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    pub payload: CommandPayload,
    pub correlation_id: Option<u64>,
}

/// Operator commands accepted by the server console.
///
/// `PlaceBuilding` and `SpawnUnit` are stamped with the next server tick and
/// pushed through the same per-player buffers as client input, so they are
/// charged and deduplicated exactly like player commands.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    Turn {
        steps: u32,
    },
    Pause,
    Resume,
    Status,
    PlaceBuilding {
        player_id: u32,
        kind: BuildingKind,
        position: [f32; 3],
    },
    SpawnUnit {
        player_id: u32,
        kind: UnitKind,
        building_position: [f32; 3],
        command_id: CommandId,
    },
}

#[derive(Debug, Error)]
pub enum CommandEncodeError {
    #[error("encode failed: {0}")]
    Encode(#[from] prost::EncodeError),
}

/// Error returned when decoding a command envelope fails.
///
/// The protobuf schema reserves `*_UNSPECIFIED` enum values (encoded as `0`);
/// decoding one yields [`CommandDecodeError::InvalidEnum`].
#[derive(Debug, Error)]
pub enum CommandDecodeError {
    #[error("decode failed: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("command envelope missing payload")]
    MissingPayload,
    #[error("invalid enum value {value} for {field}")]
    InvalidEnum { field: &'static str, value: i32 },
    #[error("missing field {0}")]
    MissingField(&'static str),
}

impl CommandEnvelope {
    pub fn new(payload: CommandPayload) -> Self {
        Self {
            payload,
            correlation_id: None,
        }
    }

    /// Encode the envelope into a protobuf binary frame.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, CommandEncodeError> {
        let proto = self.to_proto();
        let mut buffer = Vec::with_capacity(proto.encoded_len());
        proto.encode(&mut buffer)?;
        Ok(buffer)
    }

    /// Decode an envelope from a protobuf binary frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, CommandDecodeError> {
        let proto = pb::CommandEnvelope::decode(bytes)?;
        Self::try_from_proto(proto)
    }

    fn to_proto(&self) -> pb::CommandEnvelope {
        let command = Some(match &self.payload {
            CommandPayload::Turn { steps } => {
                pb::command_envelope::Command::Turn(pb::TurnCommand { steps: *steps })
            }
            CommandPayload::Pause => pb::command_envelope::Command::Pause(pb::PauseCommand {}),
            CommandPayload::Resume => pb::command_envelope::Command::Resume(pb::ResumeCommand {}),
            CommandPayload::Status => pb::command_envelope::Command::Status(pb::StatusCommand {}),
            CommandPayload::PlaceBuilding {
                player_id,
                kind,
                position,
            } => pb::command_envelope::Command::PlaceBuilding(pb::PlaceBuildingCommand {
                player_id: *player_id,
                kind: building_kind_to_proto(*kind) as i32,
                position: Some(vec3_to_proto(*position)),
            }),
            CommandPayload::SpawnUnit {
                player_id,
                kind,
                building_position,
                command_id,
            } => pb::command_envelope::Command::SpawnUnit(pb::SpawnUnitCommand {
                player_id: *player_id,
                kind: unit_kind_to_proto(*kind) as i32,
                building_position: Some(vec3_to_proto(*building_position)),
                command_id: command_id.0,
            }),
        });

        pb::CommandEnvelope {
            command,
            correlation_id: self.correlation_id,
        }
    }

    fn try_from_proto(proto: pb::CommandEnvelope) -> Result<Self, CommandDecodeError> {
        let payload = match proto.command.ok_or(CommandDecodeError::MissingPayload)? {
            pb::command_envelope::Command::Turn(cmd) => CommandPayload::Turn { steps: cmd.steps },
            pb::command_envelope::Command::Pause(_) => CommandPayload::Pause,
            pb::command_envelope::Command::Resume(_) => CommandPayload::Resume,
            pb::command_envelope::Command::Status(_) => CommandPayload::Status,
            pb::command_envelope::Command::PlaceBuilding(cmd) => {
                let position = cmd
                    .position
                    .ok_or(CommandDecodeError::MissingField("PlaceBuildingCommand.position"))?;
                CommandPayload::PlaceBuilding {
                    player_id: cmd.player_id,
                    kind: building_kind_from_proto(cmd.kind)?,
                    position: vec3_from_proto(position),
                }
            }
            pb::command_envelope::Command::SpawnUnit(cmd) => {
                let building_position = cmd.building_position.ok_or(
                    CommandDecodeError::MissingField("SpawnUnitCommand.building_position"),
                )?;
                CommandPayload::SpawnUnit {
                    player_id: cmd.player_id,
                    kind: unit_kind_from_proto(cmd.kind)?,
                    building_position: vec3_from_proto(building_position),
                    command_id: CommandId(cmd.command_id),
                }
            }
        };

        Ok(CommandEnvelope {
            payload,
            correlation_id: proto.correlation_id,
        })
    }
}

fn vec3_to_proto(value: [f32; 3]) -> pb::Vec3 {
    pb::Vec3 {
        x: value[0],
        y: value[1],
        z: value[2],
    }
}

fn vec3_from_proto(value: pb::Vec3) -> [f32; 3] {
    [value.x, value.y, value.z]
}

fn building_kind_to_proto(value: BuildingKind) -> pb::BuildingKind {
    match value {
        BuildingKind::Center => pb::BuildingKind::Center,
        BuildingKind::Barracks => pb::BuildingKind::Barracks,
        BuildingKind::House => pb::BuildingKind::House,
        BuildingKind::Farm => pb::BuildingKind::Farm,
    }
}

fn building_kind_from_proto(value: i32) -> Result<BuildingKind, CommandDecodeError> {
    match pb::BuildingKind::try_from(value) {
        Ok(pb::BuildingKind::Center) => Ok(BuildingKind::Center),
        Ok(pb::BuildingKind::Barracks) => Ok(BuildingKind::Barracks),
        Ok(pb::BuildingKind::House) => Ok(BuildingKind::House),
        Ok(pb::BuildingKind::Farm) => Ok(BuildingKind::Farm),
        _ => Err(CommandDecodeError::InvalidEnum {
            field: "BuildingKind",
            value,
        }),
    }
}

fn unit_kind_to_proto(value: UnitKind) -> pb::UnitKind {
    match value {
        UnitKind::Worker => pb::UnitKind::Worker,
        UnitKind::Warrior => pb::UnitKind::Warrior,
        UnitKind::Archer => pb::UnitKind::Archer,
        UnitKind::Ballista => pb::UnitKind::Ballista,
    }
}

fn unit_kind_from_proto(value: i32) -> Result<UnitKind, CommandDecodeError> {
    match pb::UnitKind::try_from(value) {
        Ok(pb::UnitKind::Worker) => Ok(UnitKind::Worker),
        Ok(pb::UnitKind::Warrior) => Ok(UnitKind::Warrior),
        Ok(pb::UnitKind::Archer) => Ok(UnitKind::Archer),
        Ok(pb::UnitKind::Ballista) => Ok(UnitKind::Ballista),
        _ => Err(CommandDecodeError::InvalidEnum {
            field: "UnitKind",
            value,
        }),
    }
}
