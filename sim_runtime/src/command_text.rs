use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::{BuildingKind, CommandId, CommandPayload, UnitKind};

#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid integer '{value}' for {context}: {source}")]
    InvalidInteger {
        value: String,
        context: &'static str,
        source: ParseIntError,
    },
    #[error("invalid float '{value}' for {context}: {source}")]
    InvalidFloat {
        value: String,
        context: &'static str,
        source: ParseFloatError,
    },
    #[error("invalid building kind '{0}'")]
    InvalidBuildingKind(String),
    #[error("invalid unit kind '{0}'")]
    InvalidUnitKind(String),
}

/// Parse one console line.
///
/// ```text
/// turn [steps]
/// pause | resume | status
/// place <player> <building> <x> <y> <z>
/// recruit <player> <unit> <x> <y> <z> <command_id>
/// ```
pub fn parse_command_line(input: &str) -> Result<CommandPayload, CommandParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CommandParseError::Empty);
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts
        .next()
        .map(|v| v.to_ascii_lowercase())
        .ok_or(CommandParseError::Empty)?;

    match verb.as_str() {
        "turn" | "step" => {
            let steps_str = parts.next().unwrap_or("1");
            let steps = parse_u32(steps_str, "turn steps")?;
            Ok(CommandPayload::Turn { steps })
        }
        "pause" => Ok(CommandPayload::Pause),
        "resume" => Ok(CommandPayload::Resume),
        "status" => Ok(CommandPayload::Status),
        "place" | "build" => {
            let player_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("player"))?;
            let kind_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("building"))?;
            let player_id = parse_u32(player_str, "place player")?;
            let kind = kind_str
                .to_ascii_lowercase()
                .parse::<BuildingKind>()
                .map_err(|_| CommandParseError::InvalidBuildingKind(kind_str.to_string()))?;
            let position = parse_position(&mut parts, "place position")?;
            Ok(CommandPayload::PlaceBuilding {
                player_id,
                kind,
                position,
            })
        }
        "recruit" | "spawn" => {
            let player_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("player"))?;
            let kind_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("unit"))?;
            let player_id = parse_u32(player_str, "recruit player")?;
            let kind = kind_str
                .to_ascii_lowercase()
                .parse::<UnitKind>()
                .map_err(|_| CommandParseError::InvalidUnitKind(kind_str.to_string()))?;
            let building_position = parse_position(&mut parts, "recruit building")?;
            let id_str = parts
                .next()
                .ok_or(CommandParseError::MissingArgument("command_id"))?;
            let command_id = CommandId(parse_u32(id_str, "recruit command id")?);
            Ok(CommandPayload::SpawnUnit {
                player_id,
                kind,
                building_position,
                command_id,
            })
        }
        other => Err(CommandParseError::UnknownCommand(other.to_string())),
    }
}

fn parse_position<'a, I>(parts: &mut I, context: &'static str) -> Result<[f32; 3], CommandParseError>
where
    I: Iterator<Item = &'a str>,
{
    let mut position = [0.0f32; 3];
    for (axis, name) in position.iter_mut().zip(["x", "y", "z"]) {
        let token = parts.next().ok_or(CommandParseError::MissingArgument(name))?;
        *axis = parse_f32(token, context)?;
    }
    Ok(position)
}

fn parse_u32(value: &str, context: &'static str) -> Result<u32, CommandParseError> {
    value
        .parse::<u32>()
        .map_err(|source| CommandParseError::InvalidInteger {
            value: value.to_string(),
            context,
            source,
        })
}

fn parse_f32(value: &str, context: &'static str) -> Result<f32, CommandParseError> {
    value
        .parse::<f32>()
        .map_err(|source| CommandParseError::InvalidFloat {
            value: value.to_string(),
            context,
            source,
        })
}
