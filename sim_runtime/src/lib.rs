//! Shared runtime utilities for the RTS server and its tooling.
//!
//! Re-exports the wire contracts from `sim_schema` and adds the operator
//! command surface (protobuf envelopes and the text console grammar) without
//! depending on the Bevy runtime in `rts_sim`.

pub use sim_schema::*;

mod command_text;
mod commands;

pub use command_text::{parse_command_line, CommandParseError};
pub use commands::{CommandDecodeError, CommandEncodeError, CommandEnvelope, CommandPayload};
