use serde::{Deserialize, Serialize};

use crate::NetEntity;

/// Where a unit should go, and which issuance produced the request.
///
/// Every unit carries two of these: one written by its owner's input and one
/// written by the server. They never share storage; `version` decides which
/// one is authoritative for a given tick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub target_entity: Option<NetEntity>,
    pub target_position: [f32; 3],
    pub is_following_target: bool,
    pub stopping_distance: f32,
    pub version: u32,
}

impl TargetDescriptor {
    pub fn at_position(position: [f32; 3], version: u32) -> Self {
        Self {
            target_entity: None,
            target_position: position,
            is_following_target: false,
            stopping_distance: 0.0,
            version,
        }
    }

    pub fn following(
        entity: NetEntity,
        position: [f32; 3],
        stopping_distance: f32,
        version: u32,
    ) -> Self {
        Self {
            target_entity: Some(entity),
            target_position: position,
            is_following_target: true,
            stopping_distance,
            version,
        }
    }

    /// Drop the followed entity, keeping the last known position.
    pub fn clear_follow(&mut self) {
        self.target_entity = None;
        self.is_following_target = false;
    }
}
