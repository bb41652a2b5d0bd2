//! Waypoint follower shared by server authority and client prediction.
//!
//! Both sides call [`advance_along_path`] with the same transported
//! [`WaypointBuffer`], so a client replaying its own inputs lands where the
//! server does.

use bevy::prelude::*;
use sim_runtime::{PathStateData, WaypointBuffer};

use crate::{
    components::{MoveSpeed, Simulated},
    config::SimulationConfig,
    targeting::{InputTarget, ServerTarget},
};

pub const FINAL_WAYPOINT_THRESHOLD: f32 = 0.1;
pub const INTERMEDIATE_WAYPOINT_THRESHOLD: f32 = 0.5;
/// Squared distance waypoint 0 must move before a buffer counts as a new path.
pub const NEW_PATH_EPSILON: f32 = 0.01;

#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct PathState {
    pub has_path: bool,
    pub current_waypoint_index: u8,
    /// Waypoint 0 of the path being followed. `None` until a path starts.
    pub last_target_position: Option<Vec3>,
    pub target_version: u32,
}

impl PathState {
    pub fn reset(&mut self) {
        self.has_path = false;
        self.current_waypoint_index = 0;
        self.last_target_position = None;
    }

    pub fn to_data(&self) -> PathStateData {
        PathStateData {
            has_path: self.has_path,
            current_waypoint_index: self.current_waypoint_index,
            last_target_position: self.last_target_position.map(|p| p.to_array()),
            target_version: self.target_version,
        }
    }

    pub fn from_data(data: &PathStateData) -> Self {
        Self {
            has_path: data.has_path,
            current_waypoint_index: data.current_waypoint_index,
            last_target_position: data.last_target_position.map(Vec3::from_array),
            target_version: data.target_version,
        }
    }
}

/// Waypoints the unit is following this tick.
#[derive(Component, Debug, Clone, Copy, PartialEq, Default)]
pub struct PathWaypoints(pub WaypointBuffer);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Idle,
    Moved,
    Arrived,
}

/// Waypoints and version that drive movement for this tick.
///
/// While a server-issued target outranks the owner's input, the transported
/// waypoints still lead to the old destination and are ignored until the
/// owner answers with a path for the new target.
pub fn select_waypoints(
    input: &InputTarget,
    server: &ServerTarget,
    waypoints: &PathWaypoints,
) -> (WaypointBuffer, u32) {
    if server.0.version > input.0.version {
        (WaypointBuffer::EMPTY, server.0.version)
    } else {
        (waypoints.0, input.0.version)
    }
}

/// Advance one tick along `waypoints`.
pub fn advance_along_path(
    position: &mut Vec3,
    rotation: &mut Quat,
    state: &mut PathState,
    waypoints: &WaypointBuffer,
    version: u32,
    speed: f32,
    dt: f32,
) -> StepOutcome {
    if state.target_version != version {
        state.reset();
        state.target_version = version;
    }

    let Some(first) = waypoints.first().map(Vec3::from_array) else {
        state.has_path = false;
        return StepOutcome::Idle;
    };

    let is_new_path = match state.last_target_position {
        None => true,
        Some(last) => last.distance_squared(first) > NEW_PATH_EPSILON,
    };
    if is_new_path {
        state.has_path = true;
        state.current_waypoint_index = 0;
        state.last_target_position = Some(first);
    }

    if !state.has_path {
        return StepOutcome::Idle;
    }

    let count = waypoints.len();
    let mut index = state.current_waypoint_index as usize;
    if index >= count {
        state.has_path = false;
        return StepOutcome::Idle;
    }

    while let Some(point) = waypoints.get(index) {
        let waypoint = Vec3::from_array(point);
        let mut offset = waypoint - *position;
        offset.y = 0.0;
        let distance = offset.length();
        let is_final = index + 1 == count;

        if is_final && distance < FINAL_WAYPOINT_THRESHOLD {
            state.has_path = false;
            state.current_waypoint_index = index as u8;
            return StepOutcome::Arrived;
        }
        if !is_final && distance < INTERMEDIATE_WAYPOINT_THRESHOLD {
            index += 1;
            state.current_waypoint_index = index as u8;
            continue;
        }

        let direction = offset / distance;
        let step = (speed * dt).min(distance);
        *position += direction * step;
        *rotation = Quat::from_rotation_y(direction.x.atan2(direction.z));
        state.current_waypoint_index = index as u8;
        return StepOutcome::Moved;
    }

    state.has_path = false;
    StepOutcome::Idle
}

type MovementItem<'a> = (
    &'a mut Transform,
    &'a mut PathState,
    &'a PathWaypoints,
    &'a InputTarget,
    &'a ServerTarget,
    &'a MoveSpeed,
);

pub fn follow_waypoints(
    config: Res<SimulationConfig>,
    mut units: Query<MovementItem, With<Simulated>>,
) {
    let dt = config.tick_seconds();
    for (mut transform, mut state, waypoints, input, server, speed) in units.iter_mut() {
        let (buffer, version) = select_waypoints(input, server, waypoints);
        let transform = &mut *transform;
        advance_along_path(
            &mut transform.translation,
            &mut transform.rotation,
            &mut state,
            &buffer,
            version,
            speed.0,
            dt,
        );
    }
}
