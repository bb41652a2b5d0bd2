use bevy::prelude::*;
use sim_runtime::{TargetDescriptor, WaypointBuffer};

use crate::navigation::{NavAreas, PathOracle, PathStatus};

/// Plan the waypoint buffer a unit at `start` follows toward `target`.
///
/// A failed query degrades to a single waypoint at the raw destination so the
/// unit still moves in a straight line.
pub fn produce_waypoints(
    oracle: &dyn PathOracle,
    start: Vec3,
    target: &TargetDescriptor,
) -> WaypointBuffer {
    let destination = Vec3::from_array(target.target_position);
    let result = oracle.find_path(start, destination, NavAreas::GROUND);

    let reached_edge = result.status == PathStatus::Partial && !result.corners.is_empty();
    let mut corners = match result.status {
        PathStatus::Complete | PathStatus::Partial if !result.corners.is_empty() => result.corners,
        _ => {
            tracing::debug!(
                target: "rts::prediction",
                status = ?result.status,
                "path.fallback=direct_line"
            );
            vec![destination]
        }
    };

    // A partial path already ends at the closest reachable point.
    if !reached_edge {
        apply_stopping_distance(&mut corners, start, target.stopping_distance);
    }

    let points: Vec<[f32; 3]> = corners.iter().map(|corner| corner.to_array()).collect();
    WaypointBuffer::from_corners(&points)
}

/// Pull the final corner back toward the previous one so the unit halts
/// `stopping` short of the target.
fn apply_stopping_distance(corners: &mut [Vec3], start: Vec3, stopping: f32) {
    if stopping <= 0.0 {
        return;
    }
    let count = corners.len();
    let Some(last) = corners.last().copied() else {
        return;
    };
    let previous = if count >= 2 { corners[count - 2] } else { start };
    let mut segment = last - previous;
    segment.y = 0.0;
    let length = segment.length();
    let pulled = if length <= stopping {
        Vec3::new(previous.x, last.y, previous.z)
    } else {
        last - segment / length * stopping
    };
    corners[count - 1] = pulled;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigation::{DirectLineOracle, GridNavMesh, PathResult};
    use sim_runtime::NetEntity;

    fn planar_distance(a: Vec3, b: Vec3) -> f32 {
        Vec2::new(a.x - b.x, a.z - b.z).length()
    }

    struct FailingOracle;

    impl PathOracle for FailingOracle {
        fn find_path(&self, _: Vec3, _: Vec3, _: NavAreas) -> PathResult {
            PathResult::invalid()
        }

        fn sample_position(&self, _: Vec3, _: f32, _: NavAreas) -> Option<Vec3> {
            None
        }
    }

    #[test]
    fn failed_query_falls_back_to_raw_destination() {
        let target = TargetDescriptor::at_position([12.0, 0.0, 4.0], 1);
        let buffer = produce_waypoints(&FailingOracle, Vec3::ZERO, &target);
        assert_eq!(buffer.as_slice(), &[[12.0, 0.0, 4.0]]);
    }

    #[test]
    fn followed_target_stops_short() {
        let target = TargetDescriptor::following(NetEntity(4), [10.0, 0.0, 0.0], 1.0, 3);
        let buffer = produce_waypoints(&DirectLineOracle, Vec3::ZERO, &target);
        let last = buffer.last().expect("waypoint");
        assert!((last[0] - 9.0).abs() < 1e-5);
    }

    #[test]
    fn unit_already_in_range_stays_put() {
        let target = TargetDescriptor::following(NetEntity(4), [1.0, 0.0, 0.0], 2.5, 3);
        let start = Vec3::new(0.2, 0.0, 0.0);
        let buffer = produce_waypoints(&DirectLineOracle, start, &target);
        assert_eq!(buffer.as_slice(), &[[0.2, 0.0, 0.0]]);
    }

    #[test]
    fn blocked_building_target_uses_sampled_edge() {
        let mut mesh = GridNavMesh::new([32.0, 32.0], 1.0);
        mesh.block_footprint(Vec3::new(10.0, 0.0, 10.0), 4.0);
        let target = TargetDescriptor::following(NetEntity(1), [10.0, 0.0, 10.0], 2.5, 2);
        let buffer = produce_waypoints(&mesh, Vec3::new(2.5, 0.0, 2.5), &target);
        let last = Vec3::from_array(buffer.last().expect("waypoint"));
        assert!(mesh.is_walkable_at(last));
        assert!(planar_distance(last, Vec3::new(10.0, 0.0, 10.0)) < 3.5);
    }
}
