//! Path oracles used by clients to plan waypoints.
//!
//! The server never plans paths for player-issued targets. It moves units
//! along the waypoints clients send, so only client apps hold a
//! [`PathOracleHandle`].

use std::sync::Arc;

use bevy::prelude::*;
use bitflags::bitflags;
use pathfinding::prelude::astar;

bitflags! {
    /// Walkable area categories a query may traverse.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NavAreas: u8 {
        const GROUND = 0b01;
        const BUILDING = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStatus {
    Complete,
    Partial,
    Invalid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub status: PathStatus,
    /// Corners after the start position; the last corner is the destination.
    pub corners: Vec<Vec3>,
}

impl PathResult {
    pub fn invalid() -> Self {
        Self {
            status: PathStatus::Invalid,
            corners: Vec::new(),
        }
    }
}

pub trait PathOracle: Send + Sync {
    fn find_path(&self, start: Vec3, end: Vec3, areas: NavAreas) -> PathResult;

    fn sample_position(&self, point: Vec3, max_radius: f32, areas: NavAreas) -> Option<Vec3>;
}

#[derive(Resource, Clone)]
pub struct PathOracleHandle(pub Arc<dyn PathOracle>);

impl PathOracleHandle {
    pub fn new<O: PathOracle + 'static>(oracle: O) -> Self {
        Self(Arc::new(oracle))
    }

    pub fn oracle(&self) -> &dyn PathOracle {
        self.0.as_ref()
    }
}

/// Straight line to any destination.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectLineOracle;

impl PathOracle for DirectLineOracle {
    fn find_path(&self, _start: Vec3, end: Vec3, _areas: NavAreas) -> PathResult {
        PathResult {
            status: PathStatus::Complete,
            corners: vec![end],
        }
    }

    fn sample_position(&self, point: Vec3, _max_radius: f32, _areas: NavAreas) -> Option<Vec3> {
        Some(point)
    }
}

type Cell = (i32, i32);

const STRAIGHT_COST: u32 = 10;
const DIAGONAL_COST: u32 = 14;
const NEIGHBOURS: [(i32, i32); 8] = [
    (1, 0),
    (-1, 0),
    (0, 1),
    (0, -1),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

/// Walkability grid over the ground plane. Building footprints are blocked.
#[derive(Debug, Clone)]
pub struct GridNavMesh {
    width: i32,
    height: i32,
    cell_size: f32,
    blocked: Vec<bool>,
}

impl GridNavMesh {
    pub fn new(map_size: [f32; 2], cell_size: f32) -> Self {
        let cell_size = cell_size.max(0.1);
        let width = (map_size[0] / cell_size).ceil().max(1.0) as i32;
        let height = (map_size[1] / cell_size).ceil().max(1.0) as i32;
        Self {
            width,
            height,
            cell_size,
            blocked: vec![false; (width * height) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// Block every cell whose centre lies inside the square footprint.
    pub fn block_footprint(&mut self, center: Vec3, footprint: f32) {
        let half = footprint * 0.5;
        let (min_x, min_z) = self.cell_of(Vec3::new(center.x - half, 0.0, center.z - half));
        let (max_x, max_z) = self.cell_of(Vec3::new(center.x + half, 0.0, center.z + half));
        for z in min_z..=max_z {
            for x in min_x..=max_x {
                let mid = self.cell_center((x, z));
                if (mid.x - center.x).abs() < half && (mid.z - center.z).abs() < half {
                    if let Some(index) = self.index((x, z)) {
                        self.blocked[index] = true;
                    }
                }
            }
        }
    }

    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.index(cell).map(|i| !self.blocked[i]).unwrap_or(false)
    }

    pub fn is_walkable_at(&self, point: Vec3) -> bool {
        self.is_walkable(self.cell_of(point))
    }

    fn index(&self, (x, z): Cell) -> Option<usize> {
        if x < 0 || z < 0 || x >= self.width || z >= self.height {
            return None;
        }
        Some((z * self.width + x) as usize)
    }

    fn cell_of(&self, point: Vec3) -> Cell {
        let x = (point.x / self.cell_size).floor() as i32;
        let z = (point.z / self.cell_size).floor() as i32;
        (x.clamp(0, self.width - 1), z.clamp(0, self.height - 1))
    }

    fn cell_center(&self, (x, z): Cell) -> Vec3 {
        Vec3::new(
            (x as f32 + 0.5) * self.cell_size,
            0.0,
            (z as f32 + 0.5) * self.cell_size,
        )
    }

    fn successors(&self, &(x, z): &Cell) -> Vec<(Cell, u32)> {
        NEIGHBOURS
            .iter()
            .filter_map(|&(dx, dz)| {
                let next = (x + dx, z + dz);
                if !self.is_walkable(next) {
                    return None;
                }
                if dx != 0 && dz != 0 {
                    // No corner cutting past blocked cells.
                    if !self.is_walkable((x + dx, z)) || !self.is_walkable((x, z + dz)) {
                        return None;
                    }
                    return Some((next, DIAGONAL_COST));
                }
                Some((next, STRAIGHT_COST))
            })
            .collect()
    }

    fn nearest_walkable(&self, point: Vec3, max_radius: f32) -> Option<Cell> {
        let origin = self.cell_of(point);
        if self.is_walkable(origin) {
            return Some(origin);
        }
        let reach = (max_radius / self.cell_size).ceil() as i32;
        let max_sq = max_radius * max_radius;
        let mut best: Option<(f32, Cell)> = None;
        for dz in -reach..=reach {
            for dx in -reach..=reach {
                let cell = (origin.0 + dx, origin.1 + dz);
                if !self.is_walkable(cell) {
                    continue;
                }
                let center = self.cell_center(cell);
                let dist = (center.x - point.x).powi(2) + (center.z - point.z).powi(2);
                if dist > max_sq {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some((best_dist, best_cell)) => {
                        dist < best_dist || (dist == best_dist && cell < best_cell)
                    }
                };
                if better {
                    best = Some((dist, cell));
                }
            }
        }
        best.map(|(_, cell)| cell)
    }

    fn corners(&self, cells: &[Cell], destination: Vec3) -> Vec<Vec3> {
        let mut corners = Vec::new();
        for window in cells.windows(3) {
            let first = (window[1].0 - window[0].0, window[1].1 - window[0].1);
            let second = (window[2].0 - window[1].0, window[2].1 - window[1].1);
            if first != second {
                corners.push(self.cell_center(window[1]));
            }
        }
        corners.push(destination);
        corners
    }
}

fn octile(a: Cell, b: Cell) -> u32 {
    let dx = (a.0 - b.0).unsigned_abs();
    let dz = (a.1 - b.1).unsigned_abs();
    let (low, high) = if dx < dz { (dx, dz) } else { (dz, dx) };
    DIAGONAL_COST * low + STRAIGHT_COST * (high - low)
}

impl PathOracle for GridNavMesh {
    fn find_path(&self, start: Vec3, end: Vec3, areas: NavAreas) -> PathResult {
        if !areas.contains(NavAreas::GROUND) {
            return PathResult::invalid();
        }
        let search = self.width.max(self.height) as f32 * self.cell_size;
        let Some(start_cell) = self.nearest_walkable(start, search) else {
            return PathResult::invalid();
        };

        let (goal_cell, destination, status) = if self.is_walkable_at(end) {
            (self.cell_of(end), end, PathStatus::Complete)
        } else {
            match self.nearest_walkable(end, search) {
                Some(cell) => (cell, self.cell_center(cell), PathStatus::Partial),
                None => return PathResult::invalid(),
            }
        };

        let Some((cells, _cost)) = astar(
            &start_cell,
            |cell| self.successors(cell),
            |cell| octile(*cell, goal_cell),
            |cell| *cell == goal_cell,
        ) else {
            return PathResult::invalid();
        };

        PathResult {
            status,
            corners: self.corners(&cells, destination),
        }
    }

    fn sample_position(&self, point: Vec3, max_radius: f32, areas: NavAreas) -> Option<Vec3> {
        if !areas.contains(NavAreas::GROUND) {
            return None;
        }
        if self.is_walkable_at(point) {
            return Some(point);
        }
        self.nearest_walkable(point, max_radius)
            .map(|cell| self.cell_center(cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_grid_yields_direct_destination() {
        let mesh = GridNavMesh::new([16.0, 16.0], 1.0);
        let result = mesh.find_path(
            Vec3::new(1.5, 0.0, 1.5),
            Vec3::new(8.5, 0.0, 1.5),
            NavAreas::GROUND,
        );
        assert_eq!(result.status, PathStatus::Complete);
        assert_eq!(result.corners, vec![Vec3::new(8.5, 0.0, 1.5)]);
    }

    #[test]
    fn wall_forces_detour_corners() {
        let mut mesh = GridNavMesh::new([16.0, 16.0], 1.0);
        // Vertical wall at x = 5 from z = 0 to z = 9.
        for z in 0..10 {
            mesh.block_footprint(Vec3::new(5.5, 0.0, z as f32 + 0.5), 1.0);
        }
        let result = mesh.find_path(
            Vec3::new(1.5, 0.0, 1.5),
            Vec3::new(9.5, 0.0, 1.5),
            NavAreas::GROUND,
        );
        assert_eq!(result.status, PathStatus::Complete);
        assert!(result.corners.len() >= 2);
        assert_eq!(result.corners.last().copied(), Some(Vec3::new(9.5, 0.0, 1.5)));
        for corner in &result.corners {
            assert!(mesh.is_walkable_at(*corner));
        }
    }

    #[test]
    fn blocked_destination_is_sampled_as_partial() {
        let mut mesh = GridNavMesh::new([16.0, 16.0], 1.0);
        mesh.block_footprint(Vec3::new(10.0, 0.0, 10.0), 4.0);
        assert!(!mesh.is_walkable_at(Vec3::new(10.0, 0.0, 10.0)));
        let result = mesh.find_path(
            Vec3::new(1.5, 0.0, 1.5),
            Vec3::new(10.0, 0.0, 10.0),
            NavAreas::GROUND,
        );
        assert_eq!(result.status, PathStatus::Partial);
        let last = result.corners.last().copied().expect("corner");
        assert!(mesh.is_walkable_at(last));
        assert!(last.distance(Vec3::new(10.0, 0.0, 10.0)) < 3.5);
    }

    #[test]
    fn enclosed_goal_is_invalid() {
        let mut mesh = GridNavMesh::new([8.0, 8.0], 1.0);
        for z in 0..8 {
            mesh.block_footprint(Vec3::new(4.5, 0.0, z as f32 + 0.5), 1.0);
        }
        let result = mesh.find_path(
            Vec3::new(1.5, 0.0, 1.5),
            Vec3::new(6.5, 0.0, 6.5),
            NavAreas::GROUND,
        );
        assert_eq!(result.status, PathStatus::Invalid);
        assert!(result.corners.is_empty());
    }

    #[test]
    fn sample_respects_radius() {
        let mut mesh = GridNavMesh::new([16.0, 16.0], 1.0);
        mesh.block_footprint(Vec3::new(8.0, 0.0, 8.0), 6.0);
        assert_eq!(
            mesh.sample_position(Vec3::new(8.0, 0.0, 8.0), 1.0, NavAreas::GROUND),
            None
        );
        assert!(mesh
            .sample_position(Vec3::new(8.0, 0.0, 8.0), 5.0, NavAreas::GROUND)
            .is_some());
    }
}
