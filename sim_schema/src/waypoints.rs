use serde::{Deserialize, Serialize};

pub const WAYPOINT_CAPACITY: usize = 8;

/// Fixed-capacity ordered path carried in every input frame.
///
/// A count of zero means "no active path". The buffer is `Copy` and
/// serializes to the same bytes on both ends, which is what lets the server
/// move units along a path it never computed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "WaypointBufferWire")]
pub struct WaypointBuffer {
    count: u8,
    points: [[f32; 3]; WAYPOINT_CAPACITY],
}

/// Decoded form of a buffer before its count is checked.
#[derive(Serialize, Deserialize)]
struct WaypointBufferWire {
    count: u8,
    points: [[f32; 3]; WAYPOINT_CAPACITY],
}

impl From<WaypointBufferWire> for WaypointBuffer {
    fn from(wire: WaypointBufferWire) -> Self {
        Self {
            count: wire.count.min(WAYPOINT_CAPACITY as u8),
            points: wire.points,
        }
    }
}

impl WaypointBuffer {
    pub const EMPTY: WaypointBuffer = WaypointBuffer {
        count: 0,
        points: [[0.0; 3]; WAYPOINT_CAPACITY],
    };

    /// Clamp an oracle corner list into the buffer.
    ///
    /// When more than [`WAYPOINT_CAPACITY`] corners are supplied the leading
    /// corners are kept and the last slot is overwritten with the final
    /// destination.
    pub fn from_corners(corners: &[[f32; 3]]) -> Self {
        let mut buffer = Self::EMPTY;
        if corners.len() <= WAYPOINT_CAPACITY {
            for corner in corners {
                buffer.push(*corner);
            }
            return buffer;
        }
        for corner in &corners[..WAYPOINT_CAPACITY - 1] {
            buffer.push(*corner);
        }
        if let Some(last) = corners.last() {
            buffer.push(*last);
        }
        buffer
    }

    pub fn single(point: [f32; 3]) -> Self {
        let mut buffer = Self::EMPTY;
        buffer.push(point);
        buffer
    }

    /// Append a waypoint. Returns `false` when the buffer is full.
    pub fn push(&mut self, point: [f32; 3]) -> bool {
        let index = self.count as usize;
        if index >= WAYPOINT_CAPACITY {
            return false;
        }
        self.points[index] = point;
        self.count += 1;
        true
    }

    pub fn clear(&mut self) {
        *self = Self::EMPTY;
    }

    pub fn len(&self) -> usize {
        (self.count as usize).min(WAYPOINT_CAPACITY)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<[f32; 3]> {
        self.as_slice().get(index).copied()
    }

    pub fn first(&self) -> Option<[f32; 3]> {
        self.get(0)
    }

    pub fn last(&self) -> Option<[f32; 3]> {
        self.as_slice().last().copied()
    }

    pub fn as_slice(&self) -> &[[f32; 3]] {
        &self.points[..self.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = [f32; 3]> + '_ {
        self.as_slice().iter().copied()
    }
}
