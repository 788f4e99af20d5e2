//! World-space positions.
//!
//! Distance is only ever used as a tie-break heuristic, so the API exposes
//! squared Euclidean distance and nothing else. No square roots are taken
//! on the dispatch path.

/// A point in host world space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    /// East-west coordinate.
    pub x: f32,
    /// Height above the terrain datum.
    pub y: f32,
    /// North-south coordinate.
    pub z: f32,
}

impl Position {
    /// Construct a position from its three components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Construct a ground-level position.
    pub const fn flat(x: f32, z: f32) -> Self {
        Self { x, y: 0.0, z }
    }

    /// Squared Euclidean distance to `other`.
    pub fn distance_sq(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Whether every component is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}
