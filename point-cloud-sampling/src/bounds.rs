/// Point cloud coordinate bounds tracking
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointCloudBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl PointCloudBounds {
    /// Create new bounds initialised to infinity values
    pub fn new() -> Self {
        Self {
            min_x: f32::INFINITY,
            max_x: f32::NEG_INFINITY,
            min_y: f32::INFINITY,
            max_y: f32::NEG_INFINITY,
            min_z: f32::INFINITY,
            max_z: f32::NEG_INFINITY,
        }
    }

    /// Bounds enclosing every position, empty bounds for no positions
    pub fn from_positions(positions: &[[f32; 3]]) -> Self {
        let mut bounds = Self::new();
        for p in positions {
            bounds.update(*p);
        }
        bounds
    }

    /// Update bounds with a new point
    pub fn update(&mut self, p: [f32; 3]) {
        self.min_x = self.min_x.min(p[0]);
        self.max_x = self.max_x.max(p[0]);
        self.min_y = self.min_y.min(p[1]);
        self.max_y = self.max_y.max(p[1]);
        self.min_z = self.min_z.min(p[2]);
        self.max_z = self.max_z.max(p[2]);
    }

    /// Combine two partial bounds, used when reducing parallel chunks
    pub fn merge(mut self, other: Self) -> Self {
        self.min_x = self.min_x.min(other.min_x);
        self.max_x = self.max_x.max(other.max_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_y = self.max_y.max(other.max_y);
        self.min_z = self.min_z.min(other.min_z);
        self.max_z = self.max_z.max(other.max_z);
        self
    }

    /// True until at least one point has been added
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    /// Get world space dimensions, zero for empty bounds
    pub fn dimensions(&self) -> (f32, f32, f32) {
        if self.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        (
            self.max_x - self.min_x,
            self.max_y - self.min_y,
            self.max_z - self.min_z,
        )
    }

    /// Inclusive containment test with a tolerance on every face
    pub fn contains(&self, p: [f32; 3], tolerance: f32) -> bool {
        p[0] >= self.min_x - tolerance
            && p[0] <= self.max_x + tolerance
            && p[1] >= self.min_y - tolerance
            && p[1] <= self.max_y + tolerance
            && p[2] >= self.min_z - tolerance
            && p[2] <= self.max_z + tolerance
    }
}

impl Default for PointCloudBounds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_matches_single_pass() {
        let points = [[0.0, 1.0, 2.0], [-3.0, 4.0, 0.5], [1.5, -2.0, 7.0]];
        let whole = PointCloudBounds::from_positions(&points);
        let merged = PointCloudBounds::from_positions(&points[..1])
            .merge(PointCloudBounds::from_positions(&points[1..]));
        assert_eq!(whole, merged);
        assert_eq!(whole.dimensions(), (4.5, 6.0, 6.5));
    }

    #[test]
    fn empty_bounds_have_no_extent() {
        let bounds = PointCloudBounds::new();
        assert!(bounds.is_empty());
        assert_eq!(bounds.dimensions(), (0.0, 0.0, 0.0));
        assert!(!bounds.contains([0.0, 0.0, 0.0], 0.0));
    }
}
