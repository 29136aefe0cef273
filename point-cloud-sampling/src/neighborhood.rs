/// Neighbor-count filtering: keep the nearest fraction of every neighbor list
use crate::error::{Result, SamplingError};
use crate::spatial_index::Neighbor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborhoodFilter {
    retention_fraction: f64,
}

impl NeighborhoodFilter {
    /// Fraction must lie in (0, 1]; 1 keeps every neighbor
    pub fn new(retention_fraction: f64) -> Result<Self> {
        if !(retention_fraction > 0.0 && retention_fraction <= 1.0) {
            return Err(SamplingError::config(format!(
                "retention fraction must lie in (0, 1], got {retention_fraction}"
            )));
        }
        Ok(Self { retention_fraction })
    }

    /// Filter that keeps everything
    pub fn disabled() -> Self {
        Self {
            retention_fraction: 1.0,
        }
    }

    pub fn retention_fraction(&self) -> f64 {
        self.retention_fraction
    }

    pub fn is_disabled(&self) -> bool {
        self.retention_fraction >= 1.0
    }

    /// Number of neighbors kept out of `n`: round(f * n), never below one of a non-empty list
    pub fn retained_len(&self, n: usize) -> usize {
        if self.is_disabled() || n == 0 {
            return n;
        }
        ((self.retention_fraction * n as f64).round() as usize).clamp(1, n)
    }

    /// Keep the nearest neighbors, dropping the farthest first.
    /// Equal distances keep their input order.
    pub fn apply(&self, mut neighbors: Vec<Neighbor>) -> Vec<Neighbor> {
        if self.is_disabled() {
            return neighbors;
        }
        neighbors.sort_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq));
        self.apply_sorted(neighbors)
    }

    /// Truncate a list that is already ordered nearest first
    pub fn apply_sorted(&self, mut neighbors: Vec<Neighbor>) -> Vec<Neighbor> {
        let keep = self.retained_len(neighbors.len());
        neighbors.truncate(keep);
        neighbors
    }
}

impl Default for NeighborhoodFilter {
    fn default() -> Self {
        Self {
            retention_fraction: constants::sampling::DEFAULT_RETENTION_FRACTION,
        }
    }
}
