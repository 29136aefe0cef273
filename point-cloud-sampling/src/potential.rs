/// Per-point pick potentials steering sphere centers toward uncovered regions.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use constants::sampling::{POTENTIAL_NOISE, POTENTIAL_REACH_DIVISOR};
use ordered_float::OrderedFloat;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::cloud::PointCloud;
use crate::error::{Result, SamplingError};
use crate::spatial_index::Neighbor;

/// Stale heap entries tolerated per live point before the heap is rebuilt.
const HEAP_SLACK: usize = 4;

/// Selection rule consulted by the sphere sampler.
pub trait CoveragePolicy {
    /// Number of points the policy selects from.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the next sphere center.
    fn pick(&mut self) -> Result<usize>;

    /// Account for a sphere of `radius` whose query returned `neighbors`.
    fn record(&mut self, neighbors: &[Neighbor], radius: f32);
}

/// Tukey biweight of a squared distance for the given reach.
pub fn tukey_weight(dist_sq: f32, reach: f32) -> f32 {
    let t = 1.0 - dist_sq / (reach * reach);
    if t > 0.0 { t * t } else { 0.0 }
}

/// One non-negative potential per working point.
///
/// Every sampled sphere raises the potential of the points around its center
/// with a Tukey falloff, so the point holding the lowest potential is always the
/// least covered one. The field and the sampler only meet through
/// [`CoveragePolicy`].
#[derive(Debug, Clone)]
pub struct PotentialField {
    potentials: Vec<f32>,
    heap: BinaryHeap<Reverse<(OrderedFloat<f32>, u32)>>,
}

impl PotentialField {
    /// Field of `len` points seeded with small noise so ties resolve pseudo-randomly.
    pub fn new(len: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let potentials = (0..len)
            .map(|_| rng.random_range(0.0..POTENTIAL_NOISE))
            .collect();
        Self::from_trusted(potentials)
    }

    /// Field with explicit starting potentials.
    pub fn from_values(potentials: Vec<f32>) -> Result<Self> {
        if let Some(bad) = potentials.iter().position(|p| !(p.is_finite() && *p >= 0.0)) {
            return Err(SamplingError::config(format!(
                "potential {bad} is {}, expected a finite non-negative value",
                potentials[bad]
            )));
        }
        Ok(Self::from_trusted(potentials))
    }

    fn from_trusted(potentials: Vec<f32>) -> Self {
        let mut field = Self {
            potentials,
            heap: BinaryHeap::new(),
        };
        field.rebuild_heap();
        field
    }

    fn rebuild_heap(&mut self) {
        self.heap = self
            .potentials
            .iter()
            .enumerate()
            .map(|(i, p)| Reverse((OrderedFloat(*p), i as u32)))
            .collect();
    }

    /// Start a new epoch with fresh noise, keeping the point count.
    pub fn reset(&mut self, seed: u64) {
        *self = Self::new(self.potentials.len(), seed);
    }

    pub fn len(&self) -> usize {
        self.potentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.potentials.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<f32> {
        self.potentials.get(i).copied()
    }

    pub fn potentials(&self) -> &[f32] {
        &self.potentials
    }

    /// Index of the globally lowest potential; lower index wins exact ties.
    pub fn pick_min(&mut self) -> Result<usize> {
        if self.potentials.is_empty() {
            return Err(SamplingError::EmptyField);
        }

        loop {
            match self.heap.peek() {
                Some(Reverse((value, i))) => {
                    let i = *i as usize;
                    if value.0.to_bits() == self.potentials[i].to_bits() {
                        return Ok(i);
                    }
                    self.heap.pop();
                }
                None => self.rebuild_heap(),
            }
        }
    }

    /// Raise potentials around `center`; points at or beyond `radius` are untouched.
    ///
    /// Returns how many potentials changed.
    pub fn update(&mut self, cloud: &PointCloud, center: [f32; 3], radius: f32) -> Result<usize> {
        if cloud.len() != self.len() {
            return Err(SamplingError::FieldSizeMismatch {
                field: self.len(),
                cloud: cloud.len(),
            });
        }
        let neighbors = cloud.radius_search(center, radius);
        Ok(self.update_from_neighbors(&neighbors, radius))
    }

    /// Same as [`PotentialField::update`] from an existing radius query result.
    pub fn update_from_neighbors(&mut self, neighbors: &[Neighbor], radius: f32) -> usize {
        let reach = radius / POTENTIAL_REACH_DIVISOR;
        let r2 = radius * radius;
        let mut touched = 0;

        for n in neighbors {
            if !(n.dist_sq < r2) {
                continue;
            }
            let w = tukey_weight(n.dist_sq, reach);
            if w > 0.0 {
                let p = &mut self.potentials[n.index as usize];
                *p += w;
                self.heap.push(Reverse((OrderedFloat(*p), n.index)));
                touched += 1;
            }
        }

        if self.heap.len() > HEAP_SLACK * self.potentials.len() + 1024 {
            self.rebuild_heap();
        }

        touched
    }
}

impl CoveragePolicy for PotentialField {
    fn len(&self) -> usize {
        self.potentials.len()
    }

    fn pick(&mut self) -> Result<usize> {
        self.pick_min()
    }

    fn record(&mut self, neighbors: &[Neighbor], radius: f32) {
        self.update_from_neighbors(neighbors, radius);
    }
}

/// Uniform random centers, blind to coverage. Dense regions win most draws.
#[derive(Debug, Clone)]
pub struct RandomPolicy {
    len: usize,
    rng: ChaCha8Rng,
}

impl RandomPolicy {
    pub fn new(len: usize, seed: u64) -> Self {
        Self {
            len,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl CoveragePolicy for RandomPolicy {
    fn len(&self) -> usize {
        self.len
    }

    fn pick(&mut self) -> Result<usize> {
        if self.len == 0 {
            return Err(SamplingError::EmptyField);
        }
        Ok(self.rng.random_range(0..self.len))
    }

    fn record(&mut self, _neighbors: &[Neighbor], _radius: f32) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::FeatureSchema;

    fn line_cloud(n: usize, spacing: f32) -> PointCloud {
        let positions = (0..n).map(|i| [i as f32 * spacing, 0.0, 0.0]).collect();
        PointCloud::new(positions, Vec::new(), FeatureSchema::empty()).unwrap()
    }

    fn brute_argmin(values: &[f32]) -> usize {
        let mut best = 0;
        for (i, v) in values.iter().enumerate() {
            if *v < values[best] {
                best = i;
            }
        }
        best
    }

    #[test]
    fn empty_field_cannot_pick() {
        let mut field = PotentialField::new(0, 1);
        assert!(matches!(field.pick_min(), Err(SamplingError::EmptyField)));
    }

    #[test]
    fn rejects_negative_and_non_finite_values() {
        assert!(PotentialField::from_values(vec![0.0, -0.1]).is_err());
        assert!(PotentialField::from_values(vec![f32::INFINITY]).is_err());
        assert!(PotentialField::from_values(vec![0.0, 2.0]).is_ok());
    }

    #[test]
    fn noise_is_small_and_seeded() {
        let a = PotentialField::new(100, 7);
        let b = PotentialField::new(100, 7);
        assert_eq!(a.potentials(), b.potentials());
        assert!(a.potentials().iter().all(|p| *p >= 0.0 && *p < POTENTIAL_NOISE));
    }

    #[test]
    fn exact_ties_go_to_lower_index() {
        let mut field = PotentialField::from_values(vec![1.0, 0.5, 0.5]).unwrap();
        assert_eq!(field.pick_min().unwrap(), 1);
    }

    #[test]
    fn center_gets_largest_increment_and_outside_is_unchanged() {
        let cloud = line_cloud(30, 0.1);
        let mut field = PotentialField::from_values(vec![0.0; 30]).unwrap();
        let center = cloud.position(10);
        let radius = 0.75;

        field.update(&cloud, center, radius).unwrap();

        let inside: Vec<usize> = cloud
            .radius_search(center, radius)
            .iter()
            .map(|n| n.index as usize)
            .collect();
        let center_gain = field.get(10).unwrap();
        assert!((center_gain - 1.0).abs() < 1e-6);
        for &i in &inside {
            assert!(field.get(i).unwrap() <= center_gain);
        }
        for i in (0..30).filter(|i| !inside.contains(i)) {
            assert_eq!(field.get(i).unwrap(), 0.0);
        }
    }

    #[test]
    fn sampled_region_is_avoided_next() {
        let cloud = line_cloud(50, 0.1);
        let mut field = PotentialField::new(50, 3);
        let first = field.pick_min().unwrap();
        field.update(&cloud, cloud.position(first), 0.9).unwrap();
        let second = field.pick_min().unwrap();
        let gap = (cloud.position(first)[0] - cloud.position(second)[0]).abs();
        assert!(gap >= 0.3 - 1e-6);
    }

    #[test]
    fn lazy_heap_agrees_with_brute_force() {
        let cloud = line_cloud(200, 0.05);
        let mut field = PotentialField::new(200, 11);
        for _ in 0..2_000 {
            let i = field.pick_min().unwrap();
            assert_eq!(i, brute_argmin(field.potentials()));
            field.update(&cloud, cloud.position(i), 0.6).unwrap();
        }
        assert!(field.potentials().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn size_mismatch_is_reported() {
        let cloud = line_cloud(5, 1.0);
        let mut field = PotentialField::new(4, 0);
        assert!(matches!(
            field.update(&cloud, [0.0; 3], 1.0),
            Err(SamplingError::FieldSizeMismatch { field: 4, cloud: 5 })
        ));
    }

    #[test]
    fn random_policy_stays_in_range() {
        let mut policy = RandomPolicy::new(10, 5);
        for _ in 0..100 {
            assert!(policy.pick().unwrap() < 10);
        }
        assert!(RandomPolicy::new(0, 5).pick().is_err());
    }
}
