/// Potential-guided spherical region sampling.
use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::cloud::PointCloud;
use crate::error::{Result, SamplingError};
use crate::neighborhood::NeighborhoodFilter;
use crate::potential::CoveragePolicy;

/// One sampled region: the points within `radius` of `center`, nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    pub center: [f32; 3],
    pub radius: f32,
    /// Cloud indices, nearest first, after optional filtering.
    pub indices: Vec<u32>,
    /// Squared distances matching `indices`.
    pub dist_sq: Vec<f32>,
}

impl Sphere {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Draws spheres whose centers come from a [`CoveragePolicy`].
#[derive(Debug, Clone)]
pub struct SphereSampler {
    radius: f32,
    retry_limit: usize,
    filter: Option<NeighborhoodFilter>,
    jitter: Option<(f32, ChaCha8Rng)>,
}

impl SphereSampler {
    /// `retry_limit` bounds the redraws spent on empty queries.
    pub fn new(radius: f32, retry_limit: usize) -> Result<Self> {
        if !(radius.is_finite() && radius > 0.0) {
            return Err(SamplingError::config(format!(
                "sphere radius must be positive and finite, got {radius}"
            )));
        }
        Ok(Self {
            radius,
            retry_limit,
            filter: None,
            jitter: None,
        })
    }

    /// Truncate every sphere to its nearest retained fraction.
    pub fn with_filter(mut self, filter: NeighborhoodFilter) -> Self {
        self.filter = (!filter.is_disabled()).then_some(filter);
        self
    }

    /// Offset every center by up to `ratio * radius` along each axis.
    pub fn with_center_jitter(mut self, ratio: f32, seed: u64) -> Result<Self> {
        if !(ratio.is_finite() && (0.0..1.0).contains(&ratio)) {
            return Err(SamplingError::config(format!(
                "center jitter ratio must lie in [0, 1), got {ratio}"
            )));
        }
        self.jitter = (ratio > 0.0).then(|| (ratio * self.radius, ChaCha8Rng::seed_from_u64(seed)));
        Ok(self)
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Pick, query, record, then filter. The policy sees each draw before the next pick.
    pub fn next_sphere<P: CoveragePolicy>(
        &mut self,
        cloud: &PointCloud,
        policy: &mut P,
    ) -> Result<Sphere> {
        if policy.len() != cloud.len() {
            return Err(SamplingError::FieldSizeMismatch {
                field: policy.len(),
                cloud: cloud.len(),
            });
        }

        for attempt in 0..=self.retry_limit {
            let picked = policy.pick()?;
            let center = self.center_for(cloud.position(picked));
            let neighbors = cloud.radius_search(center, self.radius);

            if neighbors.is_empty() {
                // Account for the picked point so the next pick moves elsewhere.
                let own = cloud.radius_search(cloud.position(picked), self.radius);
                policy.record(&own, self.radius);
                warn!(
                    "Empty sphere around point {} (attempt {}/{})",
                    picked,
                    attempt + 1,
                    self.retry_limit + 1
                );
                continue;
            }

            policy.record(&neighbors, self.radius);

            let neighbors = match &self.filter {
                Some(filter) => filter.apply_sorted(neighbors),
                None => neighbors,
            };

            debug!(
                "Sphere at point {} holds {} points",
                picked,
                neighbors.len()
            );

            let (indices, dist_sq) = neighbors.iter().map(|n| (n.index, n.dist_sq)).unzip();
            return Ok(Sphere {
                center,
                radius: self.radius,
                indices,
                dist_sq,
            });
        }

        Err(SamplingError::DegenerateSphere {
            attempts: self.retry_limit + 1,
        })
    }

    fn center_for(&mut self, p: [f32; 3]) -> [f32; 3] {
        match &mut self.jitter {
            Some((amplitude, rng)) => {
                let a = *amplitude;
                [
                    p[0] + rng.random_range(-a..a),
                    p[1] + rng.random_range(-a..a),
                    p[2] + rng.random_range(-a..a),
                ]
            }
            None => p,
        }
    }
}
