/// One sampling epoch: the ordered stream of spheres cut into calibrated batches.
use log::{debug, info};
use serde::Serialize;

use crate::batch::{Batch, BatchAssembler};
use crate::calibration::{BatchCalibrator, CalibrationState};
use crate::cloud::PointCloud;
use crate::config::SamplingConfig;
use crate::error::{Result, SamplingError};
use crate::potential::{CoveragePolicy, PotentialField};
use crate::sphere::{Sphere, SphereSampler};

/// Distribution of per-point coverage counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageStats {
    pub points: usize,
    pub covered: usize,
    pub covered_fraction: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub coefficient_of_variation: f64,
    pub min: u32,
    pub max: u32,
}

impl CoverageStats {
    pub fn from_counts(counts: &[u32]) -> Self {
        let points = counts.len();
        if points == 0 {
            return Self {
                points: 0,
                covered: 0,
                covered_fraction: 0.0,
                mean: 0.0,
                std_dev: 0.0,
                coefficient_of_variation: 0.0,
                min: 0,
                max: 0,
            };
        }

        let n = points as f64;
        let covered = counts.iter().filter(|c| **c > 0).count();
        let mean = counts.iter().map(|c| *c as f64).sum::<f64>() / n;
        let variance = counts
            .iter()
            .map(|c| (*c as f64 - mean).powi(2))
            .sum::<f64>()
            / n;
        let std_dev = variance.sqrt();

        Self {
            points,
            covered,
            covered_fraction: covered as f64 / n,
            mean,
            std_dev,
            coefficient_of_variation: if mean > 0.0 { std_dev / mean } else { 0.0 },
            min: counts.iter().copied().min().unwrap_or(0),
            max: counts.iter().copied().max().unwrap_or(0),
        }
    }
}

/// How a coverage-bounded run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageOutcome {
    pub batches: usize,
    /// Every point reached the requested coverage.
    pub complete: bool,
}

/// The epoch is the single writer of its coverage policy. Every draw picks,
/// queries, and records before the next pick, so the stream of spheres is
/// deterministic for a given seed. Dropping the sampler abandons the epoch;
/// a partially filled batch is never returned.
pub struct EpochSampler<'a, P: CoveragePolicy = PotentialField> {
    cloud: &'a PointCloud,
    policy: P,
    sampler: SphereSampler,
    calibrator: BatchCalibrator,
    assembler: BatchAssembler,
    pending: Option<Sphere>,
    coverage: Vec<u32>,
    spheres_drawn: usize,
    batches_emitted: usize,
}

impl<'a> EpochSampler<'a, PotentialField> {
    /// Potential-guided epoch over `cloud` with every component built from `config`.
    pub fn from_config(cloud: &'a PointCloud, config: &SamplingConfig) -> Result<Self> {
        config.validate()?;
        let calibrator = BatchCalibrator::new(config.calibration())?;
        Self::with_calibrator(cloud, config, calibrator)
    }

    /// Like [`EpochSampler::from_config`] but continuing an existing controller,
    /// so batch-size calibration carries over between epochs.
    pub fn with_calibrator(
        cloud: &'a PointCloud,
        config: &SamplingConfig,
        calibrator: BatchCalibrator,
    ) -> Result<Self> {
        let mut sampler = SphereSampler::new(config.sphere_radius(), config.degenerate_retry_limit)?
            .with_filter(config.neighborhood_filter()?);
        if config.center_jitter_ratio > 0.0 {
            sampler = sampler.with_center_jitter(config.center_jitter_ratio, config.seed)?;
        }

        let field = PotentialField::new(cloud.len(), config.seed);
        info!(
            "Epoch over {} points: radius {:.3}, target {} points per batch",
            cloud.len(),
            config.sphere_radius(),
            config.target_batch_size
        );
        Self::new(cloud, field, sampler, calibrator)
    }
}

impl<'a, P: CoveragePolicy> EpochSampler<'a, P> {
    pub fn new(
        cloud: &'a PointCloud,
        policy: P,
        sampler: SphereSampler,
        calibrator: BatchCalibrator,
    ) -> Result<Self> {
        if policy.len() != cloud.len() {
            return Err(SamplingError::FieldSizeMismatch {
                field: policy.len(),
                cloud: cloud.len(),
            });
        }

        Ok(Self {
            cloud,
            policy,
            sampler,
            calibrator,
            assembler: BatchAssembler::new(),
            pending: None,
            coverage: vec![0; cloud.len()],
            spheres_drawn: 0,
            batches_emitted: 0,
        })
    }

    pub fn cloud(&self) -> &'a PointCloud {
        self.cloud
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn calibration_state(&self) -> &CalibrationState {
        self.calibrator.state()
    }

    pub fn max_points(&self) -> usize {
        self.calibrator.max_points()
    }

    pub fn spheres_drawn(&self) -> usize {
        self.spheres_drawn
    }

    pub fn batches_emitted(&self) -> usize {
        self.batches_emitted
    }

    /// A sphere drawn but deferred to the next batch.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// How many delivered spheres contained each point.
    pub fn coverage_counts(&self) -> &[u32] {
        &self.coverage
    }

    pub fn coverage_stats(&self) -> CoverageStats {
        CoverageStats::from_counts(&self.coverage)
    }

    /// Lowest coverage count over the cloud.
    pub fn min_coverage(&self) -> u32 {
        self.coverage.iter().copied().min().unwrap_or(0)
    }

    fn draw(&mut self) -> Result<Sphere> {
        let sphere = self.sampler.next_sphere(self.cloud, &mut self.policy)?;
        self.spheres_drawn += 1;
        Ok(sphere)
    }

    /// Draw spheres until the next one would overflow the batch limit, then close.
    ///
    /// The overflowing sphere is deferred whole. An empty batch takes any sphere,
    /// and one that alone reaches the limit closes the batch on its own.
    pub fn next_batch(&mut self) -> Result<Batch> {
        let max_points = self.calibrator.max_points();
        let mut spheres = Vec::new();
        let mut total = 0usize;

        loop {
            let sphere = match self.pending.take() {
                Some(sphere) => sphere,
                None => self.draw()?,
            };

            if !self.calibrator.admits(total, sphere.len()) {
                self.pending = Some(sphere);
                break;
            }

            total += sphere.len();
            spheres.push(sphere);

            if self.calibrator.is_full(total) {
                break;
            }
        }

        let batch = self.assembler.assemble(self.cloud, &spheres, max_points);
        for &i in &batch.point_indices {
            self.coverage[i as usize] += 1;
        }

        let update = self.calibrator.observe(batch.len());
        self.batches_emitted += 1;
        debug!(
            "Batch {}: {} spheres, {} points, limit {} -> {}",
            self.batches_emitted,
            batch.sphere_count(),
            batch.len(),
            update.previous_max_points,
            update.max_points
        );

        Ok(batch)
    }

    /// Emit batches to `consume` until every point is covered `min_coverage` times
    /// or `max_batches` batches have been produced.
    pub fn run_until_covered<F>(
        &mut self,
        min_coverage: u32,
        max_batches: usize,
        mut consume: F,
    ) -> Result<CoverageOutcome>
    where
        F: FnMut(Batch) -> Result<()>,
    {
        let mut batches = 0;
        while self.min_coverage() < min_coverage && batches < max_batches {
            let batch = self.next_batch()?;
            consume(batch)?;
            batches += 1;
        }

        let complete = self.min_coverage() >= min_coverage;
        info!(
            "Coverage run finished after {} batches: min coverage {} (wanted {})",
            batches,
            self.min_coverage(),
            min_coverage
        );
        Ok(CoverageOutcome { batches, complete })
    }

    /// Hand back the controller so the next epoch starts from its state.
    pub fn into_calibrator(self) -> BatchCalibrator {
        self.calibrator
    }
}
