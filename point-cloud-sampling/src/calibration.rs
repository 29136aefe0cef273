/// Proportional control of the per-batch point limit.
use constants::calibration::BATCH_SIZE_SMOOTHING;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SamplingError};

/// Controller settings, validated once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub target_batch_size: usize,
    pub gain: f64,
    pub floor: usize,
    pub ceiling: usize,
    pub initial_max_points: usize,
    /// Consecutive pinned batches before divergence is reported.
    pub divergence_threshold: usize,
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.target_batch_size == 0 {
            return Err(SamplingError::config("target batch size must be positive"));
        }
        if !(self.gain.is_finite() && self.gain > 0.0 && self.gain <= 1.0) {
            return Err(SamplingError::config(format!(
                "controller gain must lie in (0, 1], got {}",
                self.gain
            )));
        }
        if self.floor == 0 || self.floor > self.ceiling {
            return Err(SamplingError::config(format!(
                "max_points band [{}, {}] is empty or starts at zero",
                self.floor, self.ceiling
            )));
        }
        if !(self.floor..=self.ceiling).contains(&self.initial_max_points) {
            return Err(SamplingError::config(format!(
                "initial max_points {} lies outside [{}, {}]",
                self.initial_max_points, self.floor, self.ceiling
            )));
        }
        if self.divergence_threshold == 0 {
            return Err(SamplingError::config("divergence threshold must be positive"));
        }
        Ok(())
    }
}

/// Running controller state carried across the batches of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    pub max_points: f64,
    pub average_batch_size: f64,
    pub target_batch_size: usize,
    pub gain: f64,
    pub batches_observed: u64,
    pub pinned_streak: usize,
}

/// Outcome of one observe → correct → clamp step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationUpdate {
    pub previous_max_points: usize,
    pub max_points: usize,
    /// `target - realized`, positive when the batch came out small.
    pub error: f64,
    pub clamped: bool,
    /// Set on the batch where the pinned streak reaches the threshold.
    pub diverged: bool,
}

/// Spheres vary wildly in size, so batches are bounded by a point count
/// rather than a sphere count. The calibrator observes every closed batch,
/// corrects the limit proportionally to the error against the target, and
/// clamps it into a configured band.
#[derive(Debug, Clone)]
pub struct BatchCalibrator {
    config: CalibrationConfig,
    state: CalibrationState,
}

impl BatchCalibrator {
    pub fn new(config: CalibrationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: CalibrationState {
                max_points: config.initial_max_points as f64,
                average_batch_size: config.target_batch_size as f64,
                target_batch_size: config.target_batch_size,
                gain: config.gain,
                batches_observed: 0,
                pinned_streak: 0,
            },
            config,
        })
    }

    /// Resume from a checkpointed state under the given settings.
    pub fn from_state(config: CalibrationConfig, state: CalibrationState) -> Result<Self> {
        config.validate()?;
        let mut calibrator = Self::new(config)?;
        calibrator.state = CalibrationState {
            max_points: state
                .max_points
                .clamp(config.floor as f64, config.ceiling as f64),
            target_batch_size: config.target_batch_size,
            gain: config.gain,
            ..state
        };
        Ok(calibrator)
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn state(&self) -> &CalibrationState {
        &self.state
    }

    /// Current limit on the points accepted into one batch.
    pub fn max_points(&self) -> usize {
        self.state.max_points.round() as usize
    }

    /// Whether a sphere of `sphere_len` may join a batch already holding `current_points`.
    /// An empty batch always accepts, so an oversized sphere is never split or starved.
    pub fn admits(&self, current_points: usize, sphere_len: usize) -> bool {
        current_points == 0 || current_points + sphere_len <= self.max_points()
    }

    /// Whether a batch holding `current_points` should close without another draw.
    pub fn is_full(&self, current_points: usize) -> bool {
        current_points >= self.max_points()
    }

    /// Feed the realized size of a closed batch.
    pub fn observe(&mut self, realized: usize) -> CalibrationUpdate {
        let previous = self.max_points();
        let floor = self.config.floor as f64;
        let ceiling = self.config.ceiling as f64;

        let error = self.config.target_batch_size as f64 - realized as f64;
        let corrected = self.state.max_points + self.config.gain * error;
        let clamped_value = corrected.clamp(floor, ceiling);

        self.state.max_points = clamped_value;
        self.state.average_batch_size = (1.0 - BATCH_SIZE_SMOOTHING)
            * self.state.average_batch_size
            + BATCH_SIZE_SMOOTHING * realized as f64;
        self.state.batches_observed += 1;

        // Only a band edge that still holds back the correction counts as pinned.
        let pinned =
            (clamped_value <= floor && error < 0.0) || (clamped_value >= ceiling && error > 0.0);
        self.state.pinned_streak = if pinned {
            self.state.pinned_streak + 1
        } else {
            0
        };

        let diverged = self.state.pinned_streak == self.config.divergence_threshold;
        if diverged {
            warn!(
                "Batch limit pinned at {} for {} consecutive batches (target {}, last batch {})",
                self.max_points(),
                self.state.pinned_streak,
                self.config.target_batch_size,
                realized
            );
        }

        debug!(
            "Calibration: realized {} -> max_points {} (was {})",
            realized,
            self.max_points(),
            previous
        );

        CalibrationUpdate {
            previous_max_points: previous,
            max_points: self.max_points(),
            error,
            clamped: corrected != clamped_value,
            diverged,
        }
    }
}
