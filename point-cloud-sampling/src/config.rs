/// Sampling configuration surface, loadable from JSON.
use std::fs;
use std::path::Path;

use constants::calibration::{
    DEFAULT_DIVERGENCE_THRESHOLD, DEFAULT_GAIN, DEFAULT_MAX_POINTS_CEILING,
    DEFAULT_MAX_POINTS_FLOOR, DEFAULT_TARGET_BATCH_SIZE,
};
use constants::sampling::{
    DEFAULT_DEGENERATE_RETRY_LIMIT, DEFAULT_DL_0, DEFAULT_KERNEL_EXTENT_SIGMAS,
    DEFAULT_KERNEL_SIGMA_RATIO, DEFAULT_LAYER_MULTIPLIER, DEFAULT_MAX_BATCHES,
    DEFAULT_MIN_VOTE_COVERAGE, DEFAULT_NEIGHBOR_RADIUS_RATIO, DEFAULT_NUM_LAYERS,
    DEFAULT_RETENTION_FRACTION, DEFAULT_SEED, DEFAULT_SPHERE_RADIUS_CELLS,
};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationConfig;
use crate::error::{Result, SamplingError};
use crate::neighborhood::NeighborhoodFilter;

/// Every recognised option. Missing JSON fields fall back to the shared defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    /// Base grid subsampling cell size.
    pub dl_0: f32,
    pub num_layers: usize,
    /// Cell size growth between layers.
    pub layer_multiplier: f32,
    /// Sampling sphere radius; `50 * dl_0` when absent.
    pub sphere_radius: Option<f32>,
    /// Neighbor query radius per layer in layer cells (rho).
    pub neighbor_radius_ratio: f32,
    /// Kernel influence sigma per layer in layer cells.
    pub kernel_sigma_ratio: f32,
    /// Kernel influence radius in sigmas.
    pub kernel_extent_sigmas: f32,
    pub retention_fraction: f64,
    pub target_batch_size: usize,
    pub gain: f64,
    pub max_points_floor: usize,
    pub max_points_ceiling: usize,
    /// Starting batch limit; the target clamped into the band when absent.
    pub initial_max_points: Option<usize>,
    pub divergence_threshold: usize,
    pub degenerate_retry_limit: usize,
    /// Center jitter as a fraction of the sphere radius, 0 disables it.
    pub center_jitter_ratio: f32,
    /// Votes every point needs before inference predictions are final.
    pub min_vote_coverage: u32,
    /// Stop a coverage run after this many batches even if it is incomplete.
    pub max_batches: usize,
    pub seed: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            dl_0: DEFAULT_DL_0,
            num_layers: DEFAULT_NUM_LAYERS,
            layer_multiplier: DEFAULT_LAYER_MULTIPLIER,
            sphere_radius: None,
            neighbor_radius_ratio: DEFAULT_NEIGHBOR_RADIUS_RATIO,
            kernel_sigma_ratio: DEFAULT_KERNEL_SIGMA_RATIO,
            kernel_extent_sigmas: DEFAULT_KERNEL_EXTENT_SIGMAS,
            retention_fraction: DEFAULT_RETENTION_FRACTION,
            target_batch_size: DEFAULT_TARGET_BATCH_SIZE,
            gain: DEFAULT_GAIN,
            max_points_floor: DEFAULT_MAX_POINTS_FLOOR,
            max_points_ceiling: DEFAULT_MAX_POINTS_CEILING,
            initial_max_points: None,
            divergence_threshold: DEFAULT_DIVERGENCE_THRESHOLD,
            degenerate_retry_limit: DEFAULT_DEGENERATE_RETRY_LIMIT,
            center_jitter_ratio: 0.0,
            min_vote_coverage: DEFAULT_MIN_VOTE_COVERAGE,
            max_batches: DEFAULT_MAX_BATCHES,
            seed: DEFAULT_SEED,
        }
    }
}

/// Derived sizes for one network layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerSpec {
    pub layer: usize,
    pub dl: f32,
    pub neighbor_radius: f32,
    pub kernel_sigma: f32,
    pub kernel_influence_radius: f32,
}

impl SamplingConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Fail fast on any value that cannot drive a run.
    pub fn validate(&self) -> Result<()> {
        positive("dl_0", self.dl_0)?;
        positive("sphere_radius", self.sphere_radius())?;
        positive("neighbor_radius_ratio", self.neighbor_radius_ratio)?;
        positive("kernel_sigma_ratio", self.kernel_sigma_ratio)?;
        positive("kernel_extent_sigmas", self.kernel_extent_sigmas)?;

        if self.num_layers == 0 {
            return Err(SamplingError::config("num_layers must be at least 1"));
        }
        if !(self.layer_multiplier.is_finite() && self.layer_multiplier >= 1.0) {
            return Err(SamplingError::config(format!(
                "layer_multiplier must be finite and at least 1, got {}",
                self.layer_multiplier
            )));
        }
        if !(self.center_jitter_ratio.is_finite() && (0.0..1.0).contains(&self.center_jitter_ratio))
        {
            return Err(SamplingError::config(format!(
                "center_jitter_ratio must lie in [0, 1), got {}",
                self.center_jitter_ratio
            )));
        }
        if self.min_vote_coverage == 0 {
            return Err(SamplingError::config("min_vote_coverage must be at least 1"));
        }
        if self.max_batches == 0 {
            return Err(SamplingError::config("max_batches must be at least 1"));
        }

        NeighborhoodFilter::new(self.retention_fraction)?;
        self.calibration().validate()
    }

    pub fn sphere_radius(&self) -> f32 {
        self.sphere_radius
            .unwrap_or(DEFAULT_SPHERE_RADIUS_CELLS * self.dl_0)
    }

    pub fn neighborhood_filter(&self) -> Result<NeighborhoodFilter> {
        NeighborhoodFilter::new(self.retention_fraction)
    }

    pub fn calibration(&self) -> CalibrationConfig {
        let initial = self.initial_max_points.unwrap_or_else(|| {
            self.target_batch_size
                .clamp(self.max_points_floor, self.max_points_ceiling.max(self.max_points_floor))
        });
        CalibrationConfig {
            target_batch_size: self.target_batch_size,
            gain: self.gain,
            floor: self.max_points_floor,
            ceiling: self.max_points_ceiling,
            initial_max_points: initial,
            divergence_threshold: self.divergence_threshold,
        }
    }

    /// Cell size of layer `i`: `dl_0 * multiplier^i`.
    pub fn layer_dl(&self, layer: usize) -> f32 {
        self.dl_0 * self.layer_multiplier.powi(layer as i32)
    }

    /// Sizes of every layer. Neighbor radius and kernel influence are independent settings.
    pub fn layer_specs(&self) -> Vec<LayerSpec> {
        (0..self.num_layers)
            .map(|layer| {
                let dl = self.layer_dl(layer);
                let kernel_sigma = self.kernel_sigma_ratio * dl;
                LayerSpec {
                    layer,
                    dl,
                    neighbor_radius: self.neighbor_radius_ratio * dl,
                    kernel_sigma,
                    kernel_influence_radius: self.kernel_extent_sigmas * kernel_sigma,
                }
            })
            .collect()
    }
}

fn positive(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SamplingError::config(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn defaults_are_valid() {
        let config = SamplingConfig::default();
        config.validate().unwrap();
        assert_relative_eq!(config.sphere_radius(), 50.0 * DEFAULT_DL_0, epsilon = 1e-6);
        assert_eq!(config.calibration().initial_max_points, DEFAULT_TARGET_BATCH_SIZE);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SamplingConfig::from_json_str(
            r#"{ "dl_0": 0.1, "retention_fraction": 0.9, "target_batch_size": 2000 }"#,
        )
        .unwrap();
        assert_eq!(config.dl_0, 0.1);
        assert_eq!(config.retention_fraction, 0.9);
        assert_eq!(config.num_layers, DEFAULT_NUM_LAYERS);
        assert_relative_eq!(config.sphere_radius(), 5.0, epsilon = 1e-6);
    }

    #[test]
    fn invalid_values_fail_fast() {
        for json in [
            r#"{ "dl_0": 0.0 }"#,
            r#"{ "dl_0": -0.5 }"#,
            r#"{ "sphere_radius": 0.0 }"#,
            r#"{ "retention_fraction": 0.0 }"#,
            r#"{ "retention_fraction": 1.2 }"#,
            r#"{ "gain": 0.0 }"#,
            r#"{ "gain": 3.0 }"#,
            r#"{ "max_points_floor": 10, "max_points_ceiling": 5 }"#,
            r#"{ "num_layers": 0 }"#,
        ] {
            let err = SamplingConfig::from_json_str(json).unwrap_err();
            assert!(
                matches!(err, SamplingError::InvalidConfiguration { .. }),
                "{json}: {err}"
            );
        }
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = SamplingConfig::from_json_str(r#"{ "radius": 2.0 }"#).unwrap_err();
        assert!(matches!(err, SamplingError::Json(_)));
    }

    #[test]
    fn layers_double_and_keep_radii_independent() {
        let config = SamplingConfig {
            dl_0: 0.1,
            num_layers: 3,
            neighbor_radius_ratio: 2.5,
            kernel_sigma_ratio: 1.2,
            kernel_extent_sigmas: 2.5,
            ..SamplingConfig::default()
        };
        let specs = config.layer_specs();
        assert_eq!(specs.len(), 3);
        assert_relative_eq!(specs[2].dl, 0.4, epsilon = 1e-6);
        assert_relative_eq!(specs[1].neighbor_radius, 0.5, epsilon = 1e-6);
        assert_relative_eq!(specs[1].kernel_influence_radius, 0.6, epsilon = 1e-6);
    }

    #[test]
    fn json_round_trips_through_pretty_output() {
        let config = SamplingConfig {
            sphere_radius: Some(1.5),
            initial_max_points: Some(4_000),
            ..SamplingConfig::default()
        };
        let restored = SamplingConfig::from_json_str(&config.to_json_pretty().unwrap()).unwrap();
        assert_eq!(restored, config);
    }
}
