/// Sampling and batching engine for large point clouds
pub mod batch;
pub mod bounds;
pub mod calibration;
pub mod cloud;
pub mod config;
pub mod epoch;
pub mod error;
pub mod laz;
pub mod neighborhood;
pub mod pipeline;
pub mod potential;
mod progress;
pub mod report;
pub mod spatial_index;
pub mod sphere;
pub mod stacked;
pub mod subsampling;
pub mod voting;

pub use batch::{Batch, BatchAssembler};
pub use calibration::{BatchCalibrator, CalibrationConfig, CalibrationState};
pub use cloud::{FeatureSchema, Point, PointCloud};
pub use config::SamplingConfig;
pub use epoch::EpochSampler;
pub use error::{Result, SamplingError};
pub use neighborhood::NeighborhoodFilter;
pub use potential::{CoveragePolicy, PotentialField, RandomPolicy};
pub use sphere::{Sphere, SphereSampler};
pub use subsampling::{GridAccumulator, GridSubsampler};
pub use voting::VoteAccumulator;
