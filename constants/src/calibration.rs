/// Target number of points per stacked batch
pub const DEFAULT_TARGET_BATCH_SIZE: usize = 10_000;

/// Proportional controller gain (points of correction per point of error)
pub const DEFAULT_GAIN: f64 = 0.5;

/// Lowest batch limit the controller may reach
pub const DEFAULT_MAX_POINTS_FLOOR: usize = 1_000;

/// Highest batch limit the controller may reach
pub const DEFAULT_MAX_POINTS_CEILING: usize = 100_000;

/// Consecutive pinned batches before divergence is reported
pub const DEFAULT_DIVERGENCE_THRESHOLD: usize = 20;

/// Weight of the newest batch in the running average batch size
pub const BATCH_SIZE_SMOOTHING: f64 = 0.1;
