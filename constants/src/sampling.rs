/// Base grid subsampling cell size in metres (`dl_0`)
pub const DEFAULT_DL_0: f32 = 0.06;

/// Number of network layers, each subsampled at `dl_0 * multiplier^i`
pub const DEFAULT_NUM_LAYERS: usize = 5;

/// Cell size growth between consecutive layers
pub const DEFAULT_LAYER_MULTIPLIER: f32 = 2.0;

/// Sphere radius expressed in base cells when no explicit radius is given
pub const DEFAULT_SPHERE_RADIUS_CELLS: f32 = 50.0;

/// Neighbor query radius per layer, in layer cells (rho)
pub const DEFAULT_NEIGHBOR_RADIUS_RATIO: f32 = 2.5;

/// Kernel point influence (sigma) per layer, in layer cells
pub const DEFAULT_KERNEL_SIGMA_RATIO: f32 = 1.0;

/// Kernel influence radius in sigmas for rigid kernels
pub const DEFAULT_KERNEL_EXTENT_SIGMAS: f32 = 2.5;

/// Fraction of nearest neighbors kept per query
pub const DEFAULT_RETENTION_FRACTION: f64 = 0.85;

/// Upper bound of the noise used to seed pick potentials
pub const POTENTIAL_NOISE: f32 = 1e-3;

/// Potential reach as a fraction of the sphere radius
pub const POTENTIAL_REACH_DIVISOR: f32 = 3.0;

/// Redraws allowed when a sphere query comes back empty
pub const DEFAULT_DEGENERATE_RETRY_LIMIT: usize = 16;

/// Minimum votes per point before inference predictions are final
pub const DEFAULT_MIN_VOTE_COVERAGE: u32 = 3;

/// Default seed for potential noise and center jitter
pub const DEFAULT_SEED: u64 = 42;

/// Spatial index cell size as a fraction of the query radius
pub const INDEX_CELLS_PER_RADIUS: f32 = 2.0;

/// Upper bound on batches in one coverage run
pub const DEFAULT_MAX_BATCHES: usize = 5_000;
