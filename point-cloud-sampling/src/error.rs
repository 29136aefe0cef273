/// Error types for the sampling engine.
use thiserror::Error;

/// Errors raised while building clouds, sampling spheres, or assembling batches.
#[derive(Error, Debug)]
pub enum SamplingError {
    /// A configuration value is out of its accepted range.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        /// Which value was rejected and why.
        message: String,
    },

    /// A pick was requested from a field with no points.
    #[error("cannot pick from an empty potential field")]
    EmptyField,

    /// Every redraw of a sphere came back without points.
    #[error("sphere query returned no points after {attempts} attempts")]
    DegenerateSphere {
        /// Number of draws attempted before giving up.
        attempts: usize,
    },

    /// The coverage policy and the cloud disagree on the point count.
    #[error("potential field holds {field} entries but the cloud has {cloud} points")]
    FieldSizeMismatch { field: usize, cloud: usize },

    /// A feature buffer does not match the declared schema.
    #[error("feature buffer holds {got} values, expected {expected}")]
    FeatureMismatch { expected: usize, got: usize },

    /// A per-point array has the wrong shape.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),
}

impl SamplingError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for sampling operations.
pub type Result<T> = std::result::Result<T, SamplingError>;
