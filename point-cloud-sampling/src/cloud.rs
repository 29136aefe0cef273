/// Immutable point clouds with a per-cloud spatial index.
use serde::{Deserialize, Serialize};

use crate::bounds::PointCloudBounds;
use crate::error::{Result, SamplingError};
use crate::spatial_index::{Neighbor, SpatialGrid};

/// Ordered list of named scalar channels carried by every point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub channels: Vec<String>,
}

impl FeatureSchema {
    pub fn new<S: Into<String>>(channels: impl IntoIterator<Item = S>) -> Self {
        Self {
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    /// Schema without any channel, positions only.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn dim(&self) -> usize {
        self.channels.len()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c == name)
    }
}

/// A single point as handed over by a loader.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub position: [f32; 3],
    pub features: Vec<f32>,
}

/// Columnar point storage plus the spatial index built over it.
///
/// Positions, features, and the index are fixed at construction. Operations
/// that need a different index scale produce a new cloud through [`PointCloud::reindex`].
#[derive(Debug, Clone)]
pub struct PointCloud {
    positions: Vec<[f32; 3]>,
    features: Vec<f32>,
    schema: FeatureSchema,
    bounds: PointCloudBounds,
    index: SpatialGrid,
}

impl PointCloud {
    /// Build a cloud with an index cell sized for roughly one point per cell.
    pub fn new(
        positions: Vec<[f32; 3]>,
        features: Vec<f32>,
        schema: FeatureSchema,
    ) -> Result<Self> {
        let bounds = PointCloudBounds::from_positions(&positions);
        let cell_size = default_cell_size(&bounds, positions.len());
        Self::with_index_cell_size(positions, features, schema, cell_size)
    }

    /// Build a cloud whose index uses an explicit cell size.
    pub fn with_index_cell_size(
        positions: Vec<[f32; 3]>,
        features: Vec<f32>,
        schema: FeatureSchema,
        cell_size: f32,
    ) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SamplingError::config(format!(
                "index cell size must be positive and finite, got {cell_size}"
            )));
        }

        let expected = positions.len() * schema.dim();
        if features.len() != expected {
            return Err(SamplingError::FeatureMismatch {
                expected,
                got: features.len(),
            });
        }

        if let Some(bad) = positions.iter().position(|p| p.iter().any(|c| !c.is_finite())) {
            return Err(SamplingError::config(format!(
                "point {bad} has a non-finite coordinate"
            )));
        }

        let bounds = PointCloudBounds::from_positions(&positions);
        let index = SpatialGrid::build(&positions, cell_size);

        Ok(Self {
            positions,
            features,
            schema,
            bounds,
            index,
        })
    }

    /// Build a cloud from individual points; every point must match the schema.
    pub fn from_points(points: Vec<Point>, schema: FeatureSchema) -> Result<Self> {
        let dim = schema.dim();
        let mut positions = Vec::with_capacity(points.len());
        let mut features = Vec::with_capacity(points.len() * dim);

        for point in points {
            if point.features.len() != dim {
                return Err(SamplingError::FeatureMismatch {
                    expected: dim,
                    got: point.features.len(),
                });
            }
            positions.push(point.position);
            features.extend_from_slice(&point.features);
        }

        Self::new(positions, features, schema)
    }

    /// Same points, index rebuilt for queries around `cell_size`.
    pub fn reindex(self, cell_size: f32) -> Result<Self> {
        Self::with_index_cell_size(self.positions, self.features, self.schema, cell_size)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn feature_dim(&self) -> usize {
        self.schema.dim()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn bounds(&self) -> &PointCloudBounds {
        &self.bounds
    }

    pub fn index_cell_size(&self) -> f32 {
        self.index.cell_size()
    }

    pub fn position(&self, i: usize) -> [f32; 3] {
        self.positions[i]
    }

    /// Feature row of point `i`.
    pub fn point_features(&self, i: usize) -> &[f32] {
        let dim = self.schema.dim();
        &self.features[i * dim..(i + 1) * dim]
    }

    pub fn point(&self, i: usize) -> Point {
        Point {
            position: self.positions[i],
            features: self.point_features(i).to_vec(),
        }
    }

    /// Points strictly within `radius` of `center`, nearest first.
    pub fn radius_search(&self, center: [f32; 3], radius: f32) -> Vec<Neighbor> {
        self.index.radius_search(&self.positions, center, radius)
    }
}

fn default_cell_size(bounds: &PointCloudBounds, len: usize) -> f32 {
    let (dx, dy, dz) = bounds.dimensions();
    let extent = dx.max(dy).max(dz);
    if len == 0 || !(extent > 0.0) {
        return 1.0;
    }
    (extent / (len as f32).cbrt()).max(f32::EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_feature_buffer_of_wrong_length() {
        let schema = FeatureSchema::new(["intensity", "bias"]);
        let err = PointCloud::new(vec![[0.0; 3], [1.0; 3]], vec![0.5, 1.0, 0.2], schema)
            .unwrap_err();
        assert!(matches!(
            err,
            SamplingError::FeatureMismatch {
                expected: 4,
                got: 3
            }
        ));
    }

    #[test]
    fn from_points_keeps_order_and_rows() {
        let schema = FeatureSchema::new(["intensity"]);
        let cloud = PointCloud::from_points(
            vec![
                Point {
                    position: [1.0, 2.0, 3.0],
                    features: vec![0.25],
                },
                Point {
                    position: [4.0, 5.0, 6.0],
                    features: vec![0.75],
                },
            ],
            schema,
        )
        .unwrap();

        assert_eq!(cloud.len(), 2);
        assert_eq!(cloud.point_features(1), &[0.75]);
        assert_eq!(cloud.point(0).position, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn reindex_preserves_query_results() {
        let positions: Vec<[f32; 3]> = (0..200)
            .map(|i| [(i % 10) as f32 * 0.1, (i / 10) as f32 * 0.1, 0.0])
            .collect();
        let cloud = PointCloud::new(positions, Vec::new(), FeatureSchema::empty()).unwrap();
        let before = cloud.radius_search([0.5, 0.5, 0.0], 0.35);
        let cloud = cloud.reindex(0.05).unwrap();
        assert_eq!(cloud.index_cell_size(), 0.05);
        assert_eq!(cloud.radius_search([0.5, 0.5, 0.0], 0.35), before);
    }

    #[test]
    fn empty_cloud_is_valid() {
        let cloud = PointCloud::new(Vec::new(), Vec::new(), FeatureSchema::new(["bias"])).unwrap();
        assert!(cloud.is_empty());
        assert!(cloud.radius_search([0.0; 3], 1.0).is_empty());
    }
}
