/// Stacked batches: variable-length spheres concatenated with length bookkeeping
use rayon::prelude::*;
use serde::Serialize;

use crate::cloud::PointCloud;
use crate::sphere::Sphere;

/// Spheres stacked into contiguous arrays in draw order.
/// Immutable once handed to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub positions: Vec<[f32; 3]>,
    /// Row-major, `feature_dim` values per point.
    pub features: Vec<f32>,
    pub feature_dim: usize,
    /// Source cloud index of every stacked point.
    pub point_indices: Vec<u32>,
    /// Points contributed by each sphere.
    pub lengths: Vec<usize>,
    pub centers: Vec<[f32; 3]>,
    pub radii: Vec<f32>,
    /// Batch limit in force when the batch was closed.
    pub max_points: usize,
}

/// Borrowed view of one sphere inside a batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereSlice<'a> {
    pub positions: &'a [[f32; 3]],
    pub features: &'a [f32],
    pub point_indices: &'a [u32],
    pub center: [f32; 3],
    pub radius: f32,
}

/// Per-batch figures kept for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchSummary {
    pub spheres: usize,
    pub points: usize,
    pub max_points: usize,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn sphere_count(&self) -> usize {
        self.lengths.len()
    }

    /// Start offset of every sphere plus the total length.
    pub fn offsets(&self) -> Vec<usize> {
        let mut offsets = Vec::with_capacity(self.lengths.len() + 1);
        let mut acc = 0;
        offsets.push(acc);
        for len in &self.lengths {
            acc += len;
            offsets.push(acc);
        }
        offsets
    }

    /// Slice sphere `i` back out of the stacked arrays.
    pub fn sphere(&self, i: usize) -> Option<SphereSlice<'_>> {
        if i >= self.lengths.len() {
            return None;
        }
        let start: usize = self.lengths[..i].iter().sum();
        Some(self.slice(i, start, start + self.lengths[i]))
    }

    /// Every sphere in draw order.
    pub fn unstack(&self) -> Vec<SphereSlice<'_>> {
        self.offsets()
            .windows(2)
            .enumerate()
            .map(|(i, w)| self.slice(i, w[0], w[1]))
            .collect()
    }

    fn slice(&self, i: usize, start: usize, end: usize) -> SphereSlice<'_> {
        let dim = self.feature_dim;
        SphereSlice {
            positions: &self.positions[start..end],
            features: &self.features[start * dim..end * dim],
            point_indices: &self.point_indices[start..end],
            center: self.centers[i],
            radius: self.radii[i],
        }
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            spheres: self.sphere_count(),
            points: self.len(),
            max_points: self.max_points,
        }
    }
}

/// Gathers sphere points from the cloud into one [`Batch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchAssembler;

impl BatchAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Stack `spheres` in order. Per-sphere gathers run in parallel; the output
    /// order is the draw order.
    pub fn assemble(&self, cloud: &PointCloud, spheres: &[Sphere], max_points: usize) -> Batch {
        let dim = cloud.feature_dim();

        let gathered: Vec<(Vec<[f32; 3]>, Vec<f32>)> = spheres
            .par_iter()
            .map(|sphere| {
                let positions = sphere
                    .indices
                    .iter()
                    .map(|&i| cloud.position(i as usize))
                    .collect();
                let mut features = Vec::with_capacity(sphere.len() * dim);
                for &i in &sphere.indices {
                    features.extend_from_slice(cloud.point_features(i as usize));
                }
                (positions, features)
            })
            .collect();

        let total: usize = spheres.iter().map(Sphere::len).sum();
        let mut batch = Batch {
            positions: Vec::with_capacity(total),
            features: Vec::with_capacity(total * dim),
            feature_dim: dim,
            point_indices: Vec::with_capacity(total),
            lengths: Vec::with_capacity(spheres.len()),
            centers: Vec::with_capacity(spheres.len()),
            radii: Vec::with_capacity(spheres.len()),
            max_points,
        };

        for (sphere, (positions, features)) in spheres.iter().zip(gathered) {
            batch.positions.extend(positions);
            batch.features.extend(features);
            batch.point_indices.extend_from_slice(&sphere.indices);
            batch.lengths.push(sphere.len());
            batch.centers.push(sphere.center);
            batch.radii.push(sphere.radius);
        }

        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::FeatureSchema;

    fn cloud() -> PointCloud {
        let positions: Vec<[f32; 3]> = (0..20).map(|i| [i as f32, 0.0, 0.0]).collect();
        let features = (0..20).flat_map(|i| [i as f32, -(i as f32)]).collect();
        PointCloud::new(positions, features, FeatureSchema::new(["a", "b"])).unwrap()
    }

    fn sphere(center: f32, indices: Vec<u32>) -> Sphere {
        let dist_sq = indices
            .iter()
            .map(|&i| (i as f32 - center).powi(2))
            .collect();
        Sphere {
            center: [center, 0.0, 0.0],
            radius: 3.0,
            indices,
            dist_sq,
        }
    }

    #[test]
    fn unstack_reproduces_every_sphere() {
        let cloud = cloud();
        let spheres = vec![
            sphere(5.0, vec![5, 4, 6, 3]),
            sphere(12.0, vec![12]),
            sphere(17.0, vec![17, 16, 18, 15, 19]),
        ];
        let batch = BatchAssembler::new().assemble(&cloud, &spheres, 100);

        assert_eq!(batch.lengths, vec![4, 1, 5]);
        assert_eq!(batch.len(), 10);
        assert_eq!(batch.offsets(), vec![0, 4, 5, 10]);

        for (slice, sphere) in batch.unstack().iter().zip(&spheres) {
            assert_eq!(slice.point_indices, &sphere.indices[..]);
            assert_eq!(slice.center, sphere.center);
            for (k, &i) in sphere.indices.iter().enumerate() {
                assert_eq!(slice.positions[k], cloud.position(i as usize));
                assert_eq!(&slice.features[k * 2..k * 2 + 2], cloud.point_features(i as usize));
            }
        }
        assert_eq!(batch.sphere(1), Some(batch.unstack()[1]));
        assert_eq!(batch.sphere(3), None);
    }

    #[test]
    fn empty_sphere_list_gives_empty_batch() {
        let batch = BatchAssembler::new().assemble(&cloud(), &[], 10);
        assert!(batch.is_empty());
        assert_eq!(batch.offsets(), vec![0]);
        assert!(batch.unstack().is_empty());
    }
}
