/// Per-layer network inputs computed on stacked batches.
use rayon::prelude::*;

use crate::batch::Batch;
use crate::config::LayerSpec;
use crate::error::{Result, SamplingError};
use crate::neighborhood::NeighborhoodFilter;
use crate::spatial_index::SpatialGrid;
use crate::subsampling::grid_barycenters;

/// One neighbor list per query point, holding indices into the stacked supports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeighborLists {
    pub lists: Vec<Vec<u32>>,
}

impl NeighborLists {
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.lists.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Row-major matrix of width `max_len()`, short rows filled with `shadow`.
    pub fn padded(&self, shadow: u32) -> (Vec<u32>, usize) {
        let width = self.max_len();
        let mut matrix = vec![shadow; self.lists.len() * width];
        for (row, list) in self.lists.iter().enumerate() {
            matrix[row * width..row * width + list.len()].copy_from_slice(list);
        }
        (matrix, width)
    }
}

/// Inputs of one network layer.
#[derive(Debug, Clone)]
pub struct LayerInputs {
    pub layer: usize,
    pub dl: f32,
    pub points: Vec<[f32; 3]>,
    pub lengths: Vec<usize>,
    pub neighbors: NeighborLists,
    /// Next layer points gathering from this layer, absent on the last layer.
    pub pools: Option<NeighborLists>,
    /// This layer's points gathering from the next layer, absent on the last layer.
    pub upsamples: Option<NeighborLists>,
}

fn offsets(lengths: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(lengths.len() + 1);
    offsets.push(0);
    for len in lengths {
        offsets.push(offsets[offsets.len() - 1] + len);
    }
    offsets
}

fn check_lengths(points: &[[f32; 3]], lengths: &[usize]) -> Result<()> {
    let total: usize = lengths.iter().sum();
    if total != points.len() {
        return Err(SamplingError::ShapeMismatch {
            expected: vec![total],
            got: vec![points.len()],
        });
    }
    Ok(())
}

/// Grid subsample every segment separately; returns the stacked barycenters and their lengths.
pub fn stacked_subsample(
    points: &[[f32; 3]],
    lengths: &[usize],
    dl: f32,
) -> Result<(Vec<[f32; 3]>, Vec<usize>)> {
    check_lengths(points, lengths)?;
    if !(dl.is_finite() && dl > 0.0) {
        return Err(SamplingError::config(format!(
            "grid cell size must be positive and finite, got {dl}"
        )));
    }

    let bounds = offsets(lengths);
    let segments: Vec<Vec<[f32; 3]>> = bounds
        .par_windows(2)
        .map(|w| grid_barycenters(&points[w[0]..w[1]], &[], 0, dl).0)
        .collect();

    let out_lengths = segments.iter().map(Vec::len).collect();
    Ok((segments.into_iter().flatten().collect(), out_lengths))
}

/// Radius neighbors of every query among the supports of the same segment.
pub fn stacked_radius_neighbors(
    queries: &[[f32; 3]],
    query_lengths: &[usize],
    supports: &[[f32; 3]],
    support_lengths: &[usize],
    radius: f32,
    filter: &NeighborhoodFilter,
) -> Result<NeighborLists> {
    check_lengths(queries, query_lengths)?;
    check_lengths(supports, support_lengths)?;
    if query_lengths.len() != support_lengths.len() {
        return Err(SamplingError::ShapeMismatch {
            expected: vec![support_lengths.len()],
            got: vec![query_lengths.len()],
        });
    }
    if !(radius.is_finite() && radius > 0.0) {
        return Err(SamplingError::config(format!(
            "neighbor radius must be positive and finite, got {radius}"
        )));
    }

    let q_bounds = offsets(query_lengths);
    let s_bounds = offsets(support_lengths);

    let per_segment: Vec<Vec<Vec<u32>>> = (0..query_lengths.len())
        .into_par_iter()
        .map(|k| {
            let segment = &supports[s_bounds[k]..s_bounds[k + 1]];
            let grid = SpatialGrid::build(segment, radius);
            let base = s_bounds[k] as u32;

            queries[q_bounds[k]..q_bounds[k + 1]]
                .iter()
                .map(|q| {
                    filter
                        .apply_sorted(grid.radius_search(segment, *q, radius))
                        .into_iter()
                        .map(|n| n.index + base)
                        .collect()
                })
                .collect()
        })
        .collect();

    Ok(NeighborLists {
        lists: per_segment.into_iter().flatten().collect(),
    })
}

/// Layer inputs for every configured layer of a batch.
///
/// Every query stays inside its own sphere segment: a point never sees
/// neighbors from another sphere of the same batch. Segments are independent,
/// so they are processed in parallel and concatenated back in batch order.
pub fn build_layer_inputs(
    batch: &Batch,
    specs: &[LayerSpec],
    filter: &NeighborhoodFilter,
) -> Result<Vec<LayerInputs>> {
    if specs.is_empty() {
        return Err(SamplingError::config("at least one layer is required"));
    }

    let mut layers: Vec<LayerInputs> = Vec::with_capacity(specs.len());
    let mut points = batch.positions.clone();
    let mut lengths = batch.lengths.clone();

    for (l, spec) in specs.iter().enumerate() {
        let neighbors = stacked_radius_neighbors(
            &points,
            &lengths,
            &points,
            &lengths,
            spec.neighbor_radius,
            filter,
        )?;

        let (pools, upsamples, next) = match specs.get(l + 1) {
            Some(next_spec) => {
                let (next_points, next_lengths) =
                    stacked_subsample(&points, &lengths, next_spec.dl)?;
                let pools = stacked_radius_neighbors(
                    &next_points,
                    &next_lengths,
                    &points,
                    &lengths,
                    spec.neighbor_radius,
                    filter,
                )?;
                let upsamples = stacked_radius_neighbors(
                    &points,
                    &lengths,
                    &next_points,
                    &next_lengths,
                    next_spec.neighbor_radius,
                    filter,
                )?;
                (Some(pools), Some(upsamples), Some((next_points, next_lengths)))
            }
            None => (None, None, None),
        };

        let (next_points, next_lengths) = next.unwrap_or_default();
        layers.push(LayerInputs {
            layer: spec.layer,
            dl: spec.dl,
            points: std::mem::replace(&mut points, next_points),
            lengths: std::mem::replace(&mut lengths, next_lengths),
            neighbors,
            pools,
            upsamples,
        });
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial_index::dist_sq;

    fn two_segments() -> (Vec<[f32; 3]>, Vec<usize>) {
        let mut points = Vec::new();
        for i in 0..10 {
            points.push([i as f32 * 0.1, 0.0, 0.0]);
        }
        // Second segment overlaps the first in space.
        for i in 0..6 {
            points.push([i as f32 * 0.1 + 0.05, 0.0, 0.0]);
        }
        (points, vec![10, 6])
    }

    #[test]
    fn neighbors_never_cross_segments() {
        let (points, lengths) = two_segments();
        let lists = stacked_radius_neighbors(
            &points,
            &lengths,
            &points,
            &lengths,
            0.25,
            &NeighborhoodFilter::disabled(),
        )
        .unwrap();

        assert_eq!(lists.len(), 16);
        for (q, list) in lists.lists.iter().enumerate() {
            let segment = if q < 10 { 0..10 } else { 10..16 };
            let mut expected: Vec<u32> = segment
                .filter(|&s| dist_sq(points[q], points[s]) < 0.25 * 0.25)
                .map(|s| s as u32)
                .collect();
            let mut got = list.clone();
            expected.sort_unstable();
            got.sort_unstable();
            assert_eq!(got, expected);
            assert_eq!(list[0] as usize, q);
        }
    }

    #[test]
    fn filter_trims_each_list() {
        let (points, lengths) = two_segments();
        let full = stacked_radius_neighbors(
            &points, &lengths, &points, &lengths, 0.35, &NeighborhoodFilter::disabled(),
        )
        .unwrap();
        let trimmed = stacked_radius_neighbors(
            &points,
            &lengths,
            &points,
            &lengths,
            0.35,
            &NeighborhoodFilter::new(0.5).unwrap(),
        )
        .unwrap();

        for (a, b) in full.lists.iter().zip(&trimmed.lists) {
            assert_eq!(b.len(), (a.len() as f64 * 0.5).round() as usize);
            assert_eq!(&a[..b.len()], &b[..]);
        }
    }

    #[test]
    fn padded_matrix_uses_shadow() {
        let lists = NeighborLists {
            lists: vec![vec![0, 1, 2], vec![3], vec![]],
        };
        let (matrix, width) = lists.padded(99);
        assert_eq!(width, 3);
        assert_eq!(matrix, vec![0, 1, 2, 3, 99, 99, 99, 99, 99]);
    }

    #[test]
    fn subsample_keeps_segment_lengths_consistent() {
        let (points, lengths) = two_segments();
        let (coarse, coarse_lengths) = stacked_subsample(&points, &lengths, 0.3).unwrap();
        assert_eq!(coarse_lengths.len(), 2);
        assert_eq!(coarse_lengths.iter().sum::<usize>(), coarse.len());
        assert!(coarse_lengths[0] < 10 && coarse_lengths[1] < 6);
    }

    #[test]
    fn rejects_inconsistent_lengths() {
        let (points, _) = two_segments();
        assert!(matches!(
            stacked_subsample(&points, &[3, 3], 0.1),
            Err(SamplingError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn layer_inputs_shrink_and_link_layers() {
        let (points, lengths) = two_segments();
        let batch = Batch {
            features: Vec::new(),
            feature_dim: 0,
            point_indices: (0..points.len() as u32).collect(),
            centers: vec![[0.45, 0.0, 0.0], [0.3, 0.0, 0.0]],
            radii: vec![1.0, 1.0],
            max_points: 100,
            positions: points,
            lengths,
        };
        let specs: Vec<LayerSpec> = (0..3)
            .map(|layer| {
                let dl = 0.1 * 2f32.powi(layer as i32);
                LayerSpec {
                    layer,
                    dl,
                    neighbor_radius: 2.5 * dl,
                    kernel_sigma: dl,
                    kernel_influence_radius: 2.5 * dl,
                }
            })
            .collect();

        let layers = build_layer_inputs(&batch, &specs, &NeighborhoodFilter::disabled()).unwrap();

        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].points.len(), 16);
        for pair in layers.windows(2) {
            assert!(pair[1].points.len() <= pair[0].points.len());
            let pools = pair[0].pools.as_ref().unwrap();
            let upsamples = pair[0].upsamples.as_ref().unwrap();
            assert_eq!(pools.len(), pair[1].points.len());
            assert_eq!(upsamples.len(), pair[0].points.len());
            assert_eq!(pair[0].neighbors.len(), pair[0].points.len());
        }
        assert!(layers[2].pools.is_none() && layers[2].upsamples.is_none());
    }
}
