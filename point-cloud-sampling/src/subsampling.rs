/// Grid subsampling: one barycenter per occupied voxel
use log::{debug, info};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::cloud::PointCloud;
use crate::error::{Result, SamplingError};
use crate::spatial_index::cell_key;

/// Points accumulated per parallel work unit.
const CHUNK_SIZE: usize = 25_000;

/// Running sums for one occupied cell, kept in f64 to bound rounding drift.
#[derive(Debug, Clone)]
struct CellAccumulator {
    count: u64,
    position: [f64; 3],
    features: Vec<f64>,
}

impl CellAccumulator {
    fn new(dim: usize) -> Self {
        Self {
            count: 0,
            position: [0.0; 3],
            features: vec![0.0; dim],
        }
    }

    fn add(&mut self, p: [f32; 3], row: &[f32]) {
        self.count += 1;
        for a in 0..3 {
            self.position[a] += p[a] as f64;
        }
        for (sum, v) in self.features.iter_mut().zip(row) {
            *sum += *v as f64;
        }
    }

    fn absorb(&mut self, other: CellAccumulator) {
        self.count += other.count;
        for a in 0..3 {
            self.position[a] += other.position[a];
        }
        for (sum, v) in self.features.iter_mut().zip(other.features) {
            *sum += v;
        }
    }
}

type CellMap = FxHashMap<[i32; 3], CellAccumulator>;

fn merge_cells(mut a: CellMap, b: CellMap) -> CellMap {
    for (key, acc) in b {
        match a.get_mut(&key) {
            Some(existing) => existing.absorb(acc),
            None => {
                a.insert(key, acc);
            }
        }
    }
    a
}

/// Per-cell sums fed one chunk of points at a time.
///
/// Memory grows with the number of occupied cells, not with the number of
/// points added, so a reader can stream an arbitrarily large input through it.
#[derive(Debug, Clone)]
pub struct GridAccumulator {
    dl: f32,
    dim: usize,
    points: usize,
    cells: CellMap,
}

impl GridAccumulator {
    pub fn new(dl: f32, dim: usize) -> Result<Self> {
        if !(dl.is_finite() && dl > 0.0) {
            return Err(SamplingError::config(format!(
                "grid cell size must be positive and finite, got {dl}"
            )));
        }
        Ok(Self::unchecked(dl, dim))
    }

    fn unchecked(dl: f32, dim: usize) -> Self {
        Self {
            dl,
            dim,
            points: 0,
            cells: FxHashMap::default(),
        }
    }

    /// Points added so far.
    pub fn points(&self) -> usize {
        self.points
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Fold a chunk into the cell sums. `features` is row-major, `dim` values per position.
    pub fn add_chunk(&mut self, positions: &[[f32; 3]], features: &[f32]) -> Result<()> {
        let expected = positions.len() * self.dim;
        if features.len() != expected {
            return Err(SamplingError::FeatureMismatch {
                expected,
                got: features.len(),
            });
        }
        self.accumulate(positions, features);
        Ok(())
    }

    fn accumulate(&mut self, positions: &[[f32; 3]], features: &[f32]) {
        let (dl, dim) = (self.dl, self.dim);
        let chunk_cells = positions
            .par_chunks(CHUNK_SIZE)
            .enumerate()
            .fold(CellMap::default, |mut local, (chunk_idx, chunk)| {
                let offset = chunk_idx * CHUNK_SIZE;
                for (j, p) in chunk.iter().enumerate() {
                    let i = offset + j;
                    local
                        .entry(cell_key(*p, dl))
                        .or_insert_with(|| CellAccumulator::new(dim))
                        .add(*p, &features[i * dim..(i + 1) * dim]);
                }
                local
            })
            .reduce(CellMap::default, merge_cells);

        self.points += positions.len();
        let cells = std::mem::take(&mut self.cells);
        self.cells = merge_cells(cells, chunk_cells);
    }

    /// Barycenters of every occupied cell, in lexicographic cell order.
    pub fn into_barycenters(self) -> (Vec<[f32; 3]>, Vec<f32>) {
        let dim = self.dim;
        let mut cells: Vec<([i32; 3], CellAccumulator)> = self.cells.into_iter().collect();
        cells.sort_unstable_by_key(|(key, _)| *key);

        let mut out_positions = Vec::with_capacity(cells.len());
        let mut out_features = Vec::with_capacity(cells.len() * dim);
        for (_, acc) in cells {
            let n = acc.count as f64;
            out_positions.push([
                (acc.position[0] / n) as f32,
                (acc.position[1] / n) as f32,
                (acc.position[2] / n) as f32,
            ]);
            out_features.extend(acc.features.iter().map(|s| (s / n) as f32));
        }

        (out_positions, out_features)
    }
}

/// Barycenters of every occupied `dl` cell, in lexicographic cell order.
///
/// `features` is row-major with `dim` values per position.
pub(crate) fn grid_barycenters(
    positions: &[[f32; 3]],
    features: &[f32],
    dim: usize,
    dl: f32,
) -> (Vec<[f32; 3]>, Vec<f32>) {
    let mut grid = GridAccumulator::unchecked(dl, dim);
    grid.accumulate(positions, features);
    grid.into_barycenters()
}

/// Reduces point density by replacing each occupied cubic cell with its barycenter.
#[derive(Debug, Clone, Copy)]
pub struct GridSubsampler {
    dl: f32,
}

impl GridSubsampler {
    pub fn new(dl: f32) -> Result<Self> {
        if !(dl.is_finite() && dl > 0.0) {
            return Err(SamplingError::config(format!(
                "grid cell size must be positive and finite, got {dl}"
            )));
        }
        Ok(Self { dl })
    }

    pub fn dl(&self) -> f32 {
        self.dl
    }

    /// Subsampled copy of `cloud`, indexed at the cell size.
    pub fn subsample(&self, cloud: &PointCloud) -> Result<PointCloud> {
        let (positions, features) = grid_barycenters(
            cloud.positions(),
            cloud.features(),
            cloud.feature_dim(),
            self.dl,
        );

        debug!(
            "Grid subsampling at dl={}: {} -> {} points",
            self.dl,
            cloud.len(),
            positions.len()
        );

        PointCloud::with_index_cell_size(positions, features, cloud.schema().clone(), self.dl)
    }
}

/// Recursively subsampled clouds, layer `i` at `dl_0 * multiplier^i`.
pub fn subsample_layers(
    cloud: &PointCloud,
    dl_0: f32,
    layers: usize,
    multiplier: f32,
) -> Result<Vec<PointCloud>> {
    if layers == 0 {
        return Err(SamplingError::config("layer count must be at least 1"));
    }
    if !(multiplier.is_finite() && multiplier >= 1.0) {
        return Err(SamplingError::config(format!(
            "layer multiplier must be finite and at least 1, got {multiplier}"
        )));
    }

    let mut pyramid: Vec<PointCloud> = Vec::with_capacity(layers);
    let mut dl = dl_0;
    for layer in 0..layers {
        let subsampler = GridSubsampler::new(dl)?;
        let next = match pyramid.last() {
            Some(previous) => subsampler.subsample(previous)?,
            None => subsampler.subsample(cloud)?,
        };
        info!("Layer {}: dl={:.4}, {} points", layer, dl, next.len());
        pyramid.push(next);
        dl *= multiplier;
    }

    Ok(pyramid)
}
