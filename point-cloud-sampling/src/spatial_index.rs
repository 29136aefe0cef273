/// Hashed voxel grid used for radius queries over a fixed set of positions
use rustc_hash::FxHashMap;

/// One radius query hit: index into the queried positions and its squared distance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub index: u32,
    pub dist_sq: f32,
}

impl Neighbor {
    pub fn distance(&self) -> f32 {
        self.dist_sq.sqrt()
    }
}

/// Integer cell coordinates of a position on a grid anchored at the origin
pub fn cell_key(p: [f32; 3], cell_size: f32) -> [i32; 3] {
    [
        (p[0] / cell_size).floor() as i32,
        (p[1] / cell_size).floor() as i32,
        (p[2] / cell_size).floor() as i32,
    ]
}

/// Nearest first, ties broken by lower index
pub fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_unstable_by(|a, b| {
        a.dist_sq
            .total_cmp(&b.dist_sq)
            .then_with(|| a.index.cmp(&b.index))
    });
}

/// Sparse grid of occupied cells, each holding the indices of its points.
/// Built once and never mutated, the positions it was built from must not change.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: FxHashMap<[i32; 3], Vec<u32>>,
}

impl SpatialGrid {
    /// Bucket every position into its cell
    pub fn build(positions: &[[f32; 3]], cell_size: f32) -> Self {
        let mut cells: FxHashMap<[i32; 3], Vec<u32>> = FxHashMap::default();
        for (i, p) in positions.iter().enumerate() {
            cells.entry(cell_key(*p, cell_size)).or_default().push(i as u32);
        }

        Self { cell_size, cells }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// All positions strictly closer than `radius` to `center`, nearest first
    pub fn radius_search(
        &self,
        positions: &[[f32; 3]],
        center: [f32; 3],
        radius: f32,
    ) -> Vec<Neighbor> {
        let mut found = Vec::new();
        if self.cells.is_empty() || !(radius > 0.0) {
            return found;
        }

        let r2 = radius * radius;
        let lo = cell_key(
            [center[0] - radius, center[1] - radius, center[2] - radius],
            self.cell_size,
        );
        let hi = cell_key(
            [center[0] + radius, center[1] + radius, center[2] + radius],
            self.cell_size,
        );

        let span = |axis: usize| (hi[axis] as i64 - lo[axis] as i64 + 1).max(0) as u64;
        let scanned = span(0).saturating_mul(span(1)).saturating_mul(span(2));

        let mut visit = |bucket: &Vec<u32>| {
            for &i in bucket {
                let d2 = dist_sq(positions[i as usize], center);
                if d2 < r2 {
                    found.push(Neighbor {
                        index: i,
                        dist_sq: d2,
                    });
                }
            }
        };

        if scanned > self.cells.len() as u64 {
            // Query box larger than the occupied set: walk the occupied cells instead.
            for (key, bucket) in &self.cells {
                if (0..3).all(|a| key[a] >= lo[a] && key[a] <= hi[a]) {
                    visit(bucket);
                }
            }
        } else {
            for x in lo[0]..=hi[0] {
                for y in lo[1]..=hi[1] {
                    for z in lo[2]..=hi[2] {
                        if let Some(bucket) = self.cells.get(&[x, y, z]) {
                            visit(bucket);
                        }
                    }
                }
            }
        }

        sort_neighbors(&mut found);
        found
    }
}

pub fn dist_sq(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brute_force(positions: &[[f32; 3]], center: [f32; 3], radius: f32) -> Vec<u32> {
        let mut hits: Vec<Neighbor> = positions
            .iter()
            .enumerate()
            .filter_map(|(i, p)| {
                let d2 = dist_sq(*p, center);
                (d2 < radius * radius).then_some(Neighbor {
                    index: i as u32,
                    dist_sq: d2,
                })
            })
            .collect();
        sort_neighbors(&mut hits);
        hits.into_iter().map(|n| n.index).collect()
    }

    fn lattice(n: usize, spacing: f32) -> Vec<[f32; 3]> {
        let mut points = Vec::new();
        for x in 0..n {
            for y in 0..n {
                for z in 0..n {
                    points.push([
                        x as f32 * spacing - 0.37,
                        y as f32 * spacing + 0.11,
                        z as f32 * spacing,
                    ]);
                }
            }
        }
        points
    }

    #[test]
    fn matches_brute_force_for_small_and_large_radii() {
        let points = lattice(9, 0.25);
        let grid = SpatialGrid::build(&points, 0.3);

        for &(center, radius) in &[
            ([0.5, 0.6, 0.7], 0.2),
            ([0.5, 0.6, 0.7], 0.61),
            ([1.0, 1.0, 1.0], 10.0),
            ([-5.0, -5.0, -5.0], 1.0),
        ] {
            let got: Vec<u32> = grid
                .radius_search(&points, center, radius)
                .into_iter()
                .map(|n| n.index)
                .collect();
            assert_eq!(got, brute_force(&points, center, radius));
        }
    }

    #[test]
    fn boundary_distance_is_excluded() {
        let points = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let grid = SpatialGrid::build(&points, 0.5);
        let hits = grid.radius_search(&points, [0.0, 0.0, 0.0], 1.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn negative_coordinates_land_in_negative_cells() {
        assert_eq!(cell_key([-0.1, 0.0, 0.99], 1.0), [-1, 0, 0]);
    }
}
